//! Solana Connector
//!
//! Connects to Solana wallets injected by browser extensions
//! (Phantom at `window.phantom.solana`, Solflare at `window.solflare`).
//! Solana wallets do not switch clusters on request, so the connector
//! stays on the cluster it was configured with.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::chains::{self, Chain};
use crate::connectors::binding::WalletBinding;
use crate::connectors::{
    chain_ref, did_pkh, Connector, ConnectorError, EventEmitter, ProviderBridge, Reconnectable,
};
use crate::injected::{codes, expect_str, globals, InjectedProvider, InjectedRegistry};
use crate::types::{ChainId, ConnectionData, Ecosystem};

/// Connector for injected Solana wallets
pub struct SolanaConnector {
    binding: Arc<WalletBinding>,
    bridge: ProviderBridge,
}

impl SolanaConnector {
    pub fn new(
        registry: Arc<InjectedRegistry>,
        id: &str,
        name: &str,
        global: &str,
        chains: Vec<Chain>,
    ) -> Self {
        Self {
            binding: Arc::new(WalletBinding::new(
                id,
                name,
                global,
                registry,
                chains,
                "mainnet-beta",
            )),
            bridge: ProviderBridge::new(),
        }
    }

    pub fn phantom(registry: Arc<InjectedRegistry>) -> Self {
        Self::new(
            registry,
            "phantom",
            "Phantom",
            globals::PHANTOM,
            vec![chains::solana_mainnet(), chains::solana_devnet()],
        )
    }

    pub fn solflare(registry: Arc<InjectedRegistry>) -> Self {
        Self::new(
            registry,
            "solflare",
            "Solflare",
            globals::SOLFLARE,
            vec![chains::solana_mainnet(), chains::solana_devnet()],
        )
    }

    async fn public_key(&self) -> Result<Option<String>, ConnectorError> {
        let raw = self
            .binding
            .provider()?
            .request("publicKey", Value::Null)
            .await?;
        Ok(raw.as_str().map(str::to_string))
    }
}

#[async_trait]
impl Connector for SolanaConnector {
    fn id(&self) -> &str {
        &self.binding.id
    }

    fn name(&self) -> &str {
        &self.binding.name
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Solana
    }

    fn chain(&self) -> String {
        self.binding.chain()
    }

    fn ready(&self) -> bool {
        self.binding.ready()
    }

    fn chains(&self) -> &[Chain] {
        self.binding.chains()
    }

    fn events(&self) -> &EventEmitter {
        self.binding.events()
    }

    fn as_reconnectable(&self) -> Option<&dyn Reconnectable> {
        Some(self)
    }

    async fn connect(&self, chain_id: Option<ChainId>) -> Result<ConnectionData, ConnectorError> {
        if let Some(target) = &chain_id {
            if chains::find(self.binding.chains(), target).is_none() {
                return Err(ConnectorError::ChainNotConfigured(target.clone()));
            }
        }

        let provider = self.binding.provider()?;
        debug!("Connecting to {}", self.binding.name);

        let raw = provider.request("connect", json!({})).await?;
        let public_key = expect_str(&raw["publicKey"], "publicKey")?;

        let id = chain_id.unwrap_or_else(|| ChainId::parse(&self.binding.chain()));
        self.binding.set_chain(&id);

        let binding = self.binding.clone();
        self.bridge
            .attach(provider.subscribe(), move |event| binding.handle(event));

        info!("{} connected: {} on {}", self.binding.name, public_key, id);
        let chain = chain_ref(self.binding.chains(), id);
        Ok(ConnectionData::new(public_key, Some(chain)).with_provider(provider))
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.bridge.detach();
        if let Ok(provider) = self.binding.provider() {
            provider.request("disconnect", Value::Null).await?;
        }
        info!("{} disconnected", self.binding.name);
        Ok(())
    }

    async fn get_account(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.public_key().await?.into_iter().collect())
    }

    async fn get_provider(&self) -> Result<Arc<dyn InjectedProvider>, ConnectorError> {
        self.binding.provider()
    }

    async fn get_chain_id(&self) -> Result<ChainId, ConnectorError> {
        Ok(ChainId::parse(&self.binding.chain()))
    }

    async fn sign_message(&self, message: &str) -> Result<String, ConnectorError> {
        if self.public_key().await?.is_none() {
            return Err(ConnectorError::NotConnected);
        }

        let raw = self
            .binding
            .provider()?
            .request(
                "signMessage",
                json!({ "message": hex::encode(message.as_bytes()), "display": "utf8" }),
            )
            .await?;
        Ok(expect_str(&raw["signature"], "signature")?)
    }

    async fn resolve_did(&self, address: &str) -> Result<Option<String>, ConnectorError> {
        Ok(Some(did_pkh(Ecosystem::Solana, &self.chain(), address)))
    }
}

#[async_trait]
impl Reconnectable for SolanaConnector {
    /// Trusted-only connect: succeeds silently when the user approved this
    /// application before, rejects otherwise.
    async fn is_authorized(&self) -> Result<bool, ConnectorError> {
        let provider = self.binding.provider()?;
        match provider
            .request("connect", json!({ "onlyIfTrusted": true }))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.code == codes::USER_REJECTED || e.code == codes::UNAUTHORIZED => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
