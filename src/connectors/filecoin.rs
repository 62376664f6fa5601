//! Filecoin Connector
//!
//! Connects to a Filecoin wallet injected at `window.filecoin`. Filecoin
//! has no DID method, so `resolve_did` always yields `None`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::chains::{self, Chain};
use crate::connectors::binding::WalletBinding;
use crate::connectors::{
    chain_ref, Connector, ConnectorError, EventEmitter, ProviderBridge, Reconnectable,
};
use crate::injected::{expect_str, expect_str_array, globals, InjectedProvider, InjectedRegistry};
use crate::types::{ChainId, ConnectionData, Ecosystem};

/// Connector for injected Filecoin wallets
pub struct FilecoinConnector {
    binding: Arc<WalletBinding>,
    bridge: ProviderBridge,
}

impl FilecoinConnector {
    pub fn new(registry: Arc<InjectedRegistry>, chains: Vec<Chain>) -> Self {
        Self {
            binding: Arc::new(WalletBinding::new(
                "filecoin",
                "Filecoin",
                globals::FILECOIN,
                registry,
                chains,
                "f",
            )),
            bridge: ProviderBridge::new(),
        }
    }

    pub fn mainnet(registry: Arc<InjectedRegistry>) -> Self {
        Self::new(registry, vec![chains::filecoin_mainnet()])
    }

    async fn accounts(&self) -> Result<Vec<String>, ConnectorError> {
        let raw = self
            .binding
            .provider()?
            .request("fil_accounts", Value::Null)
            .await?;
        Ok(expect_str_array(&raw, "accounts")?)
    }
}

#[async_trait]
impl Connector for FilecoinConnector {
    fn id(&self) -> &str {
        &self.binding.id
    }

    fn name(&self) -> &str {
        &self.binding.name
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Filecoin
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
        let provider = self.binding.provider()?;
        let raw = provider.request("fil_requestAccounts", Value::Null).await?;
        let account = expect_str_array(&raw, "accounts")?
            .into_iter()
            .next()
            .ok_or_else(|| ConnectorError::Unauthorized("wallet returned no accounts".to_string()))?;

        let id = self.get_chain_id().await?;
        if let Some(target) = chain_id {
            if target != id {
                return Err(ConnectorError::SwitchChainNotSupported {
                    connector: self.binding.name.clone(),
                });
            }
        }
        self.binding.set_chain(&id);

        let binding = self.binding.clone();
        self.bridge
            .attach(provider.subscribe(), move |event| binding.handle(event));

        info!("Filecoin wallet connected: {} on {}", account, id);
        let chain = chain_ref(self.binding.chains(), id);
        Ok(ConnectionData::new(account, Some(chain)).with_provider(provider))
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.bridge.detach();
        info!("Filecoin wallet disconnected");
        Ok(())
    }

    async fn get_account(&self) -> Result<Vec<String>, ConnectorError> {
        self.accounts().await
    }

    async fn get_provider(&self) -> Result<Arc<dyn InjectedProvider>, ConnectorError> {
        self.binding.provider()
    }

    async fn get_chain_id(&self) -> Result<ChainId, ConnectorError> {
        let raw = self
            .binding
            .provider()?
            .request("fil_chainId", Value::Null)
            .await?;
        ChainId::from_json(&raw)
            .ok_or_else(|| ConnectorError::InvalidResponse(format!("chain id {}", raw)))
    }

    async fn sign_message(&self, message: &str) -> Result<String, ConnectorError> {
        let account = self
            .accounts()
            .await?
            .into_iter()
            .next()
            .ok_or(ConnectorError::NotConnected)?;

        let raw = self
            .binding
            .provider()?
            .request(
                "fil_signMessage",
                json!([hex::encode(message.as_bytes()), account]),
            )
            .await?;
        Ok(expect_str(&raw, "signature")?)
    }
}

#[async_trait]
impl Reconnectable for FilecoinConnector {
    async fn is_authorized(&self) -> Result<bool, ConnectorError> {
        Ok(!self.accounts().await?.is_empty())
    }
}
