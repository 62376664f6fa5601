//! Keplr Connector
//!
//! Connects to the Keplr extension (`window.keplr`) for Cosmos SDK
//! chains. Keplr derives one address per chain, so switching chains also
//! changes the active account.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::chains::{self, Chain};
use crate::connectors::binding::WalletBinding;
use crate::connectors::{
    chain_ref, did_pkh, Connector, ConnectorError, ConnectorEvent, EventEmitter, ProviderBridge,
    Reconnectable,
};
use crate::injected::{expect_str, globals, InjectedProvider, InjectedRegistry};
use crate::types::{ChainId, ConnectionData, ConnectionPatch, Ecosystem};

/// Connector for the Keplr wallet
pub struct KeplrConnector {
    binding: Arc<WalletBinding>,
    bridge: ProviderBridge,
}

impl KeplrConnector {
    pub fn new(registry: Arc<InjectedRegistry>, chains: Vec<Chain>) -> Self {
        Self {
            binding: Arc::new(WalletBinding::new(
                "keplr",
                "Keplr",
                globals::KEPLR,
                registry,
                chains,
                "cosmoshub-4",
            )),
            bridge: ProviderBridge::new(),
        }
    }

    /// Keplr on the Cosmos Hub
    pub fn cosmoshub(registry: Arc<InjectedRegistry>) -> Self {
        Self::new(registry, vec![chains::cosmoshub()])
    }

    fn configured(&self, chain_id: &ChainId) -> Result<Chain, ConnectorError> {
        chains::find(self.binding.chains(), chain_id)
            .cloned()
            .ok_or_else(|| ConnectorError::ChainNotConfigured(chain_id.clone()))
    }

    /// Ask Keplr for access to a chain and return the chain's address
    async fn enable(&self, chain_id: &ChainId) -> Result<String, ConnectorError> {
        let provider = self.binding.provider()?;
        provider
            .request("enable", json!([chain_id.to_string()]))
            .await?;
        self.address(chain_id).await
    }

    async fn address(&self, chain_id: &ChainId) -> Result<String, ConnectorError> {
        let key = self
            .binding
            .provider()?
            .request("getKey", json!([chain_id.to_string()]))
            .await?;
        Ok(expect_str(&key["bech32Address"], "bech32Address")?)
    }
}

#[async_trait]
impl Connector for KeplrConnector {
    fn id(&self) -> &str {
        &self.binding.id
    }

    fn name(&self) -> &str {
        &self.binding.name
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Cosmos
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
        let id = chain_id.unwrap_or_else(|| ChainId::parse(&self.binding.chain()));
        self.configured(&id)?;

        let provider = self.binding.provider()?;
        debug!("Enabling Keplr for {}", id);
        let address = self.enable(&id).await?;
        self.binding.set_chain(&id);

        let binding = self.binding.clone();
        self.bridge
            .attach(provider.subscribe(), move |event| binding.handle(event));

        info!("Keplr connected: {} on {}", address, id);
        let chain = chain_ref(self.binding.chains(), id);
        Ok(ConnectionData::new(address, Some(chain)).with_provider(provider))
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.bridge.detach();
        if let Ok(provider) = self.binding.provider() {
            provider
                .request("disable", json!([self.binding.chain()]))
                .await?;
        }
        info!("Keplr disconnected");
        Ok(())
    }

    async fn get_account(&self) -> Result<Vec<String>, ConnectorError> {
        let id = ChainId::parse(&self.binding.chain());
        match self.address(&id).await {
            Ok(address) => Ok(vec![address]),
            Err(ConnectorError::Unauthorized(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn get_provider(&self) -> Result<Arc<dyn InjectedProvider>, ConnectorError> {
        self.binding.provider()
    }

    async fn get_chain_id(&self) -> Result<ChainId, ConnectorError> {
        Ok(ChainId::parse(&self.binding.chain()))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<Chain, ConnectorError> {
        let chain = self.configured(&chain_id)?;
        let address = self.enable(&chain_id).await?;
        self.binding.set_chain(&chain_id);

        self.binding.events().emit(ConnectorEvent::Change(ConnectionPatch {
            account: Some(address),
            chain: Some(chain_ref(self.binding.chains(), chain_id)),
        }));
        info!("Keplr switched to {}", chain.name);
        Ok(chain)
    }

    async fn sign_message(&self, message: &str) -> Result<String, ConnectorError> {
        let chain = self.binding.chain();
        let signer = self
            .get_account()
            .await?
            .into_iter()
            .next()
            .ok_or(ConnectorError::NotConnected)?;

        let raw = self
            .binding
            .provider()?
            .request("signArbitrary", json!([chain, signer, message]))
            .await?;
        Ok(expect_str(&raw["signature"], "signature")?)
    }

    async fn resolve_did(&self, address: &str) -> Result<Option<String>, ConnectorError> {
        Ok(Some(did_pkh(Ecosystem::Cosmos, &self.chain(), address)))
    }
}

#[async_trait]
impl Reconnectable for KeplrConnector {
    async fn is_authorized(&self) -> Result<bool, ConnectorError> {
        Ok(!self.get_account().await?.is_empty())
    }
}
