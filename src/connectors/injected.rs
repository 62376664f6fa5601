//! Injected EVM Connector
//!
//! Connects to EIP-1193 providers injected by browser extensions
//! (MetaMask at `window.ethereum`, Coinbase Wallet at
//! `window.coinbaseWalletExtension`).

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::chains::{self, Chain};
use crate::connectors::binding::WalletBinding;
use crate::connectors::{
    chain_ref, did_pkh, Connector, ConnectorError, EventEmitter, ProviderBridge, Reconnectable,
};
use crate::injected::{
    codes, expect_str, expect_str_array, globals, InjectedProvider, InjectedRegistry,
};
use crate::types::{ChainId, ConnectionData, Ecosystem};

/// Identity of an injected wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedOptions {
    pub id: String,
    pub name: String,
    /// Global the wallet injects itself under
    pub global: String,
}

impl InjectedOptions {
    pub fn new(id: &str, name: &str, global: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            global: global.to_string(),
        }
    }

    pub fn metamask() -> Self {
        Self::new("metaMask", "MetaMask", globals::ETHEREUM)
    }

    pub fn coinbase() -> Self {
        Self::new("coinbaseWallet", "Coinbase Wallet", globals::COINBASE)
    }
}

/// Connector for EIP-1193 injected wallets
pub struct InjectedConnector {
    binding: Arc<WalletBinding>,
    bridge: ProviderBridge,
}

impl InjectedConnector {
    pub fn new(registry: Arc<InjectedRegistry>, options: InjectedOptions, chains: Vec<Chain>) -> Self {
        Self {
            binding: Arc::new(WalletBinding::new(
                &options.id,
                &options.name,
                &options.global,
                registry,
                chains,
                "1",
            )),
            bridge: ProviderBridge::new(),
        }
    }

    /// MetaMask on the default EVM chains
    pub fn metamask(registry: Arc<InjectedRegistry>) -> Self {
        Self::new(registry, InjectedOptions::metamask(), chains::evm_defaults())
    }

    /// Coinbase Wallet extension on the default EVM chains
    pub fn coinbase(registry: Arc<InjectedRegistry>) -> Self {
        Self::new(registry, InjectedOptions::coinbase(), chains::evm_defaults())
    }

    async fn accounts(&self) -> Result<Vec<String>, ConnectorError> {
        let raw = self
            .binding
            .provider()?
            .request("eth_accounts", json!([]))
            .await?;
        Ok(expect_str_array(&raw, "accounts")?)
    }
}

#[async_trait]
impl Connector for InjectedConnector {
    fn id(&self) -> &str {
        &self.binding.id
    }

    fn name(&self) -> &str {
        &self.binding.name
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Evm
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
        debug!("Requesting accounts from {}", self.binding.name);

        let raw = provider.request("eth_requestAccounts", json!([])).await?;
        let account = expect_str_array(&raw, "accounts")?
            .into_iter()
            .next()
            .ok_or_else(|| ConnectorError::Unauthorized("wallet returned no accounts".to_string()))?;

        let mut id = self.get_chain_id().await?;
        if let Some(target) = chain_id {
            if target != id {
                self.switch_chain(target.clone()).await?;
                id = target;
            }
        }
        self.binding.set_chain(&id);

        let binding = self.binding.clone();
        self.bridge
            .attach(provider.subscribe(), move |event| binding.handle(event));

        info!("{} connected: {} on chain {}", self.binding.name, account, id);
        let chain = chain_ref(self.binding.chains(), id);
        Ok(ConnectionData::new(account, Some(chain)).with_provider(provider))
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.bridge.detach();
        info!("{} disconnected", self.binding.name);
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
            .request("eth_chainId", Value::Null)
            .await?;
        ChainId::from_json(&raw)
            .ok_or_else(|| ConnectorError::InvalidResponse(format!("chain id {}", raw)))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<Chain, ConnectorError> {
        let chain = chains::find(self.binding.chains(), &chain_id)
            .cloned()
            .ok_or_else(|| ConnectorError::ChainNotConfigured(chain_id.clone()))?;
        let hex = chain_id
            .to_hex()
            .ok_or_else(|| ConnectorError::ChainNotConfigured(chain_id.clone()))?;

        let provider = self.binding.provider()?;
        match provider
            .request("wallet_switchEthereumChain", json!([{ "chainId": hex }]))
            .await
        {
            Ok(_) => {}
            Err(e) if e.code == codes::UNRECOGNIZED_CHAIN => {
                return Err(ConnectorError::ChainNotConfigured(chain_id));
            }
            Err(e) => return Err(e.into()),
        }

        self.binding.set_chain(&chain_id);
        info!("{} switched to {}", self.binding.name, chain.name);
        Ok(chain)
    }

    async fn sign_message(&self, message: &str) -> Result<String, ConnectorError> {
        let account = self
            .accounts()
            .await?
            .into_iter()
            .next()
            .ok_or(ConnectorError::NotConnected)?;

        let payload = format!("0x{}", hex::encode(message.as_bytes()));
        let raw = self
            .binding
            .provider()?
            .request("personal_sign", json!([payload, account]))
            .await?;
        Ok(expect_str(&raw, "signature")?)
    }

    async fn resolve_did(&self, address: &str) -> Result<Option<String>, ConnectorError> {
        Ok(Some(did_pkh(Ecosystem::Evm, &self.chain(), address)))
    }
}

#[async_trait]
impl Reconnectable for InjectedConnector {
    async fn is_authorized(&self) -> Result<bool, ConnectorError> {
        Ok(!self.accounts().await?.is_empty())
    }
}
