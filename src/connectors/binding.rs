//! State shared by every connector bound to an injected wallet

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::chains::Chain;
use crate::connectors::{chain_ref, ConnectorError, ConnectorEvent, EventEmitter};
use crate::injected::{InjectedProvider, InjectedRegistry, ProviderEvent};
use crate::types::{ChainId, ConnectionPatch};

/// Binding between a connector and one injected global
pub struct WalletBinding {
    pub id: String,
    pub name: String,
    pub global: String,
    registry: Arc<InjectedRegistry>,
    chains: Vec<Chain>,
    chain: RwLock<String>,
    events: EventEmitter,
}

impl WalletBinding {
    pub fn new(
        id: &str,
        name: &str,
        global: &str,
        registry: Arc<InjectedRegistry>,
        chains: Vec<Chain>,
        default_chain: &str,
    ) -> Self {
        let chain = chains
            .first()
            .map(|c| c.id.to_string())
            .unwrap_or_else(|| default_chain.to_string());

        Self {
            id: id.to_string(),
            name: name.to_string(),
            global: global.to_string(),
            registry,
            chains,
            chain: RwLock::new(chain),
            events: EventEmitter::new(),
        }
    }

    /// The injected object, or `NotInstalled`
    pub fn provider(&self) -> Result<Arc<dyn InjectedProvider>, ConnectorError> {
        self.registry
            .get(&self.global)
            .ok_or_else(|| ConnectorError::not_installed(&self.name))
    }

    pub fn ready(&self) -> bool {
        self.registry.contains(&self.global)
    }

    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    pub fn chain(&self) -> String {
        self.chain.read().clone()
    }

    pub fn set_chain(&self, id: &ChainId) {
        *self.chain.write() = id.to_string();
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn on_accounts_changed(&self, accounts: Vec<String>) {
        match accounts.into_iter().next() {
            Some(account) => self
                .events
                .emit(ConnectorEvent::Change(ConnectionPatch::account(account))),
            None => self.events.emit(ConnectorEvent::Disconnect),
        }
    }

    pub fn on_chain_changed(&self, raw: &str) {
        let id = ChainId::parse(raw);
        self.set_chain(&id);
        let chain = chain_ref(&self.chains, id);
        self.events
            .emit(ConnectorEvent::Change(ConnectionPatch::chain(chain)));
    }

    pub fn on_disconnect(&self) {
        self.events.emit(ConnectorEvent::Disconnect);
    }

    /// Route one item of the wallet's event stream
    pub fn handle(&self, event: Result<ProviderEvent, ConnectorError>) {
        debug!("{} wallet event: {:?}", self.name, event);
        match event {
            Ok(ProviderEvent::AccountsChanged(accounts)) => self.on_accounts_changed(accounts),
            Ok(ProviderEvent::ChainChanged(raw)) => self.on_chain_changed(&raw),
            Ok(ProviderEvent::Disconnect) => self.on_disconnect(),
            Err(e) => self.events.emit(ConnectorEvent::Error(e)),
        }
    }
}

impl std::fmt::Debug for WalletBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletBinding")
            .field("id", &self.id)
            .field("global", &self.global)
            .field("chain", &self.chain())
            .finish()
    }
}
