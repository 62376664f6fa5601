//! Scriptable connector for client tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::chains::{self, Chain};
use crate::connectors::{
    Connector, ConnectorError, ConnectorEvent, EventEmitter, Reconnectable, SharedConnector,
};
use crate::injected::InjectedProvider;
use crate::types::{ChainId, ChainRef, ConnectionData, Ecosystem};

pub struct MockConnector {
    pub id: String,
    pub name: String,
    pub ready: bool,
    /// `None` means the connector has no authorization check
    pub authorized: Option<bool>,
    pub account: String,
    pub fail_connect: bool,
    pub fail_disconnect: bool,
    pub connect_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
    chains: Vec<Chain>,
    events: EventEmitter,
}

impl MockConnector {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            ready: true,
            authorized: Some(true),
            account: format!("0x{}", id),
            fail_connect: false,
            fail_disconnect: false,
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            chains: chains::evm_defaults(),
            events: EventEmitter::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }

    pub fn authorized(mut self, authorized: Option<bool>) -> Self {
        self.authorized = authorized;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn connects(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn emit(&self, event: ConnectorEvent) {
        self.events.emit(event);
    }
}

/// Coerce to the client's connector handle
pub fn dyn_connector(connector: &Arc<MockConnector>) -> SharedConnector {
    connector.clone()
}

#[async_trait]
impl Connector for MockConnector {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Evm
    }

    fn chain(&self) -> String {
        "1".to_string()
    }

    fn ready(&self) -> bool {
        self.ready
    }

    fn chains(&self) -> &[Chain] {
        &self.chains
    }

    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn as_reconnectable(&self) -> Option<&dyn Reconnectable> {
        self.authorized.map(|_| self as &dyn Reconnectable)
    }

    async fn connect(&self, chain_id: Option<ChainId>) -> Result<ConnectionData, ConnectorError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.fail_connect {
            return Err(ConnectorError::UserRejected("connect".to_string()));
        }
        let chain = chain_id.unwrap_or(ChainId::Numeric(1));
        Ok(ConnectionData::new(self.account.clone(), Some(ChainRef::new(chain))))
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect {
            return Err(ConnectorError::Provider {
                code: crate::injected::codes::DISCONNECTED,
                message: "wallet unreachable".to_string(),
            });
        }
        Ok(())
    }

    async fn get_account(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(vec![self.account.clone()])
    }

    async fn get_provider(&self) -> Result<Arc<dyn InjectedProvider>, ConnectorError> {
        Err(ConnectorError::not_installed(&self.id))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<Chain, ConnectorError> {
        chains::find(&self.chains, &chain_id)
            .cloned()
            .ok_or(ConnectorError::ChainNotConfigured(chain_id))
    }

    async fn sign_message(&self, message: &str) -> Result<String, ConnectorError> {
        Ok(format!("signed:{}:{}", self.account, message))
    }

    async fn resolve_did(&self, address: &str) -> Result<Option<String>, ConnectorError> {
        Ok(Some(format!("did:pkh:eip155:1:{}", address)))
    }
}

#[async_trait]
impl Reconnectable for MockConnector {
    async fn is_authorized(&self) -> Result<bool, ConnectorError> {
        Ok(self.authorized.unwrap_or(false))
    }
}
