//! Client configuration

use std::sync::Arc;

use crate::chains::Chain;
use crate::connectors::SharedConnector;
use crate::storage::{NoopStorage, Storage};
use crate::types::ChainId;

pub type ConnectorsFactory = Arc<dyn Fn() -> Vec<SharedConnector> + Send + Sync>;
pub type ProviderFactory<P> = Arc<dyn Fn(Option<&ChainId>) -> P + Send + Sync>;

/// Connector registry: a fixed list or a factory producing one
#[derive(Clone)]
pub enum ConnectorsConfig {
    List(Vec<SharedConnector>),
    Factory(ConnectorsFactory),
}

impl ConnectorsConfig {
    pub fn resolve(&self) -> Vec<SharedConnector> {
        match self {
            ConnectorsConfig::List(list) => list.clone(),
            ConnectorsConfig::Factory(factory) => factory(),
        }
    }
}

impl Default for ConnectorsConfig {
    fn default() -> Self {
        ConnectorsConfig::List(Vec::new())
    }
}

/// Provider: a fixed value or one computed from the connected chain
#[derive(Clone)]
pub enum ProviderConfig<P> {
    Value(P),
    Factory(ProviderFactory<P>),
}

impl<P: Clone> ProviderConfig<P> {
    pub fn resolve(&self, chain_id: Option<&ChainId>) -> P {
        match self {
            ProviderConfig::Value(provider) => provider.clone(),
            ProviderConfig::Factory(factory) => factory(chain_id),
        }
    }

    pub fn is_chain_dependent(&self) -> bool {
        matches!(self, ProviderConfig::Factory(_))
    }
}

/// Configuration for [`Client`](crate::client::Client)
#[derive(Clone)]
pub struct ClientConfig<P> {
    pub auto_connect: bool,
    pub connectors: ConnectorsConfig,
    pub provider: ProviderConfig<P>,
    pub storage: Arc<dyn Storage>,
    pub chains: Vec<Chain>,
}

impl<P: Clone> ClientConfig<P> {
    /// Configuration with a fixed provider value
    pub fn new(provider: P) -> Self {
        Self::with_provider(ProviderConfig::Value(provider))
    }

    /// Configuration with a chain-dependent provider
    pub fn with_provider_factory<F>(factory: F) -> Self
    where
        F: Fn(Option<&ChainId>) -> P + Send + Sync + 'static,
    {
        Self::with_provider(ProviderConfig::Factory(Arc::new(factory)))
    }

    fn with_provider(provider: ProviderConfig<P>) -> Self {
        Self {
            auto_connect: false,
            connectors: ConnectorsConfig::default(),
            provider,
            storage: Arc::new(NoopStorage),
            chains: Vec::new(),
        }
    }

    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn connectors(mut self, connectors: Vec<SharedConnector>) -> Self {
        self.connectors = ConnectorsConfig::List(connectors);
        self
    }

    pub fn connectors_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Vec<SharedConnector> + Send + Sync + 'static,
    {
        self.connectors = ConnectorsConfig::Factory(Arc::new(factory));
        self
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn chains(mut self, chains: Vec<Chain>) -> Self {
        self.chains = chains;
        self
    }
}

impl<P> std::fmt::Debug for ClientConfig<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let connectors = match &self.connectors {
            ConnectorsConfig::List(list) => format!("{} connector(s)", list.len()),
            ConnectorsConfig::Factory(_) => "factory".to_string(),
        };
        let provider = match &self.provider {
            ProviderConfig::Value(_) => "value",
            ProviderConfig::Factory(_) => "factory",
        };
        f.debug_struct("ClientConfig")
            .field("auto_connect", &self.auto_connect)
            .field("connectors", &connectors)
            .field("provider", &provider)
            .field("persistent_storage", &self.storage.is_persistent())
            .field("chains", &self.chains.len())
            .finish()
    }
}
