//! Connection client
//!
//! The [`Client`] owns the connection state for one application: which
//! connectors exist, which one is active, what it last reported, and the
//! last error. It restores sessions on startup (auto-connect), persists a
//! reduced subset of its state, and relays the active connector's
//! `change`/`disconnect`/`error` events into the store.
//!
//! ```no_run
//! use std::sync::Arc;
//! use multichain_connect::client::{Client, ClientConfig};
//! use multichain_connect::connectors::{InjectedConnector, SharedConnector};
//! use multichain_connect::injected::InjectedRegistry;
//! use multichain_connect::storage::MemoryStorage;
//!
//! # async fn run() {
//! let registry = Arc::new(InjectedRegistry::new());
//! let client = Client::new(
//!     ClientConfig::new(())
//!         .auto_connect(true)
//!         .connectors(vec![Arc::new(InjectedConnector::metamask(registry)) as SharedConnector])
//!         .storage(Arc::new(MemoryStorage::new())),
//! );
//! let data = client.auto_connect().await;
//! # }
//! ```

pub mod config;
pub mod store;

#[cfg(test)]
mod tests;

pub use config::{ClientConfig, ConnectorsConfig, ProviderConfig};
pub use store::{Store, SubscriptionId};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chains::Chain;
use crate::connectors::{
    chain_ref, same_connector, ConnectorError, ConnectorEvent, EventKind, ListenerId,
    SharedConnector,
};
use crate::storage::{
    PersistedData, PersistedRecord, PersistedState, Storage, LAST_USED_CONNECTOR_KEY,
};
use crate::types::{ChainId, ConnectionData, Status};

/// State held by the client's store
#[derive(Clone)]
pub struct ClientState<P> {
    pub status: Status,
    pub connector: Option<SharedConnector>,
    pub connectors: Vec<SharedConnector>,
    pub data: Option<ConnectionData>,
    pub error: Option<ConnectorError>,
    pub chains: Vec<Chain>,
    pub provider: P,
}

impl<P: Clone> ClientState<P> {
    /// Reset the session fields, keeping connectors, chains and provider
    pub fn cleared(&self) -> Self {
        Self {
            status: Status::Disconnected,
            connector: None,
            data: None,
            error: None,
            ..self.clone()
        }
    }
}

impl<P> std::fmt::Debug for ClientState<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientState")
            .field("status", &self.status)
            .field("connector", &self.connector.as_ref().map(|c| c.id().to_string()))
            .field(
                "connectors",
                &self.connectors.iter().map(|c| c.id().to_string()).collect::<Vec<_>>(),
            )
            .field("data", &self.data)
            .field("error", &self.error)
            .field("chains", &self.chains.len())
            .finish()
    }
}

/// Listeners attached to the active connector
struct Wiring {
    connector: SharedConnector,
    listeners: Vec<ListenerId>,
}

struct ClientInner<P> {
    store: Store<ClientState<P>>,
    storage: Arc<dyn Storage>,
    provider: ProviderConfig<P>,
    is_auto_connecting: AtomicBool,
    destroyed: AtomicBool,
    pending_auto_connect: Mutex<Option<JoinHandle<()>>>,
    wiring: Mutex<Option<Wiring>>,
}

/// Multi-chain connection client
///
/// Cheap to clone; clones share the same state.
pub struct Client<P> {
    inner: Arc<ClientInner<P>>,
}

impl<P> Clone for Client<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Clone + Send + Sync + 'static> Client<P> {
    /// Create a client.
    ///
    /// With `auto_connect`, the initial status is `reconnecting` when a
    /// persisted account exists and `connecting` otherwise, and
    /// [`auto_connect`](Self::auto_connect) is scheduled on the current
    /// tokio runtime.
    pub fn new(config: ClientConfig<P>) -> Self {
        let ClientConfig {
            auto_connect,
            connectors,
            provider,
            storage,
            chains,
        } = config;

        let record = PersistedRecord::load(storage.as_ref());
        let status = match (auto_connect, record.as_ref().and_then(|r| r.account())) {
            (false, _) => Status::Disconnected,
            (true, Some(_)) => Status::Reconnecting,
            (true, None) => Status::Connecting,
        };

        let persisted = record.map(|r| r.state).unwrap_or_default();
        let data = if auto_connect {
            persisted.data.map(|d| ConnectionData {
                account: d.account,
                chain: d.chain,
                provider: None,
            })
        } else {
            None
        };

        let initial = ClientState {
            status,
            connector: None,
            connectors: connectors.resolve(),
            provider: provider.resolve(data.as_ref().and_then(|d| d.chain_id())),
            data,
            error: None,
            chains: persisted.chains.unwrap_or(chains),
        };
        debug!("Client created: {:?}", initial);

        let persist_storage = storage.clone();
        let store = Store::new(initial).with_persist(move |state: &ClientState<P>| {
            persist(persist_storage.as_ref(), state, auto_connect);
        });

        let client = Self {
            inner: Arc::new(ClientInner {
                store,
                storage,
                provider,
                is_auto_connecting: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                pending_auto_connect: Mutex::new(None),
                wiring: Mutex::new(None),
            }),
        };
        client.add_effects();

        if auto_connect {
            client.schedule_auto_connect();
        }
        client
    }

    fn downgrade(&self) -> Weak<ClientInner<P>> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(inner: &Weak<ClientInner<P>>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// Subscriptions keeping connector listeners and the provider in sync
    fn add_effects(&self) {
        let weak = self.downgrade();
        self.inner.store.subscribe_with_equality(
            |state: &ClientState<P>| state.connector.clone(),
            |a: &Option<SharedConnector>, b: &Option<SharedConnector>| match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => same_connector(a, b),
                _ => false,
            },
            move |_, _| {
                if let Some(client) = Self::upgrade(&weak) {
                    client.rewire();
                }
            },
        );

        if self.inner.provider.is_chain_dependent() {
            let weak = self.downgrade();
            self.inner.store.subscribe(
                |state: &ClientState<P>| state.data.as_ref().and_then(|d| d.chain_id().cloned()),
                move |chain_id, _| {
                    if let Some(client) = Self::upgrade(&weak) {
                        let provider = client.inner.provider.resolve(chain_id.as_ref());
                        debug!("Provider recomputed for chain {:?}", chain_id);
                        client.set_state(move |state| ClientState {
                            provider,
                            ..state.clone()
                        });
                    }
                },
            );
        }
    }

    /// Move the connector listeners onto the connector currently in the store.
    ///
    /// Store observers of concurrent writers may run out of order, so the
    /// target is read under the wiring lock instead of taken from the
    /// notification.
    fn rewire(&self) {
        let mut wiring = self.inner.wiring.lock();
        let current = self.connector();

        let unchanged = match (wiring.as_ref(), current.as_ref()) {
            (None, None) => true,
            (Some(wired), Some(current)) => same_connector(&wired.connector, current),
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some(previous) = wiring.take() {
            for id in previous.listeners {
                previous.connector.events().off(id);
            }
            debug!("Detached from connector {}", previous.connector.id());
        }

        let Some(connector) = current else {
            return;
        };

        let listeners = EventKind::ALL
            .iter()
            .map(|kind| {
                let weak = self.downgrade();
                connector.events().on(
                    *kind,
                    Arc::new(move |event: &ConnectorEvent| {
                        if let Some(client) = Self::upgrade(&weak) {
                            client.on_connector_event(event);
                        }
                    }),
                )
            })
            .collect();

        debug!("Attached to connector {}", connector.id());
        *wiring = Some(Wiring {
            connector,
            listeners,
        });
    }

    fn on_connector_event(&self, event: &ConnectorEvent) {
        match event {
            ConnectorEvent::Change(patch) => {
                debug!("Connector change: {:?}", patch);
                let patch = patch.clone();
                self.set_state(move |state| ClientState {
                    data: Some(state.data.clone().unwrap_or_default().merge(&patch)),
                    ..state.clone()
                });
            }
            ConnectorEvent::Disconnect => {
                info!("Connector disconnected");
                self.clear_state();
            }
            ConnectorEvent::Error(error) => {
                warn!("Connector error: {}", error);
                let error = error.clone();
                self.set_state(move |state| ClientState {
                    error: Some(error),
                    ..state.clone()
                });
            }
        }
    }

    fn schedule_auto_connect(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let weak = self.downgrade();
                let task = handle.spawn(async move {
                    if let Some(client) = Self::upgrade(&weak) {
                        client.auto_connect().await;
                    }
                });
                *self.inner.pending_auto_connect.lock() = Some(task);
            }
            Err(_) => {
                warn!("No async runtime available, auto-connect must be started by the host");
            }
        }
    }

    // =========================================================================
    // State transitions
    // =========================================================================

    /// Replace the whole state
    pub fn set_state(&self, updater: impl FnOnce(&ClientState<P>) -> ClientState<P>) {
        self.inner.store.set_state(updater);
    }

    /// Reset connector, data and error; status becomes `disconnected`
    pub fn clear_state(&self) {
        self.set_state(|state| state.cleared());
    }

    /// Persist the name of the connector future auto-connects should try first
    pub fn set_last_used_connector(&self, name: &str) {
        if let Err(e) = self.inner.storage.set_item(LAST_USED_CONNECTOR_KEY, name) {
            warn!("Failed to persist last used connector: {}", e);
        }
    }

    /// Restore a previous session.
    ///
    /// The last used connector is tried first, then the others in
    /// configured order. The first connector that is ready and already
    /// authorized gets connected; no other connector is attempted after
    /// it.
    ///
    /// Calls made while one is in flight return immediately with the data
    /// held at that moment (the persisted session or `None`), not the
    /// outcome of the running attempt. Observe `status` to learn it.
    pub async fn auto_connect(&self) -> Option<ConnectionData> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            return None;
        }
        if self.inner.is_auto_connecting.swap(true, Ordering::SeqCst) {
            debug!("Auto-connect already in flight");
            return self.data();
        }
        let _guard = AutoConnectGuard(&self.inner.is_auto_connecting);

        self.set_state(|state| {
            let has_account = state
                .data
                .as_ref()
                .and_then(|d| d.account.as_ref())
                .is_some();
            ClientState {
                status: if has_account {
                    Status::Reconnecting
                } else {
                    Status::Connecting
                },
                ..state.clone()
            }
        });

        let last_used = self.inner.storage.get_item(LAST_USED_CONNECTOR_KEY);
        let candidates = prioritize(self.connectors(), last_used.as_deref());

        for connector in candidates {
            if !connector.ready() {
                debug!("Skipping {}: not ready", connector.id());
                continue;
            }
            let Some(reconnectable) = connector.as_reconnectable() else {
                debug!("Skipping {}: no authorization check", connector.id());
                continue;
            };
            match reconnectable.is_authorized().await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Skipping {}: not authorized", connector.id());
                    continue;
                }
                Err(e) => {
                    debug!("Skipping {}: authorization check failed: {}", connector.id(), e);
                    continue;
                }
            }

            match connector.connect(None).await {
                Ok(data) => {
                    if self.inner.destroyed.load(Ordering::SeqCst) {
                        return None;
                    }
                    info!("Auto-connected to {}", connector.name());
                    let adopted = data.clone();
                    self.set_state(move |state| ClientState {
                        connector: Some(connector),
                        data: Some(adopted),
                        status: Status::Connected,
                        ..state.clone()
                    });
                    return Some(data);
                }
                Err(e) => {
                    warn!("Auto-connect to {} failed: {}", connector.name(), e);
                }
            }
        }

        info!("No connector could be restored");
        self.set_state(|state| ClientState {
            data: None,
            status: Status::Disconnected,
            ..state.clone()
        });
        None
    }

    /// Disconnect the active connector and dispose the store
    pub async fn destroy(&self) {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        if let Some(task) = self.inner.pending_auto_connect.lock().take() {
            task.abort();
        }

        if let Some(connector) = self.connector() {
            if let Err(e) = connector.disconnect().await {
                warn!("Failed to disconnect {}: {}", connector.name(), e);
            }
        }

        self.clear_state();
        self.rewire();
        self.inner.store.destroy();
        info!("Client destroyed");
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Look up a registered connector by id
    pub fn get_connector(&self, id: &str) -> Result<SharedConnector, ConnectorError> {
        self.connectors()
            .into_iter()
            .find(|c| c.id() == id)
            .ok_or_else(|| ConnectorError::ConnectorNotFound(id.to_string()))
    }

    /// Connect a registered connector and make it the active one
    pub async fn connect(
        &self,
        connector_id: &str,
        chain_id: Option<ChainId>,
    ) -> Result<ConnectionData, ConnectorError> {
        let connector = self.get_connector(connector_id)?;
        if let Some(active) = self.connector() {
            if same_connector(&active, &connector) && self.status() == Status::Connected {
                return Err(ConnectorError::AlreadyConnected);
            }
        }

        let previous = self.status();
        self.set_state(|state| ClientState {
            status: Status::Connecting,
            ..state.clone()
        });

        match connector.connect(chain_id).await {
            Ok(data) => {
                self.set_last_used_connector(connector.name());
                let adopted = data.clone();
                self.set_state(move |state| ClientState {
                    connector: Some(connector),
                    data: Some(adopted),
                    error: None,
                    status: Status::Connected,
                    ..state.clone()
                });
                Ok(data)
            }
            Err(e) => {
                warn!("Connect to {} failed: {}", connector.name(), e);
                let error = e.clone();
                self.set_state(move |state| ClientState {
                    status: previous,
                    error: Some(error),
                    ..state.clone()
                });
                Err(e)
            }
        }
    }

    /// Disconnect the active connector and forget the session.
    ///
    /// The session is cleared even when the connector fails to disconnect;
    /// that failure is returned afterwards.
    pub async fn disconnect(&self) -> Result<(), ConnectorError> {
        let result = match self.connector() {
            Some(connector) => connector.disconnect().await,
            None => Ok(()),
        };
        if let Err(e) = &result {
            warn!("Connector failed to disconnect cleanly: {}", e);
        }

        self.clear_state();
        self.inner.storage.remove_item(LAST_USED_CONNECTOR_KEY)?;
        result
    }

    fn active(&self) -> Result<SharedConnector, ConnectorError> {
        self.connector().ok_or(ConnectorError::NotConnected)
    }

    /// Sign a message with the active connector
    pub async fn sign_message(&self, message: &str) -> Result<String, ConnectorError> {
        self.active()?.sign_message(message).await
    }

    /// Switch the active connector to another chain
    pub async fn switch_chain(&self, chain_id: ChainId) -> Result<Chain, ConnectorError> {
        let connector = self.active()?;
        let chain = connector.switch_chain(chain_id.clone()).await?;

        let reference = chain_ref(connector.chains(), chain_id);
        self.set_state(move |state| ClientState {
            data: state.data.as_ref().map(|d| ConnectionData {
                chain: Some(reference),
                ..d.clone()
            }),
            ..state.clone()
        });
        Ok(chain)
    }

    /// Decentralized identifier of the active account
    pub async fn resolve_did(&self) -> Result<Option<String>, ConnectorError> {
        let connector = self.active()?;
        let account = self
            .data()
            .and_then(|d| d.account)
            .ok_or(ConnectorError::NotConnected)?;
        connector.resolve_did(&account).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn state(&self) -> ClientState<P> {
        self.inner.store.get_state()
    }

    pub fn chains(&self) -> Vec<Chain> {
        self.inner.store.read(|s| s.chains.clone())
    }

    pub fn connectors(&self) -> Vec<SharedConnector> {
        self.inner.store.read(|s| s.connectors.clone())
    }

    pub fn connector(&self) -> Option<SharedConnector> {
        self.inner.store.read(|s| s.connector.clone())
    }

    pub fn data(&self) -> Option<ConnectionData> {
        self.inner.store.read(|s| s.data.clone())
    }

    pub fn error(&self) -> Option<ConnectorError> {
        self.inner.store.read(|s| s.error.clone())
    }

    pub fn last_used_chain_id(&self) -> Option<ChainId> {
        self.inner
            .store
            .read(|s| s.data.as_ref().and_then(|d| d.chain_id().cloned()))
    }

    pub fn provider(&self) -> P {
        self.inner.store.read(|s| s.provider.clone())
    }

    pub fn status(&self) -> Status {
        self.inner.store.read(|s| s.status)
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.inner.storage.clone()
    }

    /// Observe a slice of the client state
    pub fn subscribe<T, Sel, L>(&self, selector: Sel, listener: L) -> SubscriptionId
    where
        T: PartialEq + 'static,
        Sel: Fn(&ClientState<P>) -> T + Send + Sync + 'static,
        L: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(selector, listener)
    }

    /// Observe a slice of the client state with a custom equality check
    pub fn subscribe_with_equality<T, Sel, Eq, L>(
        &self,
        selector: Sel,
        equality: Eq,
        listener: L,
    ) -> SubscriptionId
    where
        T: 'static,
        Sel: Fn(&ClientState<P>) -> T + Send + Sync + 'static,
        Eq: Fn(&T, &T) -> bool + Send + Sync + 'static,
        L: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.inner
            .store
            .subscribe_with_equality(selector, equality, listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.store.unsubscribe(id)
    }
}

/// Clears the single-flight flag when auto-connect finishes or is aborted
struct AutoConnectGuard<'a>(&'a AtomicBool);

impl Drop for AutoConnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Move the first connector named `last_used` to the front, keeping the rest in order
fn prioritize(mut connectors: Vec<SharedConnector>, last_used: Option<&str>) -> Vec<SharedConnector> {
    let Some(name) = last_used else {
        return connectors;
    };
    if let Some(index) = connectors.iter().position(|c| c.name() == name) {
        let last = connectors.remove(index);
        connectors.insert(0, last);
    }
    connectors
}

/// Write the persisted projection of `state`
fn persist<P>(storage: &dyn Storage, state: &ClientState<P>, auto_connect: bool) {
    let data = if auto_connect {
        state.data.as_ref().map(|d| PersistedData {
            account: d.account.clone(),
            chain: d.chain.clone(),
        })
    } else {
        None
    };

    let record = PersistedRecord::new(PersistedState {
        data,
        chains: Some(state.chains.clone()),
    });
    if let Err(e) = record.save(storage) {
        warn!("Failed to persist client state: {}", e);
    }
}
