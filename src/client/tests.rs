use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::chains;
use crate::connectors::{Connector, ConnectorEvent, EventKind};
use crate::storage::{MemoryStorage, STORE_KEY};
use crate::testing::{dyn_connector, MockConnector};
use crate::types::{ChainRef, ConnectionPatch};

fn persisted_session(storage: &MemoryStorage, account: &str, chain: u64) {
    PersistedRecord::new(PersistedState {
        data: Some(PersistedData {
            account: Some(account.to_string()),
            chain: Some(ChainRef::new(ChainId::Numeric(chain))),
        }),
        chains: None,
    })
    .save(storage)
    .unwrap();
}

fn client_with(
    connectors: &[&Arc<MockConnector>],
    storage: Arc<MemoryStorage>,
    auto_connect: bool,
) -> Client<()> {
    Client::new(
        ClientConfig::new(())
            .auto_connect(auto_connect)
            .connectors(connectors.iter().map(|c| dyn_connector(c)).collect())
            .storage(storage)
            .chains(chains::evm_defaults()),
    )
}

fn is_active(client: &Client<()>, connector: &Arc<MockConnector>) -> bool {
    client
        .connector()
        .map(|active| same_connector(&active, &dyn_connector(connector)))
        .unwrap_or(false)
}

// =========================================================================
// Construction
// =========================================================================

#[test]
fn test_initial_status_without_auto_connect() {
    let storage = Arc::new(MemoryStorage::new());
    persisted_session(&storage, "0xabc", 1);

    let client = client_with(&[], storage, false);

    assert_eq!(client.status(), Status::Disconnected);
    assert!(client.data().is_none());
}

#[test]
fn test_initial_status_reconnecting_with_persisted_account() {
    let storage = Arc::new(MemoryStorage::new());
    persisted_session(&storage, "0xabc", 5);

    let client = client_with(&[], storage, true);

    assert_eq!(client.status(), Status::Reconnecting);
    let data = client.data().unwrap();
    assert_eq!(data.account.as_deref(), Some("0xabc"));
    assert_eq!(client.last_used_chain_id(), Some(ChainId::Numeric(5)));
}

#[test]
fn test_initial_status_connecting_without_persisted_account() {
    let client = client_with(&[], Arc::new(MemoryStorage::new()), true);
    assert_eq!(client.status(), Status::Connecting);
}

#[test]
fn test_persisted_chains_override_configured() {
    let storage = Arc::new(MemoryStorage::new());
    PersistedRecord::new(PersistedState {
        data: None,
        chains: Some(vec![chains::polygon()]),
    })
    .save(storage.as_ref())
    .unwrap();

    let client = client_with(&[], storage, false);
    assert_eq!(client.chains(), vec![chains::polygon()]);
}

#[test]
fn test_version_mismatch_is_ignored() {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .set_item(
            STORE_KEY,
            r#"{"state":{"data":{"account":"0xabc"}},"version":0}"#,
        )
        .unwrap();

    let client = client_with(&[], storage, true);
    assert_eq!(client.status(), Status::Connecting);
    assert!(client.data().is_none());
}

// =========================================================================
// Auto-connect
// =========================================================================

#[tokio::test]
async fn test_auto_connect_is_single_flight() {
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], Arc::new(MemoryStorage::new()), false);

    let (first, second) = tokio::join!(client.auto_connect(), client.auto_connect());

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(a.connects(), 1);
    assert_eq!(client.status(), Status::Connected);
}

#[tokio::test]
async fn test_auto_connect_tries_last_used_first() {
    let a = MockConnector::new("a").shared();
    let b = MockConnector::new("b").shared();
    let storage = Arc::new(MemoryStorage::new());
    storage.set_item(LAST_USED_CONNECTOR_KEY, "b").unwrap();

    let client = client_with(&[&a, &b], storage, false);
    let data = client.auto_connect().await.unwrap();

    assert_eq!(data.account.as_deref(), Some("0xb"));
    assert!(is_active(&client, &b));
    assert_eq!(a.connects(), 0);
}

#[tokio::test]
async fn test_auto_connect_skips_connector_that_is_not_ready() {
    let a = MockConnector::new("a").ready(false).shared();
    let b = MockConnector::new("b").shared();

    let client = client_with(&[&a, &b], Arc::new(MemoryStorage::new()), false);
    client.auto_connect().await;

    assert_eq!(client.status(), Status::Connected);
    assert!(is_active(&client, &b));
    assert_eq!(a.connects(), 0);
}

#[tokio::test]
async fn test_auto_connect_skips_connector_without_authorization_check() {
    let a = MockConnector::new("a").authorized(None).shared();
    let b = MockConnector::new("b").authorized(Some(false)).shared();

    let client = client_with(&[&a, &b], Arc::new(MemoryStorage::new()), false);
    assert!(client.auto_connect().await.is_none());

    assert_eq!(client.status(), Status::Disconnected);
    assert_eq!(a.connects() + b.connects(), 0);
}

#[tokio::test]
async fn test_auto_connect_moves_on_after_failed_connect() {
    let a = MockConnector::new("a").failing().shared();
    let b = MockConnector::new("b").shared();

    let client = client_with(&[&a, &b], Arc::new(MemoryStorage::new()), false);
    client.auto_connect().await;

    assert_eq!(a.connects(), 1);
    assert!(is_active(&client, &b));
}

#[test]
fn test_unauthorized_connector_clears_persisted_session() {
    let storage = Arc::new(MemoryStorage::new());
    persisted_session(&storage, "0x1", 1);
    let a = MockConnector::new("a").authorized(Some(false)).shared();

    let client = client_with(&[&a], storage, true);
    assert_eq!(client.status(), Status::Reconnecting);

    tokio_test::block_on(client.auto_connect());

    assert_eq!(client.status(), Status::Disconnected);
    assert!(client.data().is_none());
    assert!(client.connector().is_none());
}

#[tokio::test]
async fn test_auto_connect_is_scheduled_on_creation() {
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], Arc::new(MemoryStorage::new()), true);

    for _ in 0..50 {
        if client.status() == Status::Connected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(client.status(), Status::Connected);
    assert_eq!(a.connects(), 1);
}

#[tokio::test]
async fn test_destroy_cancels_scheduled_auto_connect() {
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], Arc::new(MemoryStorage::new()), true);

    client.destroy().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(a.connects(), 0);
    assert_eq!(client.status(), Status::Disconnected);
}

// =========================================================================
// Connector events
// =========================================================================

#[tokio::test]
async fn test_change_event_merges_into_data() {
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], Arc::new(MemoryStorage::new()), false);
    client.connect("a", Some(ChainId::Numeric(137))).await.unwrap();

    a.emit(ConnectorEvent::Change(ConnectionPatch::account("0xnew")));

    let data = client.data().unwrap();
    assert_eq!(data.account.as_deref(), Some("0xnew"));
    assert_eq!(data.chain_id(), Some(&ChainId::Numeric(137)));
}

#[tokio::test]
async fn test_disconnect_event_clears_state() {
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], Arc::new(MemoryStorage::new()), false);
    client.connect("a", None).await.unwrap();

    a.emit(ConnectorEvent::Disconnect);

    assert_eq!(client.status(), Status::Disconnected);
    assert!(client.connector().is_none());
    assert!(client.data().is_none());
    assert_eq!(client.connectors().len(), 1);
}

#[tokio::test]
async fn test_error_event_keeps_status() {
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], Arc::new(MemoryStorage::new()), false);
    client.connect("a", None).await.unwrap();

    a.emit(ConnectorEvent::Error(ConnectorError::UserRejected(
        "sign".to_string(),
    )));

    assert_eq!(client.status(), Status::Connected);
    assert!(matches!(
        client.error(),
        Some(ConnectorError::UserRejected(_))
    ));
}

#[tokio::test]
async fn test_connector_swap_moves_listeners() {
    let a = MockConnector::new("a").shared();
    let b = MockConnector::new("b").shared();
    let client = client_with(&[&a, &b], Arc::new(MemoryStorage::new()), false);

    client.connect("a", None).await.unwrap();
    for kind in EventKind::ALL {
        assert_eq!(a.events().listener_count(kind), 1);
    }

    client.connect("b", None).await.unwrap();
    for kind in EventKind::ALL {
        assert_eq!(a.events().listener_count(kind), 0);
        assert_eq!(b.events().listener_count(kind), 1);
    }

    // The old connector no longer drives the client
    a.emit(ConnectorEvent::Disconnect);
    assert_eq!(client.status(), Status::Connected);
    assert!(is_active(&client, &b));
}

// =========================================================================
// State transitions
// =========================================================================

#[tokio::test]
async fn test_clear_state_keeps_registry() {
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], Arc::new(MemoryStorage::new()), false);
    client.connect("a", None).await.unwrap();
    client.set_state(|state| ClientState {
        error: Some(ConnectorError::NotConnected),
        ..state.clone()
    });

    client.clear_state();

    let state = client.state();
    assert_eq!(state.status, Status::Disconnected);
    assert!(state.connector.is_none());
    assert!(state.data.is_none());
    assert!(state.error.is_none());
    assert_eq!(state.connectors.len(), 1);
    assert_eq!(state.chains, chains::evm_defaults());
}

#[tokio::test]
async fn test_destroy_disconnects_once() {
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], Arc::new(MemoryStorage::new()), false);
    client.connect("a", None).await.unwrap();

    client.destroy().await;
    client.destroy().await;

    assert_eq!(a.disconnects(), 1);
    assert_eq!(client.status(), Status::Disconnected);
    for kind in EventKind::ALL {
        assert_eq!(a.events().listener_count(kind), 0);
    }
}

#[tokio::test]
async fn test_destroy_without_connection() {
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], Arc::new(MemoryStorage::new()), false);

    client.destroy().await;
    assert_eq!(a.disconnects(), 0);
}

#[test]
fn test_persists_account_and_chain_only() {
    let storage = Arc::new(MemoryStorage::new());
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], storage.clone(), true);

    tokio_test::block_on(client.connect("a", Some(ChainId::Numeric(5)))).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&storage.get_item(STORE_KEY).unwrap()).unwrap();
    assert_eq!(raw["version"], 1);
    assert_eq!(raw["state"]["data"]["account"], "0xa");
    assert_eq!(raw["state"]["data"]["chain"]["id"], 5);
    assert!(raw["state"]["data"].get("provider").is_none());
    assert!(raw["state"].get("status").is_none());
    assert_eq!(
        raw["state"]["chains"].as_array().map(Vec::len),
        Some(chains::evm_defaults().len())
    );
}

#[tokio::test]
async fn test_session_not_persisted_without_auto_connect() {
    let storage = Arc::new(MemoryStorage::new());
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], storage.clone(), false);

    client.connect("a", None).await.unwrap();

    let record = PersistedRecord::load(storage.as_ref()).unwrap();
    assert!(record.state.data.is_none());
    assert!(record.state.chains.is_some());
}

#[tokio::test]
async fn test_provider_follows_connected_chain() {
    let a = MockConnector::new("a").shared();
    let client: Client<String> = Client::new(
        ClientConfig::with_provider_factory(|chain: Option<&ChainId>| {
            chain
                .map(|id| format!("rpc-{}", id))
                .unwrap_or_else(|| "rpc-default".to_string())
        })
        .connectors(vec![dyn_connector(&a)]),
    );
    assert_eq!(client.provider(), "rpc-default");

    client.connect("a", Some(ChainId::Numeric(137))).await.unwrap();
    assert_eq!(client.provider(), "rpc-137");

    client.switch_chain(ChainId::Numeric(1)).await.unwrap();
    assert_eq!(client.provider(), "rpc-1");
}

// =========================================================================
// Actions
// =========================================================================

#[tokio::test]
async fn test_connect_records_last_used() {
    let storage = Arc::new(MemoryStorage::new());
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], storage.clone(), false);

    let data = client.connect("a", None).await.unwrap();

    assert_eq!(data.account.as_deref(), Some("0xa"));
    assert_eq!(client.status(), Status::Connected);
    assert_eq!(storage.get_item(LAST_USED_CONNECTOR_KEY).as_deref(), Some("a"));

    let err = client.connect("a", None).await.unwrap_err();
    assert_eq!(err, ConnectorError::AlreadyConnected);
}

#[tokio::test]
async fn test_connect_failure_restores_status() {
    let a = MockConnector::new("a").failing().shared();
    let client = client_with(&[&a], Arc::new(MemoryStorage::new()), false);

    let err = client.connect("a", None).await.unwrap_err();

    assert!(err.is_user_rejection());
    assert_eq!(client.status(), Status::Disconnected);
    assert_eq!(client.error(), Some(err));
    assert!(client.connector().is_none());
}

#[tokio::test]
async fn test_connect_unknown_connector() {
    let client = client_with(&[], Arc::new(MemoryStorage::new()), false);
    assert_eq!(
        client.connect("nope", None).await.unwrap_err(),
        ConnectorError::ConnectorNotFound("nope".to_string())
    );
}

#[tokio::test]
async fn test_sign_and_did_require_connection() {
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], Arc::new(MemoryStorage::new()), false);

    assert_eq!(
        client.sign_message("hi").await.unwrap_err(),
        ConnectorError::NotConnected
    );
    assert_eq!(
        client.resolve_did().await.unwrap_err(),
        ConnectorError::NotConnected
    );

    client.connect("a", None).await.unwrap();
    assert_eq!(client.sign_message("hi").await.unwrap(), "signed:0xa:hi");
    assert_eq!(
        client.resolve_did().await.unwrap().as_deref(),
        Some("did:pkh:eip155:1:0xa")
    );
}

#[tokio::test]
async fn test_switch_chain_updates_data() {
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], Arc::new(MemoryStorage::new()), false);
    client.connect("a", None).await.unwrap();

    let chain = client.switch_chain(ChainId::Numeric(137)).await.unwrap();

    assert_eq!(chain.name, chains::polygon().name);
    let data = client.data().unwrap();
    assert_eq!(data.chain, Some(ChainRef::new(ChainId::Numeric(137))));

    let err = client.switch_chain(ChainId::Numeric(10)).await.unwrap_err();
    assert_eq!(err, ConnectorError::ChainNotConfigured(ChainId::Numeric(10)));
}

#[tokio::test]
async fn test_disconnect_forgets_last_used() {
    let storage = Arc::new(MemoryStorage::new());
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], storage.clone(), false);
    client.connect("a", None).await.unwrap();

    client.disconnect().await.unwrap();

    assert_eq!(a.disconnects(), 1);
    assert_eq!(client.status(), Status::Disconnected);
    assert!(storage.get_item(LAST_USED_CONNECTOR_KEY).is_none());
}

#[test]
fn test_subscribe_to_status() {
    let a = MockConnector::new("a").shared();
    let client = client_with(&[&a], Arc::new(MemoryStorage::new()), false);
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = seen.clone();

    let id = client.subscribe(
        |state: &ClientState<()>| state.status,
        move |now, before| sink.lock().push((*now, *before)),
    );
    tokio_test::block_on(client.connect("a", None)).unwrap();
    assert!(client.unsubscribe(id));

    assert_eq!(
        *seen.lock(),
        vec![
            (Status::Connecting, Status::Disconnected),
            (Status::Connected, Status::Connecting),
        ]
    );
}

#[tokio::test]
async fn test_disconnect_clears_session_when_connector_fails() {
    let storage = Arc::new(MemoryStorage::new());
    let a = MockConnector::new("a").failing_disconnect().shared();
    let client = client_with(&[&a], storage.clone(), false);
    client.connect("a", None).await.unwrap();

    let err = client.disconnect().await.unwrap_err();

    assert!(matches!(err, ConnectorError::Provider { .. }));
    assert_eq!(a.disconnects(), 1);
    assert_eq!(client.status(), Status::Disconnected);
    assert!(client.connector().is_none());
    assert!(storage.get_item(LAST_USED_CONNECTOR_KEY).is_none());
    for kind in EventKind::ALL {
        assert_eq!(a.events().listener_count(kind), 0);
    }
}

#[tokio::test]
async fn test_auto_connect_keeps_connectors_sharing_last_used_name() {
    let a = MockConnector::new("a")
        .named("w")
        .authorized(Some(false))
        .shared();
    let b = MockConnector::new("b").named("w").shared();
    let storage = Arc::new(MemoryStorage::new());
    storage.set_item(LAST_USED_CONNECTOR_KEY, "w").unwrap();

    let client = client_with(&[&a, &b], storage, false);
    let data = client.auto_connect().await;

    assert_eq!(data.and_then(|d| d.account).as_deref(), Some("0xb"));
    assert!(is_active(&client, &b));
    assert_eq!(b.connects(), 1);
}

#[test]
fn test_prioritize_moves_only_first_match() {
    let a = MockConnector::new("a").shared();
    let b = MockConnector::new("b").named("w").shared();
    let c = MockConnector::new("c").named("w").shared();

    let ordered = prioritize(
        vec![dyn_connector(&a), dyn_connector(&b), dyn_connector(&c)],
        Some("w"),
    );

    let ids: Vec<&str> = ordered.iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec!["b", "a", "c"]);
}

/// Storage whose first write parks until released
struct GatedStorage {
    inner: MemoryStorage,
    entered: parking_lot::Mutex<Option<std::sync::mpsc::Sender<()>>>,
    release: parking_lot::Mutex<Option<std::sync::mpsc::Receiver<()>>>,
}

impl GatedStorage {
    fn new() -> (Self, std::sync::mpsc::Receiver<()>, std::sync::mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let storage = Self {
            inner: MemoryStorage::new(),
            entered: parking_lot::Mutex::new(Some(entered_tx)),
            release: parking_lot::Mutex::new(Some(release_rx)),
        };
        (storage, entered_rx, release_tx)
    }
}

impl Storage for GatedStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), crate::storage::StorageError> {
        let entered = self.entered.lock().take();
        if let Some(entered) = entered {
            let release = self.release.lock().take();
            entered.send(()).unwrap();
            if let Some(release) = release {
                release.recv().unwrap();
            }
        }
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), crate::storage::StorageError> {
        self.inner.remove_item(key)
    }
}

#[test]
fn test_listeners_follow_stored_connector_when_writes_interleave() {
    let a = MockConnector::new("a").shared();
    let (storage, entered, release) = GatedStorage::new();
    let client: Client<()> = Client::new(
        ClientConfig::new(())
            .connectors(vec![dyn_connector(&a)])
            .storage(Arc::new(storage)),
    );

    // The writer stores connector `a`, then parks in persistence before
    // its observers run
    let writer = {
        let client = client.clone();
        let connector = dyn_connector(&a);
        std::thread::spawn(move || {
            client.set_state(move |state| ClientState {
                connector: Some(connector),
                data: Some(ConnectionData::new("0xa", None)),
                status: Status::Connected,
                ..state.clone()
            });
        })
    };
    entered.recv().unwrap();

    client.clear_state();
    release.send(()).unwrap();
    writer.join().unwrap();

    assert!(client.connector().is_none());
    for kind in EventKind::ALL {
        assert_eq!(a.events().listener_count(kind), 0);
    }

    a.emit(ConnectorEvent::Change(ConnectionPatch::account("0x9")));
    assert_eq!(client.status(), Status::Disconnected);
    assert!(client.data().is_none());
}
