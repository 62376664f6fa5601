//! Connector lifecycle events
//!
//! Connectors translate their wallet's own event stream into three
//! uniform notifications (`change`, `disconnect`, `error`) delivered
//! through an [`EventEmitter`].

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connectors::ConnectorError;
use crate::injected::{codes, ProviderEvent};
use crate::types::ConnectionPatch;

/// Kind of connector event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Change,
    Disconnect,
    Error,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [EventKind::Change, EventKind::Disconnect, EventKind::Error];
}

/// Event emitted by a connector
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    Change(ConnectionPatch),
    Disconnect,
    Error(ConnectorError),
}

impl ConnectorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ConnectorEvent::Change(_) => EventKind::Change,
            ConnectorEvent::Disconnect => EventKind::Disconnect,
            ConnectorEvent::Error(_) => EventKind::Error,
        }
    }
}

/// Handle identifying a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub type Listener = Arc<dyn Fn(&ConnectorEvent) + Send + Sync>;

/// Listener registry for connector events
#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<Vec<(ListenerId, EventKind, Listener)>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, kind, listener));
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }

    /// Deliver an event to every listener of its kind.
    ///
    /// Listeners run outside the registry lock and may register or remove
    /// listeners themselves.
    pub fn emit(&self, event: ConnectorEvent) {
        let kind = event.kind();
        let targets: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, l)| l.clone())
            .collect();

        debug!("Emitting {:?} to {} listener(s)", kind, targets.len());
        for listener in targets {
            listener(&event);
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("change", &self.listener_count(EventKind::Change))
            .field("disconnect", &self.listener_count(EventKind::Disconnect))
            .field("error", &self.listener_count(EventKind::Error))
            .finish()
    }
}

/// A connector's subscription to its wallet's event stream
///
/// The stream is drained on a spawned task; attaching again replaces the
/// previous task and detaching aborts it.
#[derive(Debug, Default)]
pub struct ProviderBridge {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ProviderBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach<F>(&self, mut events: broadcast::Receiver<ProviderEvent>, handler: F)
    where
        F: Fn(Result<ProviderEvent, ConnectorError>) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => handler(Ok(event)),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Wallet event stream lagged, {} event(s) missed", missed);
                        handler(Err(ConnectorError::Provider {
                            code: codes::INTERNAL,
                            message: format!("missed {} wallet event(s)", missed),
                        }));
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Wallet event stream closed");
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
    }

    pub fn detach(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_attached(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for ProviderBridge {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_reaches_only_matching_kind() {
        let emitter = EventEmitter::new();
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();

        emitter.on(
            EventKind::Change,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        emitter.emit(ConnectorEvent::Change(ConnectionPatch::account("0x2")));
        emitter.emit(ConnectorEvent::Disconnect);

        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_listener() {
        let emitter = EventEmitter::new();
        let id = emitter.on(EventKind::Error, Arc::new(|_| {}));
        assert_eq!(emitter.listener_count(EventKind::Error), 1);

        assert!(emitter.off(id));
        assert!(!emitter.off(id));
        assert_eq!(emitter.listener_count(EventKind::Error), 0);
    }

    #[tokio::test]
    async fn test_bridge_forwards_and_detaches() {
        let (tx, rx) = broadcast::channel(8);
        let (seen_tx, mut seen_rx) = tokio::sync::mpsc::unbounded_channel();
        let bridge = ProviderBridge::new();

        bridge.attach(rx, move |event| {
            let _ = seen_tx.send(event);
        });
        assert!(bridge.is_attached());

        tx.send(ProviderEvent::Disconnect).unwrap();
        assert_eq!(seen_rx.recv().await, Some(Ok(ProviderEvent::Disconnect)));

        bridge.detach();
        assert!(!bridge.is_attached());
    }
}
