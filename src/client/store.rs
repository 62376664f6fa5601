//! Observable state container
//!
//! A [`Store`] holds one state value and replaces it atomically. After
//! every replacement it runs the persistence hook and then notifies the
//! registered observers whose selected slice changed.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle identifying a store subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type StateListener<S> = Arc<dyn Fn(&S, &S) + Send + Sync>;
type PersistHook<S> = Box<dyn Fn(&S) + Send + Sync>;

pub struct Store<S> {
    state: Mutex<S>,
    listeners: Mutex<Vec<(SubscriptionId, StateListener<S>)>>,
    persist: Option<PersistHook<S>>,
    next_id: AtomicU64,
    disposed: AtomicBool,
}

impl<S: Clone + Send + 'static> Store<S> {
    pub fn new(initial: S) -> Self {
        Self {
            state: Mutex::new(initial),
            listeners: Mutex::new(Vec::new()),
            persist: None,
            next_id: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    /// Run `hook` with the new state after every replacement
    pub fn with_persist<F>(mut self, hook: F) -> Self
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        self.persist = Some(Box::new(hook));
        self
    }

    /// Snapshot of the current state
    pub fn get_state(&self) -> S {
        self.state.lock().clone()
    }

    /// Read part of the state without cloning all of it
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.lock())
    }

    /// Replace the whole state.
    ///
    /// `updater` runs under the state lock and must not call back into
    /// the store. Observers run after the lock is released.
    pub fn set_state(&self, updater: impl FnOnce(&S) -> S) {
        if self.is_disposed() {
            warn!("set_state called on a disposed store");
            return;
        }

        let (previous, next) = {
            let mut state = self.state.lock();
            let next = updater(&state);
            let previous = std::mem::replace(&mut *state, next.clone());
            (previous, next)
        };

        if let Some(persist) = &self.persist {
            persist(&next);
        }

        let listeners: Vec<StateListener<S>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&next, &previous);
        }
    }

    /// Observe a slice of the state.
    ///
    /// `listener(current, previous)` fires after a replacement whenever the
    /// selected value changed.
    pub fn subscribe<T, Sel, L>(&self, selector: Sel, listener: L) -> SubscriptionId
    where
        T: PartialEq + 'static,
        Sel: Fn(&S) -> T + Send + Sync + 'static,
        L: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.subscribe_with_equality(selector, |a: &T, b: &T| a == b, listener)
    }

    /// Observe a slice of the state with a custom equality check
    pub fn subscribe_with_equality<T, Sel, Eq, L>(
        &self,
        selector: Sel,
        equality: Eq,
        listener: L,
    ) -> SubscriptionId
    where
        T: 'static,
        Sel: Fn(&S) -> T + Send + Sync + 'static,
        Eq: Fn(&T, &T) -> bool + Send + Sync + 'static,
        L: Fn(&T, &T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let wrapped: StateListener<S> = Arc::new(move |next: &S, previous: &S| {
            let current = selector(next);
            let before = selector(previous);
            if !equality(&current, &before) {
                listener(&current, &before);
            }
        });
        self.listeners.lock().push((id, wrapped));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Drop every observer; later replacements are ignored
    pub fn destroy(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        let removed = std::mem::take(&mut *self.listeners.lock());
        debug!("Store disposed, {} subscription(s) dropped", removed.len());
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
