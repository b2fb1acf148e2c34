//! Lifecycle notifications.
//!
//! Every actor owns an [`EventEmitter`]. Dispatch emits [`ActorEvent::BeforeReceive`]
//! before invoking a handler and [`ActorEvent::AfterReceive`] once it returns
//! successfully. Listeners observe; they never influence delivery. A listener that
//! fails or panics is logged and skipped.

use parking_lot::RwLock;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::error::BoxError;
use crate::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorEvent {
    BeforeReceive,
    AfterReceive,
}

impl ActorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ActorEvent::BeforeReceive => "before:receive",
            ActorEvent::AfterReceive => "after:receive",
        }
    }
}

impl fmt::Display for ActorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Handle returned by [`EventEmitter::on`], used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Arc<dyn Fn(&Message) -> Result<(), BoxError> + Send + Sync>;

struct Listener {
    id: ListenerId,
    event: ActorEvent,
    once: bool,
    callback: Callback,
}

#[derive(Default)]
pub struct EventEmitter {
    listeners: RwLock<Vec<Listener>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, event: ActorEvent, callback: F) -> ListenerId
    where
        F: Fn(&Message) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.add(event, false, Arc::new(callback))
    }

    /// Like [`EventEmitter::on`], but the listener is removed before its first call.
    pub fn once<F>(&self, event: ActorEvent, callback: F) -> ListenerId
    where
        F: Fn(&Message) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.add(event, true, Arc::new(callback))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        listeners.len() != before
    }

    /// Removes listeners for `event`, or every listener when `event` is `None`.
    pub fn remove_all_listeners(&self, event: Option<ActorEvent>) {
        let mut listeners = self.listeners.write();
        match event {
            Some(event) => listeners.retain(|listener| listener.event != event),
            None => listeners.clear(),
        }
    }

    pub fn listener_count(&self, event: ActorEvent) -> usize {
        self.listeners
            .read()
            .iter()
            .filter(|listener| listener.event == event)
            .count()
    }

    /// Events with at least one listener.
    pub fn event_names(&self) -> Vec<ActorEvent> {
        let mut names = Vec::new();
        for listener in self.listeners.read().iter() {
            if !names.contains(&listener.event) {
                names.push(listener.event);
            }
        }
        names
    }

    /// Calls every listener for `event` in registration order; returns how many ran.
    ///
    /// Listeners registered while emitting are not called for this emission.
    pub fn emit(&self, event: ActorEvent, message: &Message) -> usize {
        let snapshot: Vec<Callback> = {
            let mut listeners = self.listeners.write();
            let snapshot = listeners
                .iter()
                .filter(|listener| listener.event == event)
                .map(|listener| listener.callback.clone())
                .collect();
            listeners.retain(|listener| !(listener.once && listener.event == event));
            snapshot
        };

        for callback in &snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(message))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(event = event.name(), message = %message.id(), error = %e, "Listener failed")
                }
                Err(_) => warn!(event = event.name(), message = %message.id(), "Listener panicked"),
            }
        }
        snapshot.len()
    }

    fn add(&self, event: ActorEvent, once: bool, callback: Callback) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push(Listener {
            id,
            event,
            once,
            callback,
        });
        id
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
