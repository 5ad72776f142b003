//! src/eventbus/mod.rs
//!
//! Provides an in-process event bus that fans events out to multiple
//! subscribers via bounded MPSC queues.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use cmdbridge_common::models::{ChatUser, CommandRuntimeState};

/// Domain events surfaced to whoever subscribes. Fire-and-forget: the
/// session never waits for a reply.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// The session reached `Joined`.
    JoinedChat,

    /// Any chat message, including the client's own echoed sends.
    MessageReceived {
        user: Arc<ChatUser>,
        text: String,
        timestamp: DateTime<Utc>,
    },

    /// A command passed its enabled/cooldown checks and was dispatched.
    CommandReceived {
        user: Arc<ChatUser>,
        command: CommandRuntimeState,
        timestamp: DateTime<Utc>,
    },

    /// No join confirmation arrived within the connect timeout.
    FailedToConnect { attempt: u64 },
}

/// Each subscriber gets its own `mpsc::Sender<ChatEvent>`.
///
/// - Publishing never waits. If a subscriber's buffer is full the event is
///   dropped for that subscriber only and a warning is logged.
/// - If the subscriber has dropped the `Receiver`, it is pruned on the next publish.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<ChatEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Default size for each subscriber's buffer.
const DEFAULT_BUFFER_SIZE: usize = 200;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// A receiver that flips to `true` when `shutdown` is called.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Create a new subscriber with a bounded buffer size (or use `DEFAULT_BUFFER_SIZE`).
    pub fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<ChatEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);

        let mut subs = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        subs.push(tx);

        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    /// Publish an event to all subscribers without blocking the caller.
    pub fn publish(&self, event: ChatEvent) {
        // Clone the senders outside the lock
        let senders = {
            let guard = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
            guard.clone()
        };

        let mut closed = false;
        for s in senders {
            match s.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(dropped)) => {
                    warn!("EventBus subscriber is full, dropping {:?}", dropped);
                }
                Err(TrySendError::Closed(_)) => closed = true,
            }
        }

        if closed {
            let mut guard = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
            guard.retain(|s| !s.is_closed());
            debug!("EventBus pruned closed subscribers, {} left", guard.len());
        }
    }

    pub fn publish_message(&self, user: Arc<ChatUser>, text: &str) {
        self.publish(ChatEvent::MessageReceived {
            user,
            text: text.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn publish_command(&self, user: Arc<ChatUser>, command: CommandRuntimeState) {
        self.publish(ChatEvent::CommandReceived {
            user,
            command,
            timestamp: Utc::now(),
        });
    }
}
