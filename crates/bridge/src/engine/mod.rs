//! Seam between the bridge and the native messaging engine
//!
//! The engine is callback driven: it reports connection readiness, errors,
//! log lines and delivery reports through named listeners, possibly from its
//! own threads, and answers admin commands on a dedicated result queue. The
//! bridge only talks to it through the traits below.

pub mod kafka;
pub mod mock;

use crate::admin::{AdminCommand, RequestOptions, ResultEvent};
use crate::error::EngineError;
use kafka_bridge_config::EngineConfig;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub use kafka::{BridgeContext, RdKafkaEngine, RdKafkaHandle};
pub use mock::{AdminScript, ConnectBehavior, DeliveryScript, MockEngine, MockHandle};

/// Factory for engine handles.
pub trait Engine: Send + Sync + 'static {
    type Handle: EngineHandle;

    /// Create a native handle from translated configuration.
    fn create(&self, config: &EngineConfig) -> Result<Self::Handle, EngineError>;
}

/// A live native handle.
///
/// `connect` only starts connecting; the outcome arrives as a
/// [`Notification::Ready`] or [`Notification::Error`]. `disconnect`,
/// `poll` and queue polls may block and must not be called on an async
/// worker thread for longer than a zero wait.
pub trait EngineHandle: Send + Sync + 'static {
    type Queue: ResultQueue;

    fn listeners(&self) -> &Listeners;

    fn connect(&self) -> Result<(), EngineError>;

    fn disconnect(&self, timeout: Duration) -> Result<(), EngineError>;

    /// Enqueue a record; its delivery report carries `token`.
    fn produce(&self, record: OutboundRecord, token: DeliveryToken) -> Result<(), EngineError>;

    /// Serve queued callbacks, waiting up to `timeout` for the first one.
    fn poll(&self, timeout: Duration);

    /// Allocate a result queue for a single admin command.
    fn new_queue(&self) -> Self::Queue;

    /// Submit an admin command whose result event is posted to `queue`.
    fn submit(
        &self,
        command: AdminCommand,
        options: &RequestOptions,
        queue: &Self::Queue,
    ) -> Result<(), EngineError>;

    fn listen(&self, kind: NotificationKind, listener: Listener) {
        self.listeners().set(kind, listener);
    }

    fn unlisten(&self, kind: NotificationKind) {
        self.listeners().remove(kind);
    }
}

/// Dedicated queue receiving the result event of one admin command.
pub trait ResultQueue: Send + 'static {
    /// Block up to `timeout` for the next event.
    fn poll(&self, timeout: Duration) -> Option<ResultEvent>;
}

/// Result queue backed by a channel; the engine side posts through a
/// cloned [`Sender`].
pub struct ChannelQueue {
    sender: Sender<ResultEvent>,
    receiver: Mutex<Receiver<ResultEvent>>,
}

impl ChannelQueue {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    pub fn sender(&self) -> Sender<ResultEvent> {
        self.sender.clone()
    }
}

impl Default for ChannelQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultQueue for ChannelQueue {
    fn poll(&self, timeout: Duration) -> Option<ResultEvent> {
        self.receiver.lock().recv_timeout(timeout).ok()
    }
}

/// Callback registered for one notification kind.
pub type Listener = Arc<dyn Fn(Notification) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Ready,
    Error,
    Log,
    Delivery,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::Ready,
        NotificationKind::Error,
        NotificationKind::Log,
        NotificationKind::Delivery,
    ];
}

/// Notification emitted by the engine.
#[derive(Debug, Clone)]
pub enum Notification {
    Ready,
    Error(EngineError),
    Log(LogRecord),
    Delivery(DeliveryReport),
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::Ready => NotificationKind::Ready,
            Notification::Error(_) => NotificationKind::Error,
            Notification::Log(_) => NotificationKind::Log,
            Notification::Delivery(_) => NotificationKind::Delivery,
        }
    }
}

/// Listener table shared between a handle and its engine callbacks.
#[derive(Default)]
pub struct Listeners {
    inner: RwLock<HashMap<NotificationKind, Listener>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener`, replacing any previous one for `kind`.
    pub fn set(&self, kind: NotificationKind, listener: Listener) {
        self.inner.write().insert(kind, listener);
    }

    pub fn remove(&self, kind: NotificationKind) {
        self.inner.write().remove(&kind);
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn is_registered(&self, kind: NotificationKind) -> bool {
        self.inner.read().contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Invoke the listener for the notification's kind.
    ///
    /// The table lock is released before the listener runs, so listeners
    /// may register or remove listeners themselves.
    pub fn dispatch(&self, notification: Notification) {
        let listener = self.inner.read().get(&notification.kind()).cloned();
        match listener {
            Some(listener) => listener(notification),
            None => debug!(kind = ?notification.kind(), "No listener registered, dropping notification"),
        }
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<NotificationKind> = self.inner.read().keys().copied().collect();
        f.debug_struct("Listeners").field("kinds", &kinds).finish()
    }
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Correlation token carried through the engine as the message opaque.
///
/// Tokens are never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryToken(u64);

impl DeliveryToken {
    pub fn next() -> Self {
        DeliveryToken(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Record handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    /// Target partition, `-1` lets the engine's partitioner choose.
    pub partition: i32,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
    pub headers: Vec<(String, Vec<u8>)>,
}

/// Outcome of one produced record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub token: Option<DeliveryToken>,
    pub topic: String,
    pub partition: i32,
    pub offset: Option<i64>,
    pub error: Option<EngineError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
    Debug,
}

/// Log line emitted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub facility: String,
    pub message: String,
}

impl LogRecord {
    /// Forward the line to `tracing` at the matching level.
    pub fn emit(&self) {
        let facility = self.facility.as_str();
        let message = self.message.as_str();
        match self.level {
            LogLevel::Error => error!(target: "kafka_bridge::engine", facility, "{}", message),
            LogLevel::Warning => warn!(target: "kafka_bridge::engine", facility, "{}", message),
            LogLevel::Info => info!(target: "kafka_bridge::engine", facility, "{}", message),
            LogLevel::Debug => debug!(target: "kafka_bridge::engine", facility, "{}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_tokens_are_unique() {
        let a = DeliveryToken::next();
        let b = DeliveryToken::next();
        assert_ne!(a, b);
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_dispatch_reaches_registered_listener() {
        let listeners = Listeners::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        listeners.set(
            NotificationKind::Ready,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        listeners.dispatch(Notification::Ready);
        listeners.dispatch(Notification::Error(EngineError::new(
            crate::error::ErrorCode::FAIL,
        )));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        listeners.remove(NotificationKind::Ready);
        listeners.dispatch(Notification::Ready);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_listener_may_reregister_during_dispatch() {
        let listeners = Arc::new(Listeners::new());
        let inner = listeners.clone();
        listeners.set(
            NotificationKind::Ready,
            Arc::new(move |_| {
                inner.remove(NotificationKind::Ready);
            }),
        );

        listeners.dispatch(Notification::Ready);
        assert!(!listeners.is_registered(NotificationKind::Ready));
    }
}
