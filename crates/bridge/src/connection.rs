//! Connection lifecycle shared by the producer and the admin client

use crate::engine::{Engine, EngineHandle, NotificationKind};
use crate::error::{BridgeError, Result};
use kafka_bridge_config::{ClientOptions, ClientRole, EngineConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{OnceCell, OwnedRwLockWriteGuard, RwLock};
use tracing::debug;

/// Lifecycle state of a client. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum ConnectionState {
    Init = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
    Disconnected = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Init,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Disconnecting,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Init => "INIT",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnecting => "DISCONNECTING",
            ConnectionState::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic cell holding a [`ConnectionState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        StateCell(AtomicU8::new(ConnectionState::Init as u8))
    }

    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`; fails if the current state is not `from`.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to `to` unless already there or further; returns the previous state.
    pub fn advance(&self, to: ConnectionState) -> ConnectionState {
        let previous = self
            .0
            .fetch_max(to as u8, Ordering::AcqRel);
        ConnectionState::from_u8(previous)
    }
}

/// Engine handle, configuration and state of one client.
///
/// The structural lock serializes handle creation, teardown and admin
/// command submission. Produce traffic and the poll loop work from a
/// handle snapshot and never take it.
pub struct Connection<E: Engine> {
    engine: E,
    options: ClientOptions,
    role: ClientRole,
    config: OnceCell<EngineConfig>,
    state: Arc<StateCell>,
    lock: Arc<RwLock<()>>,
    handle: parking_lot::RwLock<Option<Arc<E::Handle>>>,
}

impl<E: Engine> Connection<E> {
    pub fn new(engine: E, options: ClientOptions, role: ClientRole) -> Self {
        Self {
            engine,
            options,
            role,
            config: OnceCell::new(),
            state: Arc::new(StateCell::new()),
            lock: Arc::new(RwLock::new(())),
            handle: parking_lot::RwLock::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn role(&self) -> ClientRole {
        self.role
    }

    pub(crate) fn state_cell(&self) -> Arc<StateCell> {
        self.state.clone()
    }

    pub(crate) fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let moved = self.state.transition(from, to);
        if moved {
            debug!(role = ?self.role, from = %from, to = %to, "Connection state changed");
        }
        moved
    }

    pub(crate) fn advance(&self, to: ConnectionState) -> ConnectionState {
        let previous = self.state.advance(to);
        if previous < to {
            debug!(role = ?self.role, from = %previous, to = %to, "Connection state changed");
        }
        previous
    }

    /// Fail with a state error unless connected.
    pub(crate) fn ensure_connected(&self, operation: &str) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(BridgeError::state(
                format!("{} requires a connected client", operation),
                state,
            ));
        }
        Ok(())
    }

    pub(crate) async fn lock(&self) -> OwnedRwLockWriteGuard<()> {
        self.lock.clone().write_owned().await
    }

    /// Engine configuration, built on first use and reused afterwards.
    pub(crate) async fn engine_config(&self) -> Result<&EngineConfig> {
        self.config
            .get_or_try_init(|| async { self.build_config().await })
            .await
    }

    async fn build_config(&self) -> Result<EngineConfig> {
        let mut config = self.options.translate(self.role)?;

        if let Some(ref path) = self.options.security.sasl_password_file {
            let password = tokio::fs::read_to_string(path).await?;
            config.set("sasl.password", password.trim_end());
        }

        debug!(role = ?self.role, properties = config.len(), "Built engine configuration");
        Ok(config)
    }

    /// Create the engine handle and publish it.
    pub(crate) fn create_handle(&self, config: &EngineConfig) -> Result<Arc<E::Handle>> {
        let handle = self
            .engine
            .create(config)
            .map(Arc::new)
            .map_err(|e| BridgeError::engine("create client", e))?;
        *self.handle.write() = Some(handle.clone());
        Ok(handle)
    }

    /// Snapshot of the current handle.
    pub(crate) fn handle(&self) -> Option<Arc<E::Handle>> {
        self.handle.read().clone()
    }

    /// Remove the handle, clearing its listeners.
    pub(crate) fn take_handle(&self) -> Option<Arc<E::Handle>> {
        let handle = self.handle.write().take();
        if let Some(ref handle) = handle {
            for kind in NotificationKind::ALL {
                handle.unlisten(kind);
            }
        }
        handle
    }
}

impl<E: Engine> fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role)
            .field("state", &self.state())
            .finish()
    }
}
