//! Future-oriented producer
//!
//! `connect` resolves once the engine reports readiness, `send` resolves
//! once every message of the request has a delivery report. Delivery
//! reports are correlated with their messages through a [`DeliveryToken`]
//! carried as the message opaque.

pub mod aggregate;
mod delivery;
pub mod message;

pub use aggregate::aggregate;
pub use message::{
    DeliveryMetadata, Message, MessageHeader, ProduceRequest, RecordMetadata,
    UNASSIGNED_PARTITION,
};

use crate::admin::AdminClient;
use crate::connection::{Connection, ConnectionState};
use crate::engine::{
    DeliveryToken, Engine, EngineHandle, Notification, NotificationKind,
};
use crate::error::{BridgeError, EngineError, ErrorCode, Result};
use crate::poller::Poller;
use chrono::Utc;
use delivery::DeliveryRegistry;
use futures::future::join_all;
use kafka_bridge_config::{ClientOptions, ClientRole};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Producer bridging engine callbacks into futures.
pub struct Producer<E: Engine> {
    inner: Arc<ProducerInner<E>>,
}

struct ProducerInner<E: Engine> {
    connection: Arc<Connection<E>>,
    deliveries: DeliveryRegistry,
    pending_connect: Mutex<Option<oneshot::Sender<Result<()>>>>,
    runtime: Mutex<Option<Handle>>,
    poller: Mutex<Option<Poller>>,
}

impl<E: Engine> Producer<E> {
    pub fn new(engine: E, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(ProducerInner {
                connection: Arc::new(Connection::new(engine, options, ClientRole::Producer)),
                deliveries: DeliveryRegistry::new(),
                pending_connect: Mutex::new(None),
                runtime: Mutex::new(None),
                poller: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.connection.state()
    }

    /// Number of messages still waiting for a delivery report.
    pub fn pending_deliveries(&self) -> usize {
        self.inner.deliveries.len()
    }

    /// Admin client sharing this producer's connection.
    ///
    /// Its lifecycle follows the producer; its own `connect` and
    /// `disconnect` are rejected.
    pub fn admin_client(&self) -> AdminClient<E> {
        AdminClient::dependent(self.inner.connection.clone())
    }

    /// Connect to the cluster.
    ///
    /// Only valid once, from the initial state. Resolves when the engine
    /// reports readiness and fails with the engine error if it reports an
    /// error first, in which case the client ends up disconnected.
    pub async fn connect(&self) -> Result<()> {
        let connection = &self.inner.connection;

        if !connection.transition(ConnectionState::Init, ConnectionState::Connecting) {
            let state = connection.state();
            let message = if state < ConnectionState::Disconnecting {
                "client is already connecting or connected"
            } else {
                "client has been disconnected"
            };
            return Err(BridgeError::state(message, state));
        }

        info!(
            brokers = %connection.options().bootstrap_servers.join(","),
            "Connecting producer"
        );

        let receiver = {
            let _guard = connection.lock().await;
            let state = connection.state();
            if state != ConnectionState::Connecting {
                return Err(BridgeError::state("connect interrupted by disconnect", state));
            }

            match self.inner.start_connect().await {
                Ok(receiver) => receiver,
                Err(e) => {
                    error!(error = %e, "Failed to start connecting");
                    self.inner.release_handle().await;
                    return Err(e);
                }
            }
        };

        match receiver.await {
            Ok(Ok(())) => {
                info!("Producer connected");
                Ok(())
            }
            Ok(Err(e)) => {
                error!(error = %e, "Producer failed to connect");
                let _guard = connection.lock().await;
                self.inner.release_handle().await;
                Err(e)
            }
            Err(_) => Err(BridgeError::state(
                "connect was abandoned",
                connection.state(),
            )),
        }
    }

    /// Disconnect from the cluster.
    ///
    /// A no-op once disconnection has begun. The state moves to
    /// `Disconnecting` before anything else happens, which stops the poll
    /// loop and rejects new sends. Messages still undelivered after the
    /// engine's bounded disconnect are failed.
    pub async fn disconnect(&self) -> Result<()> {
        let inner = &self.inner;
        let connection = &inner.connection;

        let previous = connection.advance(ConnectionState::Disconnecting);
        if previous >= ConnectionState::Disconnecting {
            debug!(state = %previous, "Producer already disconnecting");
            return Ok(());
        }
        info!(from = %previous, "Disconnecting producer");

        let _guard = connection.lock().await;

        let pending = inner.pending_connect.lock().take();
        if let Some(pending) = pending {
            let _ = pending.send(Err(BridgeError::state(
                "disconnected while connecting",
                ConnectionState::Disconnecting,
            )));
        }

        let outcome = match connection.handle() {
            Some(handle) => {
                let timeout = connection.options().bridge.disconnect_timeout();
                tokio::task::spawn_blocking(move || handle.disconnect(timeout))
                    .await
                    .unwrap_or_else(|e| Err(EngineError::with_message(ErrorCode::FAIL, e.to_string())))
            }
            None => Ok(()),
        };

        let poller = inner.poller.lock().take();
        if let Some(poller) = poller {
            poller.join().await;
        }

        inner.release_handle().await;

        let rejected = inner.deliveries.reject_all();
        if rejected > 0 {
            warn!(rejected, "Failed deliveries still pending at disconnect");
        }

        match outcome {
            Ok(()) => {
                info!("Producer disconnected");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Engine disconnect failed");
                Err(BridgeError::engine("disconnect", e))
            }
        }
    }

    /// Produce every message of `request` and wait for all delivery reports.
    ///
    /// Messages without a partition are submitted with partition `-1`.
    /// The result holds one entry per topic-partition with its lowest
    /// reported base offset. If any message failed, the first failure in
    /// request order is returned once all messages have settled.
    pub async fn send(&self, request: ProduceRequest) -> Result<Vec<RecordMetadata>> {
        let inner = &self.inner;
        let connection = &inner.connection;

        connection.ensure_connected("send")?;
        request.validate()?;

        let handle = connection
            .handle()
            .ok_or_else(|| BridgeError::state("no engine handle", connection.state()))?;

        let now = Utc::now().timestamp_millis();
        let ProduceRequest { topic, messages } = request;
        debug!(topic = %topic, messages = messages.len(), "Sending messages");

        let mut receivers = Vec::with_capacity(messages.len());
        for message in messages {
            let token = DeliveryToken::next();
            let record = message.into_record(&topic, now);
            receivers.push(inner.deliveries.register(token, &topic, record.partition));

            if let Err(e) = handle.produce(record, token) {
                warn!(topic = %topic, error = %e, "Engine rejected message");
                inner.deliveries.fail(token, e);
            }
        }
        drop(handle);

        // Reports can no longer arrive once fully disconnected.
        if connection.state() == ConnectionState::Disconnected {
            inner.deliveries.reject_all();
        }

        let outcomes = join_all(receivers).await;

        let mut deliveries = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                Ok(Ok(metadata)) => deliveries.push(metadata),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(BridgeError::Undelivered {
                        topic,
                        partition: UNASSIGNED_PARTITION,
                    })
                }
            }
        }

        Ok(aggregate(deliveries))
    }
}

impl<E: Engine> Clone for Producer<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Engine> ProducerInner<E> {
    /// Build the configuration, create the handle, register listeners and
    /// start the engine connect. Called with the structural lock held.
    async fn start_connect(self: &Arc<Self>) -> Result<oneshot::Receiver<Result<()>>> {
        let config = self.connection.engine_config().await?;
        let handle = self.connection.create_handle(config)?;

        *self.runtime.lock() = Some(Handle::current());
        let (sender, receiver) = oneshot::channel();
        *self.pending_connect.lock() = Some(sender);

        let weak = Arc::downgrade(self);
        handle.listen(
            NotificationKind::Ready,
            Arc::new(move |_| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_ready();
                }
            }),
        );

        let weak = Arc::downgrade(self);
        handle.listen(
            NotificationKind::Error,
            Arc::new(move |notification| {
                if let (Some(inner), Notification::Error(err)) = (weak.upgrade(), notification) {
                    inner.on_error(err);
                }
            }),
        );

        handle.listen(
            NotificationKind::Log,
            Arc::new(|notification| {
                if let Notification::Log(record) = notification {
                    record.emit();
                }
            }),
        );

        handle
            .connect()
            .map_err(|e| BridgeError::engine("connect", e))?;
        Ok(receiver)
    }

    fn on_ready(self: Arc<Self>) {
        let state = self.connection.state();
        if state != ConnectionState::Connecting {
            warn!(state = %state, "Ignoring ready notification");
            return;
        }

        // Sends are accepted from the moment the state reads Connected, so
        // reports must already have a listener by then.
        let handle = self.connection.handle();
        if let Some(ref handle) = handle {
            let weak = Arc::downgrade(&self);
            handle.listen(
                NotificationKind::Delivery,
                Arc::new(move |notification| {
                    if let (Some(inner), Notification::Delivery(report)) =
                        (weak.upgrade(), notification)
                    {
                        inner.deliveries.settle(report);
                    }
                }),
            );
        }

        if !self
            .connection
            .transition(ConnectionState::Connecting, ConnectionState::Connected)
        {
            warn!(state = %self.connection.state(), "Ignoring ready notification");
            if let Some(ref handle) = handle {
                handle.unlisten(NotificationKind::Delivery);
            }
            return;
        }

        let runtime = self.runtime.lock().clone();
        match (handle, runtime) {
            (Some(handle), Some(runtime)) => {
                let poller = Poller::spawn(
                    &runtime,
                    handle,
                    self.connection.state_cell(),
                    self.connection.options().bridge.poll_interval(),
                );
                *self.poller.lock() = Some(poller);
            }
            _ => warn!("Connected without an engine handle or runtime"),
        }

        if let Some(pending) = self.pending_connect.lock().take() {
            let _ = pending.send(Ok(()));
        }
    }

    fn on_error(self: Arc<Self>, err: EngineError) {
        if self
            .connection
            .transition(ConnectionState::Connecting, ConnectionState::Disconnecting)
        {
            if let Some(pending) = self.pending_connect.lock().take() {
                let _ = pending.send(Err(BridgeError::engine("connect", err)));
            }
        } else {
            error!(error = %err, state = %self.connection.state(), "Engine error");
        }
    }

    /// Drop the engine handle off the async workers and finish in
    /// `Disconnected`. Callers hold the structural lock.
    async fn release_handle(&self) {
        if let Some(handle) = self.connection.take_handle() {
            if let Err(e) = tokio::task::spawn_blocking(move || drop(handle)).await {
                warn!(error = %e, "Failed to release engine handle");
            }
        }
        self.connection.advance(ConnectionState::Disconnected);
    }
}
