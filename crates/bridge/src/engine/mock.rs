//! Scriptable in-process engine
//!
//! Records what the bridge asks of it and answers from scripts: connect
//! outcomes, per-message delivery behaviour and admin responses. Delivery
//! reports are queued at produce time and dispatched from `poll` (or from
//! `disconnect`, which flushes), the same thread discipline the native
//! engine follows.

use super::{
    ChannelQueue, DeliveryReport, DeliveryToken, Engine, EngineHandle, Listeners, Notification,
    OutboundRecord,
};
use crate::admin::{
    AdminCommand, EventPayload, GroupDescription, GroupResult, ListGroupsResult, RequestOptions,
    ResourceOutcome, ResultEvent, ResultKind,
};
use crate::error::EngineError;
use kafka_bridge_config::EngineConfig;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a handle answers `connect`.
#[derive(Debug, Clone, Default)]
pub enum ConnectBehavior {
    /// Report readiness immediately.
    #[default]
    Ready,
    /// Report this error immediately.
    Fail(EngineError),
    /// Report nothing; the test emits notifications itself.
    Silent,
}

/// Behaviour for the next produced message.
#[derive(Debug, Clone)]
pub enum DeliveryScript {
    /// Deliver, optionally overriding the assigned partition and offset.
    Deliver {
        partition: Option<i32>,
        offset: Option<i64>,
    },
    /// Report a delivery without an offset.
    WithoutOffset,
    /// Report a delivery failure.
    Fail(EngineError),
    /// Refuse the message synchronously.
    Reject(EngineError),
    /// Report delivery without the correlation token.
    Untracked,
    /// Never report.
    Withhold,
}

/// Answer for the next admin command.
#[derive(Debug, Clone)]
pub enum AdminScript {
    Respond(ResultEvent),
    /// Post nothing.
    Silence,
    /// Post an empty event of another kind.
    Mismatch(ResultKind),
}

#[derive(Default)]
struct EngineState {
    handles: Mutex<Vec<MockHandle>>,
    connect_behavior: Mutex<ConnectBehavior>,
    create_error: Mutex<Option<EngineError>>,
    disconnect_error: Mutex<Option<EngineError>>,
    deliveries: Mutex<VecDeque<DeliveryScript>>,
    admin: Mutex<VecDeque<AdminScript>>,
}

/// Engine double shared between a test and the client under test.
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<EngineState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_behavior(self, behavior: ConnectBehavior) -> Self {
        *self.state.connect_behavior.lock() = behavior;
        self
    }

    /// Make the next `create` fail.
    pub fn fail_create(&self, error: EngineError) {
        *self.state.create_error.lock() = Some(error);
    }

    /// Make every subsequent `disconnect` fail.
    pub fn fail_disconnect(&self, error: EngineError) {
        *self.state.disconnect_error.lock() = Some(error);
    }

    pub fn script_delivery(&self, script: DeliveryScript) {
        self.state.deliveries.lock().push_back(script);
    }

    pub fn script_admin(&self, script: AdminScript) {
        self.state.admin.lock().push_back(script);
    }

    /// Handles created so far, oldest first.
    pub fn handles(&self) -> Vec<MockHandle> {
        self.state.handles.lock().clone()
    }
}

impl Engine for MockEngine {
    type Handle = MockHandle;

    fn create(&self, config: &EngineConfig) -> Result<MockHandle, EngineError> {
        if let Some(err) = self.state.create_error.lock().take() {
            return Err(err);
        }

        let handle = MockHandle {
            inner: Arc::new(HandleState {
                engine: self.state.clone(),
                config: config.clone(),
                listeners: Listeners::new(),
                produced: Mutex::new(Vec::new()),
                reports: Mutex::new(VecDeque::new()),
                offsets: Mutex::new(HashMap::new()),
                submitted: Mutex::new(Vec::new()),
                polls: AtomicUsize::new(0),
                queues: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
            }),
        };
        self.state.handles.lock().push(handle.clone());
        Ok(handle)
    }
}

struct HandleState {
    engine: Arc<EngineState>,
    config: EngineConfig,
    listeners: Listeners,
    produced: Mutex<Vec<OutboundRecord>>,
    reports: Mutex<VecDeque<DeliveryReport>>,
    offsets: Mutex<HashMap<(String, i32), i64>>,
    submitted: Mutex<Vec<(AdminCommand, RequestOptions)>>,
    polls: AtomicUsize,
    queues: AtomicUsize,
    disconnects: AtomicUsize,
}

/// Handle created by [`MockEngine`]. Clones share state.
#[derive(Clone)]
pub struct MockHandle {
    inner: Arc<HandleState>,
}

impl MockHandle {
    /// Dispatch a notification as if the engine emitted it.
    pub fn emit(&self, notification: Notification) {
        self.inner.listeners.dispatch(notification);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn produced(&self) -> Vec<OutboundRecord> {
        self.inner.produced.lock().clone()
    }

    pub fn submitted(&self) -> Vec<AdminCommand> {
        self.inner
            .submitted
            .lock()
            .iter()
            .map(|(command, _)| command.clone())
            .collect()
    }

    pub fn submitted_options(&self) -> Vec<RequestOptions> {
        self.inner
            .submitted
            .lock()
            .iter()
            .map(|(_, options)| options.clone())
            .collect()
    }

    pub fn poll_count(&self) -> usize {
        self.inner.polls.load(Ordering::SeqCst)
    }

    pub fn queues_created(&self) -> usize {
        self.inner.queues.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.inner.disconnects.load(Ordering::SeqCst)
    }

    /// Reports queued but not yet dispatched.
    pub fn queued_reports(&self) -> usize {
        self.inner.reports.lock().len()
    }

    fn next_offset(&self, topic: &str, partition: i32) -> i64 {
        let mut offsets = self.inner.offsets.lock();
        let next = offsets.entry((topic.to_string(), partition)).or_insert(0);
        let offset = *next;
        *next += 1;
        offset
    }

    fn dispatch_reports(&self) {
        loop {
            // Release the queue before calling into listeners.
            let report = self.inner.reports.lock().pop_front();
            match report {
                Some(report) => self.emit(Notification::Delivery(report)),
                None => break,
            }
        }
    }

    fn default_response(command: &AdminCommand) -> ResultEvent {
        let kind = command.result_kind();
        match command {
            AdminCommand::CreateTopics(topics) => ResultEvent::resources(
                kind,
                topics.iter().map(|t| ResourceOutcome::ok(&t.name)).collect(),
            ),
            AdminCommand::DeleteTopics(topics) => ResultEvent::resources(
                kind,
                topics.iter().map(ResourceOutcome::ok).collect(),
            ),
            AdminCommand::CreatePartitions(partitions) => ResultEvent::resources(
                kind,
                partitions
                    .iter()
                    .map(|p| ResourceOutcome::ok(&p.topic))
                    .collect(),
            ),
            AdminCommand::ListGroups => ResultEvent::new(
                kind,
                EventPayload::ListGroups(ListGroupsResult::default()),
            ),
            AdminCommand::DescribeGroups(groups) => ResultEvent::new(
                kind,
                EventPayload::DescribeGroups(
                    groups.iter().map(GroupDescription::not_found).collect(),
                ),
            ),
            AdminCommand::DeleteGroups(groups) => ResultEvent::new(
                kind,
                EventPayload::DeleteGroups(
                    groups
                        .iter()
                        .map(|group| GroupResult {
                            group_id: group.clone(),
                            error: None,
                        })
                        .collect(),
                ),
            ),
        }
    }
}

impl EngineHandle for MockHandle {
    type Queue = ChannelQueue;

    fn listeners(&self) -> &Listeners {
        &self.inner.listeners
    }

    fn connect(&self) -> Result<(), EngineError> {
        let behavior = self.inner.engine.connect_behavior.lock().clone();
        match behavior {
            ConnectBehavior::Ready => self.emit(Notification::Ready),
            ConnectBehavior::Fail(err) => self.emit(Notification::Error(err)),
            ConnectBehavior::Silent => {}
        }
        Ok(())
    }

    fn disconnect(&self, _timeout: Duration) -> Result<(), EngineError> {
        self.inner.disconnects.fetch_add(1, Ordering::SeqCst);
        self.dispatch_reports();
        match self.inner.engine.disconnect_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn produce(&self, record: OutboundRecord, token: DeliveryToken) -> Result<(), EngineError> {
        let script = self.inner.engine.deliveries.lock().pop_front();
        let default_partition = record.partition.max(0);

        let report = match script {
            Some(DeliveryScript::Reject(err)) => return Err(err),
            Some(DeliveryScript::Withhold) => None,
            Some(DeliveryScript::Fail(err)) => Some(DeliveryReport {
                token: Some(token),
                topic: record.topic.clone(),
                partition: default_partition,
                offset: None,
                error: Some(err),
            }),
            Some(DeliveryScript::WithoutOffset) => Some(DeliveryReport {
                token: Some(token),
                topic: record.topic.clone(),
                partition: default_partition,
                offset: None,
                error: None,
            }),
            Some(DeliveryScript::Untracked) => Some(DeliveryReport {
                token: None,
                topic: record.topic.clone(),
                partition: default_partition,
                offset: None,
                error: None,
            }),
            Some(DeliveryScript::Deliver { partition, offset }) => {
                let partition = partition.unwrap_or(default_partition);
                let offset = offset.or_else(|| Some(self.next_offset(&record.topic, partition)));
                Some(DeliveryReport {
                    token: Some(token),
                    topic: record.topic.clone(),
                    partition,
                    offset,
                    error: None,
                })
            }
            None => Some(DeliveryReport {
                token: Some(token),
                topic: record.topic.clone(),
                partition: default_partition,
                offset: Some(self.next_offset(&record.topic, default_partition)),
                error: None,
            }),
        };

        self.inner.produced.lock().push(record);
        if let Some(report) = report {
            self.inner.reports.lock().push_back(report);
        }
        Ok(())
    }

    fn poll(&self, _timeout: Duration) {
        self.inner.polls.fetch_add(1, Ordering::SeqCst);
        self.dispatch_reports();
    }

    fn new_queue(&self) -> ChannelQueue {
        self.inner.queues.fetch_add(1, Ordering::SeqCst);
        ChannelQueue::new()
    }

    fn submit(
        &self,
        command: AdminCommand,
        options: &RequestOptions,
        queue: &ChannelQueue,
    ) -> Result<(), EngineError> {
        let script = self.inner.engine.admin.lock().pop_front();
        let response = match script {
            Some(AdminScript::Respond(event)) => Some(event),
            Some(AdminScript::Silence) => None,
            Some(AdminScript::Mismatch(kind)) => Some(ResultEvent::new(kind, EventPayload::None)),
            None => Some(Self::default_response(&command)),
        };

        self.inner
            .submitted
            .lock()
            .push((command, options.clone()));

        if let Some(event) = response {
            let _ = queue.sender().send(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NotificationKind, ResultQueue};
    use std::sync::atomic::AtomicUsize;

    fn record(partition: i32) -> OutboundRecord {
        OutboundRecord {
            topic: "orders".to_string(),
            partition,
            key: None,
            payload: b"v".to_vec(),
            timestamp: 0,
            headers: Vec::new(),
        }
    }

    #[test]
    fn test_reports_are_dispatched_on_poll() {
        let engine = MockEngine::new();
        let handle = engine.create(&EngineConfig::new()).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        handle.listen(
            NotificationKind::Delivery,
            Arc::new(move |notification| {
                if let Notification::Delivery(report) = notification {
                    sink.lock().push(report);
                }
            }),
        );

        handle.produce(record(-1), DeliveryToken::next()).unwrap();
        handle.produce(record(-1), DeliveryToken::next()).unwrap();
        assert!(seen.lock().is_empty());
        assert_eq!(handle.queued_reports(), 2);

        handle.poll(Duration::ZERO);
        let reports = seen.lock().clone();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].partition, 0);
        assert_eq!(reports[0].offset, Some(0));
        assert_eq!(reports[1].offset, Some(1));
    }

    #[test]
    fn test_reject_script_fails_produce() {
        let engine = MockEngine::new();
        engine.script_delivery(DeliveryScript::Reject(EngineError::new(
            crate::error::ErrorCode::QUEUE_FULL,
        )));
        let handle = engine.create(&EngineConfig::new()).unwrap();

        assert!(handle.produce(record(0), DeliveryToken::next()).is_err());
        assert!(handle.produced().is_empty());
    }

    #[test]
    fn test_connect_behaviors() {
        let engine = MockEngine::new().with_connect_behavior(ConnectBehavior::Silent);
        let handle = engine.create(&EngineConfig::new()).unwrap();

        let readies = Arc::new(AtomicUsize::new(0));
        let counter = readies.clone();
        handle.listen(
            NotificationKind::Ready,
            Arc::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        handle.connect().unwrap();
        assert_eq!(readies.load(Ordering::SeqCst), 0);
        handle.emit(Notification::Ready);
        assert_eq!(readies.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_default_admin_response_matches_command() {
        let engine = MockEngine::new();
        let handle = engine.create(&EngineConfig::new()).unwrap();
        let queue = handle.new_queue();
        let options = RequestOptions::new(ResultKind::DeleteTopics);

        handle
            .submit(
                AdminCommand::DeleteTopics(vec!["a".to_string()]),
                &options,
                &queue,
            )
            .unwrap();

        let event = queue.poll(Duration::from_millis(10)).unwrap();
        assert_eq!(event.kind, ResultKind::DeleteTopics);
        assert!(event.first_resource_error().is_none());
        assert_eq!(handle.queues_created(), 1);
    }
}
