//! librdkafka binding
//!
//! Delivery reports, engine errors and log lines arrive through
//! [`BridgeContext`] and are forwarded to the handle's listeners. Topic
//! commands and group deletion go through rdkafka's `AdminClient`, group
//! listing and description through the broker group list API. Results are
//! posted to the command's result queue from the tokio runtime.

use super::{
    ChannelQueue, DeliveryReport, DeliveryToken, Engine, EngineHandle, Listeners, LogLevel,
    LogRecord, Notification, OutboundRecord,
};
use crate::admin::{
    AdminClient, AdminCommand, ConsumerGroupState, EventPayload, GroupDescription, GroupListing,
    GroupMember, GroupResult, ListGroupsResult, NewTopic, RequestOptions, ResourceOutcome,
    ResultEvent, DEFAULT_ADMIN_TIMEOUT_MS,
};
use crate::error::{EngineError, ErrorCode};
use crate::producer::Producer;
use kafka_bridge_config::{ClientOptions, EngineConfig};
use parking_lot::Mutex;
use rdkafka::admin::{
    AdminClient as NativeAdminClient, AdminOptions, NewPartitions as NativeNewPartitions,
    NewTopic as NativeNewTopic, TopicReplication,
};
use rdkafka::client::ClientContext;
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::error::KafkaError;
use rdkafka::groups::GroupInfo;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{BaseProducer, BaseRecord, DeliveryResult, Producer as _, ProducerContext};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::Message as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Default deadline for the connect metadata probe.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client context forwarding librdkafka callbacks to listeners.
pub struct BridgeContext {
    listeners: Arc<Listeners>,
}

impl BridgeContext {
    pub fn new(listeners: Arc<Listeners>) -> Self {
        Self { listeners }
    }
}

impl ClientContext for BridgeContext {
    fn log(&self, level: RDKafkaLogLevel, fac: &str, log_message: &str) {
        self.listeners.dispatch(Notification::Log(LogRecord {
            level: level.into(),
            facility: fac.to_string(),
            message: log_message.to_string(),
        }));
    }

    fn error(&self, error: KafkaError, reason: &str) {
        let code = error
            .rdkafka_error_code()
            .map(ErrorCode::from)
            .unwrap_or(ErrorCode::FAIL);
        self.listeners
            .dispatch(Notification::Error(EngineError::with_message(code, reason)));
    }
}

impl ProducerContext for BridgeContext {
    type DeliveryOpaque = Box<DeliveryToken>;

    fn delivery(&self, result: &DeliveryResult<'_>, token: Self::DeliveryOpaque) {
        let report = match result {
            Ok(message) => DeliveryReport {
                token: Some(*token),
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: Some(message.offset()),
                error: None,
            },
            Err((err, message)) => DeliveryReport {
                token: Some(*token),
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: None,
                error: Some(EngineError::from(err.clone())),
            },
        };
        self.listeners.dispatch(Notification::Delivery(report));
    }
}

impl From<RDKafkaLogLevel> for LogLevel {
    fn from(level: RDKafkaLogLevel) -> Self {
        match level {
            RDKafkaLogLevel::Emerg
            | RDKafkaLogLevel::Alert
            | RDKafkaLogLevel::Critical
            | RDKafkaLogLevel::Error => LogLevel::Error,
            RDKafkaLogLevel::Warning => LogLevel::Warning,
            RDKafkaLogLevel::Notice | RDKafkaLogLevel::Info => LogLevel::Info,
            RDKafkaLogLevel::Debug => LogLevel::Debug,
        }
    }
}

/// Engine backed by librdkafka.
#[derive(Debug, Clone)]
pub struct RdKafkaEngine {
    connect_timeout: Duration,
}

impl RdKafkaEngine {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn from_options(options: &ClientOptions) -> Self {
        Self {
            connect_timeout: options.bridge.connect_timeout(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for RdKafkaEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn client_config(config: &EngineConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    for (key, value) in config.iter() {
        client_config.set(key, value);
    }
    client_config
}

impl Engine for RdKafkaEngine {
    type Handle = RdKafkaHandle;

    fn create(&self, config: &EngineConfig) -> Result<RdKafkaHandle, EngineError> {
        let runtime = Handle::try_current()
            .map_err(|e| EngineError::with_message(ErrorCode::FAIL, e.to_string()))?;

        let client_config = client_config(config);
        let listeners = Arc::new(Listeners::new());
        let producer: BaseProducer<BridgeContext> =
            client_config.create_with_context(BridgeContext::new(listeners.clone()))?;

        debug!(properties = config.len(), "Created native client");

        Ok(RdKafkaHandle {
            client_config,
            listeners,
            producer: Arc::new(producer),
            admin: Mutex::new(None),
            runtime,
            connect_timeout: self.connect_timeout,
        })
    }
}

/// Native client handle.
pub struct RdKafkaHandle {
    client_config: ClientConfig,
    listeners: Arc<Listeners>,
    producer: Arc<BaseProducer<BridgeContext>>,
    /// Created on the first command that needs it.
    admin: Mutex<Option<Arc<NativeAdminClient<BridgeContext>>>>,
    runtime: Handle,
    connect_timeout: Duration,
}

impl RdKafkaHandle {
    fn admin_client(&self) -> Result<Arc<NativeAdminClient<BridgeContext>>, EngineError> {
        let mut slot = self.admin.lock();
        if let Some(ref admin) = *slot {
            return Ok(admin.clone());
        }

        let admin: NativeAdminClient<BridgeContext> = self
            .client_config
            .create_with_context(BridgeContext::new(self.listeners.clone()))?;
        let admin = Arc::new(admin);
        *slot = Some(admin.clone());
        Ok(admin)
    }
}

impl EngineHandle for RdKafkaHandle {
    type Queue = ChannelQueue;

    fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Probe the cluster for metadata on the blocking pool; success
    /// signals readiness.
    fn connect(&self) -> Result<(), EngineError> {
        let producer = self.producer.clone();
        let listeners = self.listeners.clone();
        let timeout = self.connect_timeout;

        self.runtime.spawn_blocking(move || {
            match producer.client().fetch_metadata(None, timeout) {
                Ok(metadata) => {
                    info!(brokers = metadata.brokers().len(), "Cluster metadata received");
                    listeners.dispatch(Notification::Ready);
                }
                Err(e) => listeners.dispatch(Notification::Error(EngineError::from(e))),
            }
        });
        Ok(())
    }

    /// Flush outstanding messages, serving their delivery reports.
    fn disconnect(&self, timeout: Duration) -> Result<(), EngineError> {
        self.producer.flush(timeout)?;
        Ok(())
    }

    fn produce(&self, record: OutboundRecord, token: DeliveryToken) -> Result<(), EngineError> {
        let mut base: BaseRecord<'_, Vec<u8>, Vec<u8>, Box<DeliveryToken>> =
            BaseRecord::with_opaque_to(&record.topic, Box::new(token))
                .payload(&record.payload)
                .timestamp(record.timestamp);

        if let Some(ref key) = record.key {
            base = base.key(key);
        }
        if record.partition >= 0 {
            base = base.partition(record.partition);
        }
        if !record.headers.is_empty() {
            let headers = record
                .headers
                .iter()
                .fold(OwnedHeaders::new(), |headers, (key, value)| {
                    headers.insert(Header {
                        key: key.as_str(),
                        value: Some(value),
                    })
                });
            base = base.headers(headers);
        }

        self.producer
            .send(base)
            .map_err(|(err, _)| EngineError::from(err))
    }

    fn poll(&self, timeout: Duration) {
        self.producer.poll(timeout);
    }

    fn new_queue(&self) -> ChannelQueue {
        ChannelQueue::new()
    }

    fn submit(
        &self,
        command: AdminCommand,
        options: &RequestOptions,
        queue: &ChannelQueue,
    ) -> Result<(), EngineError> {
        let kind = command.result_kind();
        let sender = queue.sender();
        let admin_options = AdminOptions::new().request_timeout(options.request_timeout());
        let request_timeout = options
            .request_timeout()
            .unwrap_or(Duration::from_millis(DEFAULT_ADMIN_TIMEOUT_MS));

        match command {
            AdminCommand::CreateTopics(topics) => {
                let admin = self.admin_client()?;
                self.runtime.spawn(async move {
                    let specs: Vec<NativeNewTopic<'_>> = topics.iter().map(native_topic).collect();
                    let event = match admin.create_topics(&specs, &admin_options).await {
                        Ok(results) => ResultEvent::resources(
                            kind,
                            results.into_iter().map(resource_outcome).collect(),
                        ),
                        Err(e) => ResultEvent::failed(kind, e.into()),
                    };
                    let _ = sender.send(event);
                });
            }
            AdminCommand::DeleteTopics(topics) => {
                let admin = self.admin_client()?;
                self.runtime.spawn(async move {
                    let names: Vec<&str> = topics.iter().map(String::as_str).collect();
                    let event = match admin.delete_topics(&names, &admin_options).await {
                        Ok(results) => ResultEvent::resources(
                            kind,
                            results.into_iter().map(resource_outcome).collect(),
                        ),
                        Err(e) => ResultEvent::failed(kind, e.into()),
                    };
                    let _ = sender.send(event);
                });
            }
            AdminCommand::CreatePartitions(partitions) => {
                let admin = self.admin_client()?;
                self.runtime.spawn(async move {
                    let specs: Vec<NativeNewPartitions<'_>> = partitions
                        .iter()
                        .map(|p| NativeNewPartitions::new(&p.topic, p.total_count.max(1) as usize))
                        .collect();
                    let event = match admin.create_partitions(&specs, &admin_options).await {
                        Ok(results) => ResultEvent::resources(
                            kind,
                            results.into_iter().map(resource_outcome).collect(),
                        ),
                        Err(e) => ResultEvent::failed(kind, e.into()),
                    };
                    let _ = sender.send(event);
                });
            }
            AdminCommand::DeleteGroups(groups) => {
                let admin = self.admin_client()?;
                self.runtime.spawn(async move {
                    let names: Vec<&str> = groups.iter().map(String::as_str).collect();
                    let event = match admin.delete_groups(&names, &admin_options).await {
                        Ok(results) => ResultEvent::new(
                            kind,
                            EventPayload::DeleteGroups(
                                results
                                    .into_iter()
                                    .map(|result| match result {
                                        Ok(group_id) => GroupResult {
                                            group_id,
                                            error: None,
                                        },
                                        Err((group_id, code)) => GroupResult {
                                            group_id,
                                            error: Some(native_error(code)),
                                        },
                                    })
                                    .collect(),
                            ),
                        ),
                        Err(e) => ResultEvent::failed(kind, e.into()),
                    };
                    let _ = sender.send(event);
                });
            }
            AdminCommand::ListGroups => {
                let producer = self.producer.clone();
                let states = options.match_states().map(<[ConsumerGroupState]>::to_vec);
                self.runtime.spawn_blocking(move || {
                    let event = match producer.client().fetch_group_list(None, request_timeout) {
                        Ok(list) => {
                            let groups = list
                                .groups()
                                .iter()
                                .map(group_listing)
                                .filter(|group| {
                                    states
                                        .as_ref()
                                        .map_or(true, |states| states.contains(&group.state))
                                })
                                .collect();
                            ResultEvent::new(
                                kind,
                                EventPayload::ListGroups(ListGroupsResult {
                                    groups,
                                    errors: Vec::new(),
                                }),
                            )
                        }
                        Err(e) => ResultEvent::failed(kind, e.into()),
                    };
                    let _ = sender.send(event);
                });
            }
            AdminCommand::DescribeGroups(groups) => {
                if options.include_authorized_operations() {
                    debug!("Authorized operations are not reported by group listings");
                }
                let producer = self.producer.clone();
                self.runtime.spawn_blocking(move || {
                    let descriptions = groups
                        .iter()
                        .map(|group_id| {
                            match producer
                                .client()
                                .fetch_group_list(Some(group_id.as_str()), request_timeout)
                            {
                                Ok(list) => list
                                    .groups()
                                    .iter()
                                    .find(|info| info.name() == group_id.as_str())
                                    .filter(|info| {
                                        info.state() != "Dead" || !info.members().is_empty()
                                    })
                                    .map(group_description)
                                    .unwrap_or_else(|| GroupDescription::not_found(group_id)),
                                Err(e) => GroupDescription {
                                    error: Some(e.into()),
                                    ..GroupDescription::not_found(group_id)
                                },
                            }
                        })
                        .collect();
                    let _ = sender.send(ResultEvent::new(
                        kind,
                        EventPayload::DescribeGroups(descriptions),
                    ));
                });
            }
        }

        Ok(())
    }
}

fn native_error(code: RDKafkaErrorCode) -> EngineError {
    EngineError::with_message(ErrorCode::from(code), code.to_string())
}

fn resource_outcome(result: Result<String, (String, RDKafkaErrorCode)>) -> ResourceOutcome {
    match result {
        Ok(name) => ResourceOutcome::ok(name),
        Err((name, code)) => ResourceOutcome::failed(name, native_error(code)),
    }
}

fn native_topic(topic: &NewTopic) -> NativeNewTopic<'_> {
    topic.config.iter().fold(
        NativeNewTopic::new(
            &topic.name,
            topic.num_partitions,
            TopicReplication::Fixed(topic.replication_factor),
        ),
        |native, (key, value)| native.set(key, value),
    )
}

fn group_listing(info: &GroupInfo) -> GroupListing {
    GroupListing {
        group_id: info.name().to_string(),
        is_simple_consumer_group: info.protocol_type().is_empty(),
        state: info.state().parse().unwrap_or(ConsumerGroupState::Unknown),
    }
}

fn group_description(info: &GroupInfo) -> GroupDescription {
    GroupDescription {
        group_id: info.name().to_string(),
        error: None,
        is_simple_consumer_group: info.protocol_type().is_empty(),
        protocol_type: info.protocol_type().to_string(),
        partition_assignor: info.protocol().to_string(),
        state: info.state().parse().unwrap_or(ConsumerGroupState::Unknown),
        members: info
            .members()
            .iter()
            .map(|member| GroupMember {
                member_id: member.id().to_string(),
                client_id: member.client_id().to_string(),
                host: member.client_host().to_string(),
            })
            .collect(),
        authorized_operations: None,
    }
}

impl Producer<RdKafkaEngine> {
    /// Producer over librdkafka configured from `options`.
    pub fn from_options(options: ClientOptions) -> Self {
        Producer::new(RdKafkaEngine::from_options(&options), options)
    }
}

impl AdminClient<RdKafkaEngine> {
    /// Admin client over librdkafka configured from `options`.
    pub fn from_options(options: ClientOptions) -> Self {
        AdminClient::new(RdKafkaEngine::from_options(&options), options)
    }
}
