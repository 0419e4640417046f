//! Admin client
//!
//! Every command follows the same protocol: with the structural lock held,
//! build per-call options, allocate a dedicated result queue, submit the
//! command, then poll the queue with a bounded exponential schedule until
//! the matching result event arrives. Queue and options are released before
//! the call returns.

mod command;
mod event;
mod options;
mod poll;

pub use command::{AdminCommand, NewPartitions, NewTopic};
pub use event::{
    ConsumerGroupState, EventPayload, GroupDescription, GroupListing, GroupMember, GroupResult,
    ListGroupsResult, ResourceOutcome, ResultEvent, ResultKind,
};
pub use options::{AdminCallOptions, RequestOptions, DEFAULT_ADMIN_TIMEOUT_MS};
pub use poll::{
    poll_for_event, PollOutcome, PollSchedule, MAX_BUDGET_MS, SINGLE_ATTEMPT_LIMIT_MS,
};

use crate::connection::{Connection, ConnectionState};
use crate::engine::{Engine, EngineHandle, Notification, NotificationKind};
use crate::error::{BridgeError, EngineError, ErrorCode, Result};
use command::validate_group_ids;
use kafka_bridge_config::{ClientOptions, ClientRole};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Admin client over its own connection, or over a producer's.
pub struct AdminClient<E: Engine> {
    connection: Arc<Connection<E>>,
    /// False when the connection belongs to a producer.
    owns_connection: bool,
}

impl<E: Engine> AdminClient<E> {
    pub fn new(engine: E, options: ClientOptions) -> Self {
        Self {
            connection: Arc::new(Connection::new(engine, options, ClientRole::Admin)),
            owns_connection: true,
        }
    }

    pub(crate) fn dependent(connection: Arc<Connection<E>>) -> Self {
        Self {
            connection,
            owns_connection: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Create the engine handle.
    ///
    /// Succeeds immediately when already connected. Does not wait for the
    /// engine to report readiness.
    pub async fn connect(&self) -> Result<()> {
        self.ensure_owned("connect")?;
        let connection = &self.connection;
        let _guard = connection.lock().await;

        match connection.state() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Init => {}
            state => {
                return Err(BridgeError::state(
                    "admin client cannot connect from this state",
                    state,
                ))
            }
        }

        connection.transition(ConnectionState::Init, ConnectionState::Connecting);

        let handle = match connection.engine_config().await {
            Ok(config) => connection.create_handle(config),
            Err(e) => Err(e),
        };
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "Failed to create admin client");
                connection.advance(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        handle.listen(
            NotificationKind::Error,
            Arc::new(|notification| {
                if let Notification::Error(err) = notification {
                    error!(error = %err, "Admin client engine error");
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

        connection.transition(ConnectionState::Connecting, ConnectionState::Connected);
        info!(
            brokers = %connection.options().bootstrap_servers.join(","),
            "Admin client connected"
        );
        Ok(())
    }

    /// Destroy the engine handle. A no-op once disconnection has begun.
    pub async fn disconnect(&self) -> Result<()> {
        self.ensure_owned("disconnect")?;
        let connection = &self.connection;

        let previous = connection.advance(ConnectionState::Disconnecting);
        if previous >= ConnectionState::Disconnecting {
            return Ok(());
        }

        let _guard = connection.lock().await;
        let outcome = match connection.take_handle() {
            Some(handle) => {
                let timeout = connection.options().bridge.disconnect_timeout();
                tokio::task::spawn_blocking(move || handle.disconnect(timeout))
                    .await
                    .unwrap_or_else(|e| {
                        Err(EngineError::with_message(ErrorCode::FAIL, e.to_string()))
                    })
            }
            None => Ok(()),
        };
        connection.advance(ConnectionState::Disconnected);
        info!("Admin client disconnected");

        outcome.map_err(|e| BridgeError::engine("disconnect", e))
    }

    pub async fn create_topic(&self, topic: NewTopic, options: AdminCallOptions) -> Result<()> {
        self.create_topics(vec![topic], options).await
    }

    /// Create several topics; the first topic that failed fails the call.
    pub async fn create_topics(&self, topics: Vec<NewTopic>, options: AdminCallOptions) -> Result<()> {
        self.connection.ensure_connected("create topics")?;
        if topics.is_empty() {
            return Err(BridgeError::validation(
                "at least one topic is required",
                Some("topic"),
            ));
        }
        for topic in &topics {
            topic.validate()?;
        }
        self.execute(AdminCommand::CreateTopics(topics), options)
            .await
            .map(|_| ())
    }

    pub async fn delete_topic(&self, topic: &str, options: AdminCallOptions) -> Result<()> {
        self.delete_topics(vec![topic.to_string()], options).await
    }

    pub async fn delete_topics(&self, topics: Vec<String>, options: AdminCallOptions) -> Result<()> {
        self.connection.ensure_connected("delete topics")?;
        if topics.is_empty() || topics.iter().any(String::is_empty) {
            return Err(BridgeError::validation(
                "topic names must not be empty",
                Some("topic"),
            ));
        }
        self.execute(AdminCommand::DeleteTopics(topics), options)
            .await
            .map(|_| ())
    }

    /// Grow `topic` to `total_count` partitions.
    pub async fn create_partitions(
        &self,
        topic: &str,
        total_count: i32,
        options: AdminCallOptions,
    ) -> Result<()> {
        self.connection.ensure_connected("create partitions")?;
        let partitions = NewPartitions::new(topic, total_count);
        partitions.validate()?;
        self.execute(AdminCommand::CreatePartitions(vec![partitions]), options)
            .await
            .map(|_| ())
    }

    pub async fn list_groups(&self, options: AdminCallOptions) -> Result<ListGroupsResult> {
        self.connection.ensure_connected("list groups")?;
        self.execute(AdminCommand::ListGroups, options)
            .await?
            .into_list_groups()
    }

    /// Describe groups; a group that could not be described carries its
    /// own error instead of failing the call.
    pub async fn describe_groups(
        &self,
        groups: Vec<String>,
        options: AdminCallOptions,
    ) -> Result<Vec<GroupDescription>> {
        self.connection.ensure_connected("describe groups")?;
        validate_group_ids(&groups)?;
        self.execute(AdminCommand::DescribeGroups(groups), options)
            .await?
            .into_group_descriptions()
    }

    pub async fn delete_groups(
        &self,
        groups: Vec<String>,
        options: AdminCallOptions,
    ) -> Result<Vec<GroupResult>> {
        self.connection.ensure_connected("delete groups")?;
        validate_group_ids(&groups)?;
        self.execute(AdminCommand::DeleteGroups(groups), options)
            .await?
            .into_group_results()
    }

    fn ensure_owned(&self, operation: &str) -> Result<()> {
        if !self.owns_connection {
            return Err(BridgeError::state(
                format!("cannot {} an admin client owned by a producer", operation),
                self.connection.state(),
            ));
        }
        Ok(())
    }

    /// Run one command under the structural lock on the blocking pool.
    async fn execute(&self, command: AdminCommand, options: AdminCallOptions) -> Result<ResultEvent> {
        let operation = command.name();
        let guard = self.connection.lock().await;
        self.connection.ensure_connected(operation)?;

        let handle = self
            .connection
            .handle()
            .ok_or_else(|| BridgeError::state("no engine handle", self.connection.state()))?;

        debug!(operation, timeout_ms = options.timeout, "Submitting admin command");

        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            run_command(handle.as_ref(), command, &options)
        })
        .await?
    }
}

impl<E: Engine> Clone for AdminClient<E> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            owns_connection: self.owns_connection,
        }
    }
}

fn run_command<H: EngineHandle>(
    handle: &H,
    command: AdminCommand,
    options: &AdminCallOptions,
) -> Result<ResultEvent> {
    let operation = command.name();
    let kind = command.result_kind();

    let request = options
        .to_request(kind)
        .map_err(|e| BridgeError::engine(operation, e))?;
    let queue = handle.new_queue();

    handle
        .submit(command, &request, &queue)
        .map_err(|e| BridgeError::engine(operation, e))?;

    let outcome = poll_for_event(&queue, kind, options.timeout);
    drop(queue);
    drop(request);

    let mut event = match outcome {
        PollOutcome::Matched(event) => event,
        PollOutcome::TimedOut { last_seen } => {
            error!(operation, timeout_ms = options.timeout, ?last_seen, "Admin command timed out");
            return Err(BridgeError::timeout(operation, options.timeout, last_seen));
        }
    };

    if let Some(err) = event.error.take() {
        return Err(BridgeError::engine(operation, err));
    }

    if let Some(failed) = event.first_resource_error() {
        let err = failed
            .error
            .clone()
            .unwrap_or_else(|| EngineError::new(ErrorCode::FAIL));
        debug!(operation, resource = %failed.name, error = %err, "Resource failed");
        return Err(BridgeError::engine(operation, err));
    }

    Ok(event)
}
