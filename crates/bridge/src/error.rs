//! Error types for the bridge
//!
//! Every failure path of the producer and admin client ends up as a
//! [`BridgeError`]. Engine-reported failures keep the numeric engine code
//! ([`ErrorCode`]) so callers can match on it.

use crate::admin::ResultKind;
use crate::connection::ConnectionState;
use kafka_bridge_config::ConfigError;
use rdkafka::types::RDKafkaErrorCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Numeric engine error code, using librdkafka's `rd_kafka_resp_err_t` values.
///
/// Negative codes are client-local, positive codes come from the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const NO_ERROR: ErrorCode = ErrorCode(0);
    pub const FAIL: ErrorCode = ErrorCode(-196);
    pub const MESSAGE_TIMED_OUT: ErrorCode = ErrorCode(-192);
    pub const UNKNOWN_PARTITION: ErrorCode = ErrorCode(-190);
    pub const UNKNOWN_TOPIC: ErrorCode = ErrorCode(-188);
    pub const ALL_BROKERS_DOWN: ErrorCode = ErrorCode(-187);
    pub const INVALID_ARG: ErrorCode = ErrorCode(-186);
    pub const TIMED_OUT: ErrorCode = ErrorCode(-185);
    pub const QUEUE_FULL: ErrorCode = ErrorCode(-184);
    pub const STATE: ErrorCode = ErrorCode(-172);
    pub const UNKNOWN_TOPIC_OR_PART: ErrorCode = ErrorCode(3);
    pub const NOT_LEADER_FOR_PARTITION: ErrorCode = ErrorCode(6);
    pub const REQUEST_TIMED_OUT: ErrorCode = ErrorCode(7);
    pub const MSG_SIZE_TOO_LARGE: ErrorCode = ErrorCode(10);
    pub const NETWORK_EXCEPTION: ErrorCode = ErrorCode(13);
    pub const TOPIC_EXCEPTION: ErrorCode = ErrorCode(17);
    pub const TOPIC_AUTHORIZATION_FAILED: ErrorCode = ErrorCode(29);
    pub const GROUP_AUTHORIZATION_FAILED: ErrorCode = ErrorCode(30);
    pub const TOPIC_ALREADY_EXISTS: ErrorCode = ErrorCode(36);
    pub const INVALID_PARTITIONS: ErrorCode = ErrorCode(37);
    pub const INVALID_REPLICATION_FACTOR: ErrorCode = ErrorCode(38);
    pub const POLICY_VIOLATION: ErrorCode = ErrorCode(44);
    pub const NON_EMPTY_GROUP: ErrorCode = ErrorCode(68);
    pub const GROUP_ID_NOT_FOUND: ErrorCode = ErrorCode(69);

    /// Whether this code signals a failure.
    pub fn is_error(&self) -> bool {
        self.0 != 0
    }

    /// Symbolic name of the code, `UNKNOWN` for codes without a constant.
    pub fn name(&self) -> &'static str {
        match *self {
            ErrorCode::NO_ERROR => "NO_ERROR",
            ErrorCode::FAIL => "_FAIL",
            ErrorCode::MESSAGE_TIMED_OUT => "_MSG_TIMED_OUT",
            ErrorCode::UNKNOWN_PARTITION => "_UNKNOWN_PARTITION",
            ErrorCode::UNKNOWN_TOPIC => "_UNKNOWN_TOPIC",
            ErrorCode::ALL_BROKERS_DOWN => "_ALL_BROKERS_DOWN",
            ErrorCode::INVALID_ARG => "_INVALID_ARG",
            ErrorCode::TIMED_OUT => "_TIMED_OUT",
            ErrorCode::QUEUE_FULL => "_QUEUE_FULL",
            ErrorCode::STATE => "_STATE",
            ErrorCode::UNKNOWN_TOPIC_OR_PART => "UNKNOWN_TOPIC_OR_PART",
            ErrorCode::NOT_LEADER_FOR_PARTITION => "NOT_LEADER_FOR_PARTITION",
            ErrorCode::REQUEST_TIMED_OUT => "REQUEST_TIMED_OUT",
            ErrorCode::MSG_SIZE_TOO_LARGE => "MSG_SIZE_TOO_LARGE",
            ErrorCode::NETWORK_EXCEPTION => "NETWORK_EXCEPTION",
            ErrorCode::TOPIC_EXCEPTION => "TOPIC_EXCEPTION",
            ErrorCode::TOPIC_AUTHORIZATION_FAILED => "TOPIC_AUTHORIZATION_FAILED",
            ErrorCode::GROUP_AUTHORIZATION_FAILED => "GROUP_AUTHORIZATION_FAILED",
            ErrorCode::TOPIC_ALREADY_EXISTS => "TOPIC_ALREADY_EXISTS",
            ErrorCode::INVALID_PARTITIONS => "INVALID_PARTITIONS",
            ErrorCode::INVALID_REPLICATION_FACTOR => "INVALID_REPLICATION_FACTOR",
            ErrorCode::POLICY_VIOLATION => "POLICY_VIOLATION",
            ErrorCode::NON_EMPTY_GROUP => "NON_EMPTY_GROUP",
            ErrorCode::GROUP_ID_NOT_FOUND => "GROUP_ID_NOT_FOUND",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

impl From<RDKafkaErrorCode> for ErrorCode {
    fn from(code: RDKafkaErrorCode) -> Self {
        match code {
            RDKafkaErrorCode::NoError => ErrorCode::NO_ERROR,
            RDKafkaErrorCode::Fail => ErrorCode::FAIL,
            RDKafkaErrorCode::MessageTimedOut => ErrorCode::MESSAGE_TIMED_OUT,
            RDKafkaErrorCode::UnknownPartition => ErrorCode::UNKNOWN_PARTITION,
            RDKafkaErrorCode::UnknownTopic => ErrorCode::UNKNOWN_TOPIC,
            RDKafkaErrorCode::AllBrokersDown => ErrorCode::ALL_BROKERS_DOWN,
            RDKafkaErrorCode::InvalidArgument => ErrorCode::INVALID_ARG,
            RDKafkaErrorCode::OperationTimedOut => ErrorCode::TIMED_OUT,
            RDKafkaErrorCode::QueueFull => ErrorCode::QUEUE_FULL,
            RDKafkaErrorCode::State => ErrorCode::STATE,
            RDKafkaErrorCode::UnknownTopicOrPartition => ErrorCode::UNKNOWN_TOPIC_OR_PART,
            RDKafkaErrorCode::NotLeaderForPartition => ErrorCode::NOT_LEADER_FOR_PARTITION,
            RDKafkaErrorCode::RequestTimedOut => ErrorCode::REQUEST_TIMED_OUT,
            RDKafkaErrorCode::MessageSizeTooLarge => ErrorCode::MSG_SIZE_TOO_LARGE,
            RDKafkaErrorCode::NetworkException => ErrorCode::NETWORK_EXCEPTION,
            RDKafkaErrorCode::InvalidTopic => ErrorCode::TOPIC_EXCEPTION,
            RDKafkaErrorCode::TopicAuthorizationFailed => ErrorCode::TOPIC_AUTHORIZATION_FAILED,
            RDKafkaErrorCode::GroupAuthorizationFailed => ErrorCode::GROUP_AUTHORIZATION_FAILED,
            RDKafkaErrorCode::TopicAlreadyExists => ErrorCode::TOPIC_ALREADY_EXISTS,
            RDKafkaErrorCode::InvalidPartitions => ErrorCode::INVALID_PARTITIONS,
            RDKafkaErrorCode::InvalidReplicationFactor => ErrorCode::INVALID_REPLICATION_FACTOR,
            RDKafkaErrorCode::PolicyViolation => ErrorCode::POLICY_VIOLATION,
            RDKafkaErrorCode::NonEmptyGroup => ErrorCode::NON_EMPTY_GROUP,
            RDKafkaErrorCode::GroupIdNotFound => ErrorCode::GROUP_ID_NOT_FOUND,
            _ => ErrorCode::FAIL,
        }
    }
}

/// Error reported by the engine: a code plus an optional human readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: Option<String>,
}

impl EngineError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: None,
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message {
            Some(ref message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<rdkafka::error::KafkaError> for EngineError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        let code = err
            .rdkafka_error_code()
            .map(ErrorCode::from)
            .unwrap_or(ErrorCode::FAIL);
        EngineError::with_message(code, err.to_string())
    }
}

/// Main bridge error type.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Operation invoked in the wrong lifecycle state.
    #[error("invalid client state {state}: {message}")]
    State {
        message: String,
        state: ConnectionState,
    },

    /// Malformed request.
    #[error("invalid request: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Engine-reported failure of an operation.
    #[error("{operation} failed: {source}")]
    Engine {
        operation: String,
        #[source]
        source: EngineError,
    },

    /// No matching result event arrived within the budget.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: String,
        timeout_ms: u64,
        /// Kind of the last non-matching event, if one arrived instead of silence.
        last_event: Option<ResultKind>,
    },

    /// The engine reported a failed delivery for a message.
    #[error("failed to send message to {topic} [{partition}]: {source}")]
    SendFailed {
        topic: String,
        partition: i32,
        #[source]
        source: EngineError,
    },

    /// The client disconnected before the engine reported the delivery.
    #[error("message to {topic} [{partition}] was not delivered before disconnect")]
    Undelivered { topic: String, partition: i32 },

    /// Configuration could not be built.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal failure such as a panicked blocking task.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn state(message: impl Into<String>, state: ConnectionState) -> Self {
        Self::State {
            message: message.into(),
            state,
        }
    }

    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn engine(operation: impl Into<String>, source: EngineError) -> Self {
        Self::Engine {
            operation: operation.into(),
            source,
        }
    }

    pub fn timeout(
        operation: impl Into<String>,
        timeout_ms: u64,
        last_event: Option<ResultKind>,
    ) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
            last_event,
        }
    }

    pub fn send_failed(topic: impl Into<String>, partition: i32, source: EngineError) -> Self {
        Self::SendFailed {
            topic: topic.into(),
            partition,
            source,
        }
    }

    /// Engine error code equivalent of this error, if there is one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            BridgeError::State { .. } => Some(ErrorCode::STATE),
            BridgeError::Validation { .. } => Some(ErrorCode::INVALID_ARG),
            BridgeError::Timeout { .. } => Some(ErrorCode::TIMED_OUT),
            BridgeError::Engine { source, .. } | BridgeError::SendFailed { source, .. } => {
                Some(source.code)
            }
            _ => None,
        }
    }

    /// Check if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Timeout { .. } | BridgeError::Undelivered { .. } => true,
            BridgeError::Engine { source, .. } | BridgeError::SendFailed { source, .. } => {
                matches!(
                    source.code,
                    ErrorCode::TIMED_OUT
                        | ErrorCode::MESSAGE_TIMED_OUT
                        | ErrorCode::QUEUE_FULL
                        | ErrorCode::REQUEST_TIMED_OUT
                        | ErrorCode::NETWORK_EXCEPTION
                        | ErrorCode::NOT_LEADER_FOR_PARTITION
                        | ErrorCode::ALL_BROKERS_DOWN
                )
            }
            _ => false,
        }
    }

    /// Get error severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            BridgeError::Configuration(_) | BridgeError::Internal(_) => ErrorSeverity::Critical,
            BridgeError::Engine { .. } | BridgeError::SendFailed { .. } | BridgeError::Io(_) => {
                ErrorSeverity::Error
            }
            BridgeError::Timeout { .. } | BridgeError::Undelivered { .. } => {
                ErrorSeverity::Warning
            }
            BridgeError::State { .. } | BridgeError::Validation { .. } => ErrorSeverity::Info,
        }
    }
}

impl From<tokio::task::JoinError> for BridgeError {
    fn from(err: tokio::task::JoinError) -> Self {
        BridgeError::Internal(err.to_string())
    }
}

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
