//! Per-call admin options and their engine-side form

use super::event::{ConsumerGroupState, ResultKind};
use crate::error::{EngineError, ErrorCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default budget for an admin call in milliseconds.
pub const DEFAULT_ADMIN_TIMEOUT_MS: u64 = 5_000;

/// Caller-facing options of an admin call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminCallOptions {
    /// Request timeout and polling budget in milliseconds.
    pub timeout: u64,

    /// Only list groups in these states.
    pub match_consumer_group_states: Option<Vec<ConsumerGroupState>>,

    /// Ask for the operations the caller may perform on described groups.
    pub include_authorized_operations: bool,
}

impl Default for AdminCallOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_ADMIN_TIMEOUT_MS,
            match_consumer_group_states: None,
            include_authorized_operations: false,
        }
    }
}

impl AdminCallOptions {
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = timeout_ms;
        self
    }

    pub fn with_states(mut self, states: Vec<ConsumerGroupState>) -> Self {
        self.match_consumer_group_states = Some(states);
        self
    }

    pub fn with_authorized_operations(mut self, include: bool) -> Self {
        self.include_authorized_operations = include;
        self
    }

    /// Build the per-call engine options for a command of `kind`.
    ///
    /// The state filter is only applied when present and authorized
    /// operations only when requested. The first rejected option aborts.
    pub fn to_request(&self, kind: ResultKind) -> Result<RequestOptions, EngineError> {
        let mut request = RequestOptions::new(kind);
        request.set_request_timeout(self.timeout)?;

        if let Some(ref states) = self.match_consumer_group_states {
            request.set_match_consumer_group_states(states)?;
        }

        if self.include_authorized_operations {
            request.set_include_authorized_operations(true)?;
        }

        Ok(request)
    }
}

/// Engine-side options bound to a single admin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    kind: ResultKind,
    request_timeout: Option<Duration>,
    match_states: Option<Vec<ConsumerGroupState>>,
    include_authorized_operations: bool,
}

impl RequestOptions {
    pub fn new(kind: ResultKind) -> Self {
        Self {
            kind,
            request_timeout: None,
            match_states: None,
            include_authorized_operations: false,
        }
    }

    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn match_states(&self) -> Option<&[ConsumerGroupState]> {
        self.match_states.as_deref()
    }

    pub fn include_authorized_operations(&self) -> bool {
        self.include_authorized_operations
    }

    pub fn set_request_timeout(&mut self, timeout_ms: u64) -> Result<(), EngineError> {
        if timeout_ms > i32::MAX as u64 {
            return Err(EngineError::with_message(
                ErrorCode::INVALID_ARG,
                format!(
                    "expected request timeout <= {}, got {}",
                    i32::MAX,
                    timeout_ms
                ),
            ));
        }
        self.request_timeout = Some(Duration::from_millis(timeout_ms));
        Ok(())
    }

    pub fn set_match_consumer_group_states(
        &mut self,
        states: &[ConsumerGroupState],
    ) -> Result<(), EngineError> {
        if self.kind != ResultKind::ListConsumerGroups {
            return Err(unsupported("match_consumer_group_states", self.kind));
        }
        if states.is_empty() {
            return Err(EngineError::with_message(
                ErrorCode::INVALID_ARG,
                "match_consumer_group_states must not be empty",
            ));
        }
        for (i, state) in states.iter().enumerate() {
            if states[..i].contains(state) {
                return Err(EngineError::with_message(
                    ErrorCode::INVALID_ARG,
                    format!("duplicate consumer group state {}", state),
                ));
            }
        }
        self.match_states = Some(states.to_vec());
        Ok(())
    }

    pub fn set_include_authorized_operations(&mut self, include: bool) -> Result<(), EngineError> {
        if self.kind != ResultKind::DescribeConsumerGroups {
            return Err(unsupported("include_authorized_operations", self.kind));
        }
        self.include_authorized_operations = include;
        Ok(())
    }
}

fn unsupported(option: &str, kind: ResultKind) -> EngineError {
    EngineError::with_message(
        ErrorCode::INVALID_ARG,
        format!("{} is not supported by {}", option, kind),
    )
}
