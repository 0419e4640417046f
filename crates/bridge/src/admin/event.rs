//! Result events posted by the engine on an admin result queue, and the
//! typed results decoded from them

use crate::error::{BridgeError, EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind tag of a result event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultKind {
    CreateTopics,
    DeleteTopics,
    CreatePartitions,
    ListConsumerGroups,
    DescribeConsumerGroups,
    DeleteGroups,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultKind::CreateTopics => "CreateTopics",
            ResultKind::DeleteTopics => "DeleteTopics",
            ResultKind::CreatePartitions => "CreatePartitions",
            ResultKind::ListConsumerGroups => "ListConsumerGroups",
            ResultKind::DescribeConsumerGroups => "DescribeConsumerGroups",
            ResultKind::DeleteGroups => "DeleteGroups",
        };
        f.write_str(name)
    }
}

/// Per-resource outcome inside a topic or partition result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOutcome {
    pub name: String,
    pub error: Option<EngineError>,
}

impl ResourceOutcome {
    pub fn ok(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, error: EngineError) -> Self {
        Self {
            name: name.into(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    None,
    Resources(Vec<ResourceOutcome>),
    ListGroups(ListGroupsResult),
    DescribeGroups(Vec<GroupDescription>),
    DeleteGroups(Vec<GroupResult>),
}

/// Kind-tagged event produced by the engine for one admin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEvent {
    pub kind: ResultKind,
    /// Event-level error, set when the whole request failed.
    pub error: Option<EngineError>,
    pub payload: EventPayload,
}

impl ResultEvent {
    pub fn new(kind: ResultKind, payload: EventPayload) -> Self {
        Self {
            kind,
            error: None,
            payload,
        }
    }

    pub fn failed(kind: ResultKind, error: EngineError) -> Self {
        Self {
            kind,
            error: Some(error),
            payload: EventPayload::None,
        }
    }

    pub fn resources(kind: ResultKind, outcomes: Vec<ResourceOutcome>) -> Self {
        Self::new(kind, EventPayload::Resources(outcomes))
    }

    /// First per-resource error, in result order.
    pub fn first_resource_error(&self) -> Option<&ResourceOutcome> {
        match self.payload {
            EventPayload::Resources(ref outcomes) => {
                outcomes.iter().find(|outcome| outcome.error.is_some())
            }
            _ => None,
        }
    }

    /// Decode a list-groups event, consuming it.
    pub fn into_list_groups(self) -> Result<ListGroupsResult> {
        match self.payload {
            EventPayload::ListGroups(result) => Ok(result),
            _ => Err(self.unexpected_payload()),
        }
    }

    /// Decode a describe-groups event, consuming it.
    pub fn into_group_descriptions(self) -> Result<Vec<GroupDescription>> {
        match self.payload {
            EventPayload::DescribeGroups(descriptions) => Ok(descriptions),
            _ => Err(self.unexpected_payload()),
        }
    }

    /// Decode a delete-groups event, consuming it.
    pub fn into_group_results(self) -> Result<Vec<GroupResult>> {
        match self.payload {
            EventPayload::DeleteGroups(results) => Ok(results),
            _ => Err(self.unexpected_payload()),
        }
    }

    fn unexpected_payload(&self) -> BridgeError {
        BridgeError::Internal(format!("{} event carries an unexpected payload", self.kind))
    }
}

/// Consumer group state as reported by the group coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsumerGroupState {
    Unknown,
    PreparingRebalance,
    CompletingRebalance,
    Stable,
    Dead,
    Empty,
}

impl ConsumerGroupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerGroupState::Unknown => "Unknown",
            ConsumerGroupState::PreparingRebalance => "PreparingRebalance",
            ConsumerGroupState::CompletingRebalance => "CompletingRebalance",
            ConsumerGroupState::Stable => "Stable",
            ConsumerGroupState::Dead => "Dead",
            ConsumerGroupState::Empty => "Empty",
        }
    }
}

impl FromStr for ConsumerGroupState {
    type Err = std::convert::Infallible;

    /// Unrecognized names map to `Unknown`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "PreparingRebalance" => ConsumerGroupState::PreparingRebalance,
            "CompletingRebalance" | "AwaitingSync" => ConsumerGroupState::CompletingRebalance,
            "Stable" | "Up" => ConsumerGroupState::Stable,
            "Dead" => ConsumerGroupState::Dead,
            "Empty" => ConsumerGroupState::Empty,
            _ => ConsumerGroupState::Unknown,
        })
    }
}

impl fmt::Display for ConsumerGroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupListing {
    pub group_id: String,
    pub is_simple_consumer_group: bool,
    pub state: ConsumerGroupState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListGroupsResult {
    pub groups: Vec<GroupListing>,
    /// Errors from individual brokers; the listing may be partial.
    pub errors: Vec<EngineError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub member_id: String,
    pub client_id: String,
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDescription {
    pub group_id: String,
    pub error: Option<EngineError>,
    pub is_simple_consumer_group: bool,
    pub protocol_type: String,
    pub partition_assignor: String,
    pub state: ConsumerGroupState,
    pub members: Vec<GroupMember>,
    pub authorized_operations: Option<Vec<String>>,
}

impl GroupDescription {
    /// Description of a group the coordinator does not know.
    pub fn not_found(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            error: Some(EngineError::with_message(
                crate::error::ErrorCode::GROUP_ID_NOT_FOUND,
                "group not found",
            )),
            is_simple_consumer_group: false,
            protocol_type: String::new(),
            partition_assignor: String::new(),
            state: ConsumerGroupState::Dead,
            members: Vec::new(),
            authorized_operations: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResult {
    pub group_id: String,
    pub error: Option<EngineError>,
}
