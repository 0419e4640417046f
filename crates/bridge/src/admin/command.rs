use super::event::ResultKind;
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Topic to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTopic {
    pub name: String,
    /// `-1` uses the broker default.
    #[serde(default = "broker_default")]
    pub num_partitions: i32,
    /// `-1` uses the broker default.
    #[serde(default = "broker_default")]
    pub replication_factor: i32,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

fn broker_default() -> i32 {
    -1
}

impl NewTopic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            num_partitions: -1,
            replication_factor: -1,
            config: BTreeMap::new(),
        }
    }

    pub fn with_partitions(mut self, num_partitions: i32) -> Self {
        self.num_partitions = num_partitions;
        self
    }

    pub fn with_replication_factor(mut self, replication_factor: i32) -> Self {
        self.replication_factor = replication_factor;
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(BridgeError::validation(
                "topic name must not be empty",
                Some("name"),
            ));
        }
        if self.num_partitions == 0 || self.num_partitions < -1 {
            return Err(BridgeError::validation(
                format!("invalid partition count {}", self.num_partitions),
                Some("num_partitions"),
            ));
        }
        if self.replication_factor == 0 || self.replication_factor < -1 {
            return Err(BridgeError::validation(
                format!("invalid replication factor {}", self.replication_factor),
                Some("replication_factor"),
            ));
        }
        Ok(())
    }
}

/// New total partition count for an existing topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPartitions {
    pub topic: String,
    pub total_count: i32,
}

impl NewPartitions {
    pub fn new(topic: impl Into<String>, total_count: i32) -> Self {
        Self {
            topic: topic.into(),
            total_count,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.topic.is_empty() {
            return Err(BridgeError::validation(
                "topic name must not be empty",
                Some("topic"),
            ));
        }
        if self.total_count < 1 {
            return Err(BridgeError::validation(
                format!("partition count must be at least 1, got {}", self.total_count),
                Some("total_count"),
            ));
        }
        Ok(())
    }
}

/// Command submitted to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    CreateTopics(Vec<NewTopic>),
    DeleteTopics(Vec<String>),
    CreatePartitions(Vec<NewPartitions>),
    ListGroups,
    DescribeGroups(Vec<String>),
    DeleteGroups(Vec<String>),
}

impl AdminCommand {
    /// Kind of the result event that answers this command.
    pub fn result_kind(&self) -> ResultKind {
        match self {
            AdminCommand::CreateTopics(_) => ResultKind::CreateTopics,
            AdminCommand::DeleteTopics(_) => ResultKind::DeleteTopics,
            AdminCommand::CreatePartitions(_) => ResultKind::CreatePartitions,
            AdminCommand::ListGroups => ResultKind::ListConsumerGroups,
            AdminCommand::DescribeGroups(_) => ResultKind::DescribeConsumerGroups,
            AdminCommand::DeleteGroups(_) => ResultKind::DeleteGroups,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AdminCommand::CreateTopics(_) => "create topics",
            AdminCommand::DeleteTopics(_) => "delete topics",
            AdminCommand::CreatePartitions(_) => "create partitions",
            AdminCommand::ListGroups => "list groups",
            AdminCommand::DescribeGroups(_) => "describe groups",
            AdminCommand::DeleteGroups(_) => "delete groups",
        }
    }
}

/// Reject empty group lists and empty group ids.
pub(crate) fn validate_group_ids(groups: &[String]) -> Result<()> {
    if groups.is_empty() {
        return Err(BridgeError::validation(
            "at least one group id is required",
            Some("groups"),
        ));
    }
    if groups.iter().any(String::is_empty) {
        return Err(BridgeError::validation(
            "group ids must not be empty",
            Some("groups"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_topic_defaults_and_validation() {
        let topic = NewTopic::new("orders");
        assert_eq!(topic.num_partitions, -1);
        assert_eq!(topic.replication_factor, -1);
        assert!(topic.validate().is_ok());

        assert!(NewTopic::new("").validate().is_err());
        assert!(NewTopic::new("orders").with_partitions(0).validate().is_err());
        assert!(NewTopic::new("orders")
            .with_replication_factor(-3)
            .validate()
            .is_err());
    }

    #[test]
    fn test_new_topic_deserializes_with_defaults() {
        let topic: NewTopic = serde_json::from_str(r#"{"name":"orders"}"#).unwrap();
        assert_eq!(topic, NewTopic::new("orders"));
    }

    #[test]
    fn test_new_partitions_validation() {
        assert!(NewPartitions::new("orders", 4).validate().is_ok());
        assert!(NewPartitions::new("orders", 0).validate().is_err());
        assert!(NewPartitions::new("", 3).validate().is_err());
    }

    #[test]
    fn test_group_id_validation() {
        assert!(validate_group_ids(&[]).is_err());
        assert!(validate_group_ids(&["".to_string()]).is_err());
        assert!(validate_group_ids(&["g1".to_string()]).is_ok());
    }

    #[test]
    fn test_result_kinds() {
        assert_eq!(
            AdminCommand::ListGroups.result_kind(),
            ResultKind::ListConsumerGroups
        );
        assert_eq!(
            AdminCommand::DeleteTopics(vec!["t".to_string()]).result_kind(),
            ResultKind::DeleteTopics
        );
    }
}
