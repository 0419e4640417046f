use crate::engine::OutboundRecord;
use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};

/// Partition value meaning "let the engine choose".
pub const UNASSIGNED_PARTITION: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub key: String,
    pub value: Vec<u8>,
}

/// One message of a produce request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    /// Required; a request holding a message without one fails validation.
    pub value: Option<Vec<u8>>,
    pub key: Option<Vec<u8>>,
    /// Defaults to [`UNASSIGNED_PARTITION`].
    pub partition: Option<i32>,
    /// Milliseconds since the epoch, defaults to the send time.
    pub timestamp: Option<i64>,
    pub headers: Vec<MessageHeader>,
}

impl Message {
    /// Message with the raw bytes of `value`.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push(MessageHeader {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn partition(&self) -> i32 {
        self.partition.unwrap_or(UNASSIGNED_PARTITION)
    }

    pub(crate) fn into_record(self, topic: &str, now_ms: i64) -> OutboundRecord {
        OutboundRecord {
            topic: topic.to_string(),
            partition: self.partition(),
            key: self.key,
            payload: self.value.unwrap_or_default(),
            timestamp: self.timestamp.unwrap_or(now_ms),
            headers: self
                .headers
                .into_iter()
                .map(|header| (header.key, header.value))
                .collect(),
        }
    }
}

/// Batch of messages for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProduceRequest {
    pub topic: String,
    pub messages: Vec<Message>,
}

impl ProduceRequest {
    pub fn new(topic: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            topic: topic.into(),
            messages,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.topic.is_empty() {
            return Err(BridgeError::validation(
                "topic must not be empty",
                Some("topic"),
            ));
        }

        for (index, message) in self.messages.iter().enumerate() {
            if message.value.is_none() {
                return Err(BridgeError::validation(
                    format!("message {} has no value", index),
                    Some("value"),
                ));
            }
            if message.partition() < UNASSIGNED_PARTITION {
                return Err(BridgeError::validation(
                    format!(
                        "message {} has invalid partition {}",
                        index,
                        message.partition()
                    ),
                    Some("partition"),
                ));
            }
            if matches!(message.timestamp, Some(ts) if ts < 0) {
                return Err(BridgeError::validation(
                    format!("message {} has a negative timestamp", index),
                    Some("timestamp"),
                ));
            }
        }

        Ok(())
    }
}

/// Outcome of one delivered message as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryMetadata {
    pub topic: String,
    pub partition: i32,
    pub error_code: i32,
    pub base_offset: Option<i64>,
    pub log_append_time: Option<i64>,
    pub log_start_offset: Option<i64>,
}

impl DeliveryMetadata {
    pub fn delivered(topic: impl Into<String>, partition: i32, offset: Option<i64>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            error_code: 0,
            base_offset: offset,
            log_append_time: None,
            log_start_offset: None,
        }
    }
}

/// Per topic-partition result returned by `send`, offsets rendered as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub topic_name: String,
    pub partition: i32,
    pub error_code: i32,
    pub base_offset: Option<String>,
    pub log_append_time: Option<String>,
    pub log_start_offset: Option<String>,
}

impl From<DeliveryMetadata> for RecordMetadata {
    fn from(metadata: DeliveryMetadata) -> Self {
        Self {
            topic_name: metadata.topic,
            partition: metadata.partition,
            error_code: metadata.error_code,
            base_offset: metadata.base_offset.map(|o| o.to_string()),
            log_append_time: metadata.log_append_time.map(|t| t.to_string()),
            log_start_offset: metadata.log_start_offset.map(|o| o.to_string()),
        }
    }
}
