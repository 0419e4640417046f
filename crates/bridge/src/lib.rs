//! Future-oriented producer and admin client over a callback-driven Kafka engine
//!
//! The engine (librdkafka in production, see [`engine::RdKafkaEngine`])
//! reports connection readiness, delivery reports and admin results through
//! callbacks and queues. This crate turns those into `async` calls:
//!
//! - [`Producer`]: connect / send / disconnect with per-message delivery
//!   correlation and per topic-partition aggregation of the results
//! - [`AdminClient`]: topic, partition and consumer group commands answered
//!   on a dedicated result queue polled with a bounded exponential schedule
//!
//! # Example
//!
//! ```no_run
//! use bridge::{ClientOptions, KafkaProducer, Message, ProduceRequest};
//!
//! # async fn run() -> bridge::Result<()> {
//! let producer = KafkaProducer::from_options(ClientOptions::with_brokers(["localhost:9092"]));
//! producer.connect().await?;
//!
//! let offsets = producer
//!     .send(ProduceRequest::new("orders", vec![Message::new("a"), Message::new("b")]))
//!     .await?;
//! println!("{:?}", offsets);
//!
//! producer.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod connection;
pub mod engine;
pub mod error;
mod poller;
pub mod producer;

pub use admin::{
    AdminCallOptions, AdminClient, ConsumerGroupState, GroupDescription, GroupListing,
    GroupResult, ListGroupsResult, NewPartitions, NewTopic,
};
pub use connection::ConnectionState;
pub use engine::{Engine, EngineHandle, MockEngine, RdKafkaEngine};
pub use error::{BridgeError, EngineError, ErrorCode, ErrorSeverity, Result};
pub use kafka_bridge_config::{ClientOptions, ClientRole, EngineConfig};
pub use producer::{Message, ProduceRequest, Producer, RecordMetadata};

/// Producer over librdkafka.
pub type KafkaProducer = Producer<RdKafkaEngine>;

/// Admin client over librdkafka.
pub type KafkaAdminClient = AdminClient<RdKafkaEngine>;
