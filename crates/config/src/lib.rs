//! Configuration management for kafka-bridge clients
//!
//! Loads the high-level [`ClientOptions`] from YAML and environment
//! variables and translates them into the key/value configuration the
//! messaging engine understands ([`EngineConfig`]).

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix for option overrides
pub const ENV_PREFIX: &str = "KAFKA_BRIDGE_";

/// Engine property that restricts delivery reports to failures only
pub const DELIVERY_REPORT_ONLY_ERROR: &str = "delivery.report.only.error";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Which kind of client the engine configuration is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    Producer,
    Admin,
}

/// High-level client options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Broker addresses (host:port)
    pub bootstrap_servers: Vec<String>,

    /// Client ID reported to the brokers
    pub client_id: Option<String>,

    /// Security settings
    pub security: SecurityOptions,

    /// Producer tuning
    pub producer: ProducerOptions,

    /// Bridge behaviour (poll loop, deadlines)
    pub bridge: BridgeOptions,

    /// Additional engine properties passed through verbatim
    pub extra: BTreeMap<String, String>,
}

impl ClientOptions {
    /// Options for the given brokers with every other setting defaulted
    pub fn with_brokers<I, S>(brokers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bootstrap_servers: brokers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Load options from an optional YAML file and the environment
    ///
    /// Environment variables use the `KAFKA_BRIDGE_` prefix with `__` as
    /// the nesting separator, e.g. `KAFKA_BRIDGE_BRIDGE__POLL_INTERVAL_MS`.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(ClientOptions::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let options: ClientOptions = figment
            .extract()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Validate options
    pub fn validate(&self) -> Result<()> {
        if self.bootstrap_servers.is_empty() {
            return Err(ConfigError::ValidationError(
                "bootstrap_servers cannot be empty".to_string(),
            ));
        }

        if let Some(server) = self.bootstrap_servers.iter().find(|s| s.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "invalid bootstrap server: {:?}",
                server
            )));
        }

        if !["0", "1", "all", "-1"].contains(&self.producer.acks.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "invalid acks: {}. Must be '0', '1', 'all' or '-1'",
                self.producer.acks
            )));
        }

        if self.bridge.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "bridge.poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.bridge.disconnect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "bridge.disconnect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        self.security.validate()
    }

    /// Translate into engine-native configuration for the given role
    ///
    /// Extra properties are applied after the typed settings so they can
    /// override them, except for the producer's delivery report switch,
    /// which is always forced on.
    pub fn translate(&self, role: ClientRole) -> Result<EngineConfig> {
        self.validate()?;

        let mut config = EngineConfig::new();
        config.set("bootstrap.servers", self.bootstrap_servers.join(","));

        if let Some(ref client_id) = self.client_id {
            config.set("client.id", client_id);
        }

        self.security.apply(&mut config);

        if role == ClientRole::Producer {
            self.producer.apply(&mut config);
        }

        for (key, value) in &self.extra {
            config.set(key, value);
        }

        if role == ClientRole::Producer {
            config.set(DELIVERY_REPORT_ONLY_ERROR, "false");
        }

        Ok(config)
    }
}

/// Security protocol for broker connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityProtocol {
    #[default]
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "PLAINTEXT",
            SecurityProtocol::Ssl => "SSL",
            SecurityProtocol::SaslPlaintext => "SASL_PLAINTEXT",
            SecurityProtocol::SaslSsl => "SASL_SSL",
        }
    }

    pub fn uses_sasl(&self) -> bool {
        matches!(self, SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl)
    }
}

/// SASL authentication mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaslMechanism {
    #[serde(rename = "PLAIN")]
    Plain,
    #[serde(rename = "SCRAM-SHA-256")]
    ScramSha256,
    #[serde(rename = "SCRAM-SHA-512")]
    ScramSha512,
    #[serde(rename = "OAUTHBEARER")]
    OauthBearer,
}

impl SaslMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaslMechanism::Plain => "PLAIN",
            SaslMechanism::ScramSha256 => "SCRAM-SHA-256",
            SaslMechanism::ScramSha512 => "SCRAM-SHA-512",
            SaslMechanism::OauthBearer => "OAUTHBEARER",
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityOptions {
    pub protocol: SecurityProtocol,

    pub sasl_mechanism: Option<SaslMechanism>,

    pub sasl_username: Option<String>,

    #[serde(skip_serializing)]
    pub sasl_password: Option<String>,

    /// File holding the SASL password, read when the client connects
    pub sasl_password_file: Option<PathBuf>,

    /// Path to CA certificate file
    pub ssl_ca_location: Option<String>,
}

impl SecurityOptions {
    fn validate(&self) -> Result<()> {
        if self.protocol.uses_sasl() && self.sasl_mechanism.is_none() {
            return Err(ConfigError::ValidationError(format!(
                "security.sasl_mechanism is required with protocol {}",
                self.protocol.as_str()
            )));
        }

        if self.sasl_password.is_some() && self.sasl_password_file.is_some() {
            return Err(ConfigError::ValidationError(
                "security.sasl_password and security.sasl_password_file are mutually exclusive"
                    .to_string(),
            ));
        }

        Ok(())
    }

    fn apply(&self, config: &mut EngineConfig) {
        config.set("security.protocol", self.protocol.as_str());

        if let Some(mechanism) = self.sasl_mechanism {
            config.set("sasl.mechanisms", mechanism.as_str());
        }
        if let Some(ref username) = self.sasl_username {
            config.set("sasl.username", username);
        }
        if let Some(ref password) = self.sasl_password {
            config.set("sasl.password", password);
        }
        if let Some(ref ca) = self.ssl_ca_location {
            config.set("ssl.ca.location", ca);
        }
    }
}

/// Producer tuning options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerOptions {
    /// Acknowledgment level ("0", "1", "all")
    pub acks: String,

    /// Compression codec (none, gzip, snappy, lz4, zstd)
    pub compression_type: Option<String>,

    /// Linger time for batching (milliseconds)
    pub linger_ms: Option<u64>,

    /// Local delivery timeout (milliseconds)
    pub message_timeout_ms: u64,

    pub enable_idempotence: bool,
}

impl Default for ProducerOptions {
    fn default() -> Self {
        Self {
            acks: "all".to_string(),
            compression_type: None,
            linger_ms: None,
            message_timeout_ms: 30_000,
            enable_idempotence: false,
        }
    }
}

impl ProducerOptions {
    fn apply(&self, config: &mut EngineConfig) {
        config.set("acks", &self.acks);
        config.set("message.timeout.ms", self.message_timeout_ms.to_string());

        if let Some(ref compression) = self.compression_type {
            config.set("compression.type", compression);
        }
        if let Some(linger) = self.linger_ms {
            config.set("linger.ms", linger.to_string());
        }
        if self.enable_idempotence {
            config.set("enable.idempotence", "true");
        }
    }
}

/// Settings that govern the bridge itself rather than the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Background poll loop interval in milliseconds
    pub poll_interval_ms: u64,

    /// Deadline for the engine disconnect in milliseconds
    pub disconnect_timeout_ms: u64,

    /// Deadline for the connect probe in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            disconnect_timeout_ms: 5_000,
            connect_timeout_ms: 10_000,
        }
    }
}

impl BridgeOptions {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Engine-native key/value configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    properties: BTreeMap<String, String>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, replacing any previous value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_options_require_brokers() {
        let options = ClientOptions::default();
        assert!(options.validate().is_err());

        let options = ClientOptions::with_brokers(["localhost:9092"]);
        assert!(options.validate().is_ok());
        assert_eq!(options.bridge.poll_interval_ms, 500);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut options = ClientOptions::with_brokers(["localhost:9092"]);
        options.producer.acks = "2".to_string();
        assert!(options.validate().is_err());

        let mut options = ClientOptions::with_brokers(["localhost:9092"]);
        options.bridge.poll_interval_ms = 0;
        assert!(options.validate().is_err());

        let mut options = ClientOptions::with_brokers(["localhost:9092"]);
        options.security.protocol = SecurityProtocol::SaslSsl;
        assert!(options.validate().is_err());
        options.security.sasl_mechanism = Some(SaslMechanism::ScramSha512);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_producer_translation_forces_delivery_reports() {
        let mut options = ClientOptions::with_brokers(["b1:9092", "b2:9092"]);
        options.client_id = Some("orders".to_string());
        options
            .extra
            .insert(DELIVERY_REPORT_ONLY_ERROR.to_string(), "true".to_string());
        options
            .extra
            .insert("acks".to_string(), "1".to_string());

        let config = options.translate(ClientRole::Producer).unwrap();
        assert_eq!(config.get("bootstrap.servers"), Some("b1:9092,b2:9092"));
        assert_eq!(config.get("client.id"), Some("orders"));
        assert_eq!(config.get("acks"), Some("1"));
        assert_eq!(config.get(DELIVERY_REPORT_ONLY_ERROR), Some("false"));
    }

    #[test]
    fn test_admin_translation_skips_producer_settings() {
        let options = ClientOptions::with_brokers(["localhost:9092"]);
        let config = options.translate(ClientRole::Admin).unwrap();

        assert_eq!(config.get("security.protocol"), Some("PLAINTEXT"));
        assert!(config.get("acks").is_none());
        assert!(config.get(DELIVERY_REPORT_ONLY_ERROR).is_none());
    }

    #[test]
    fn test_load_from_yaml_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bridge.yaml",
                concat!(
                    "bootstrap_servers: [\"kafka:9092\"]\n",
                    "client_id: \"from-file\"\n",
                    "producer:\n",
                    "  acks: \"1\"\n",
                    "bridge:\n",
                    "  poll_interval_ms: 250\n",
                ),
            )?;
            jail.set_env("KAFKA_BRIDGE_CLIENT_ID", "from-env");
            jail.set_env("KAFKA_BRIDGE_BRIDGE__DISCONNECT_TIMEOUT_MS", "1500");

            let options = ClientOptions::load(Some(PathBuf::from("bridge.yaml")))
                .expect("options should load");

            assert_eq!(options.bootstrap_servers, vec!["kafka:9092".to_string()]);
            assert_eq!(options.client_id.as_deref(), Some("from-env"));
            assert_eq!(options.producer.acks, "1");
            assert_eq!(options.bridge.poll_interval_ms, 250);
            assert_eq!(options.bridge.disconnect_timeout_ms, 1500);
            assert_eq!(options.bridge.connect_timeout_ms, 10_000);
            Ok(())
        });
    }

    #[test]
    fn test_load_without_brokers_fails() {
        Jail::expect_with(|_jail| {
            assert!(ClientOptions::load(None).is_err());
            Ok(())
        });
    }
}
