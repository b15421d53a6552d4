//! Configuration for the Cloud Pub/Sub Source Connector

use crate::partition::{PartitionPolicy, PartitionScheme};
use pubsub_connect_core::{
    ConfigDef, ConfigKey, ConfigViolation, ConnectorError, ConnectorResult, Importance,
    ParsedConfig, RawConfig, Validator,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::num::NonZeroU32;
use std::time::Duration;

pub const KAFKA_TOPIC_CONFIG: &str = "kafka.topic";
pub const KAFKA_PARTITIONS_CONFIG: &str = "kafka.partition.count";
pub const KAFKA_PARTITION_SCHEME_CONFIG: &str = "kafka.partition.scheme";
pub const KAFKA_MESSAGE_KEY_CONFIG: &str = "kafka.key.attribute";
pub const KAFKA_MESSAGE_TIMESTAMP_CONFIG: &str = "kafka.timestamp.attribute";
pub const CPS_PROJECT_CONFIG: &str = "cps.project";
pub const CPS_SUBSCRIPTION_CONFIG: &str = "cps.subscription";
pub const CPS_MAX_BATCH_SIZE_CONFIG: &str = "cps.maxBatchSize";
pub const CPS_ENDPOINT_CONFIG: &str = "cps.endpoint";
pub const CPS_VERIFY_TIMEOUT_MS_CONFIG: &str = "cps.verifyTimeoutMs";
pub const GCP_CREDENTIALS_FILE_PATH_CONFIG: &str = "gcp.credentials.file.path";

pub const DEFAULT_CPS_MAX_BATCH_SIZE: i32 = 100;
pub const DEFAULT_KAFKA_PARTITIONS: i32 = 1;
pub const DEFAULT_KAFKA_PARTITION_SCHEME: &str = "round_robin";
pub const DEFAULT_CPS_ENDPOINT: &str = "https://pubsub.googleapis.com";
pub const DEFAULT_VERIFY_TIMEOUT_MS: i32 = 30_000;

/// Schema of every key the connector recognizes
pub fn config_def() -> ConfigDef {
    let positive = || Validator::range(1, i64::from(i32::MAX));

    ConfigDef::new()
        .define(
            ConfigKey::string(
                KAFKA_TOPIC_CONFIG,
                Importance::High,
                "The topic in Kafka which will receive messages that were pulled from \
                 Cloud Pub/Sub.",
            )
            .required()
            .with_validator(Validator::NonEmpty),
        )
        .define(
            ConfigKey::string(
                CPS_PROJECT_CONFIG,
                Importance::High,
                "The project containing the topic from which to pull messages.",
            )
            .required()
            .with_validator(Validator::NonEmpty),
        )
        .define(
            ConfigKey::string(
                CPS_SUBSCRIPTION_CONFIG,
                Importance::High,
                "The name of the subscription to Cloud Pub/Sub.",
            )
            .required()
            .with_validator(Validator::NonEmpty),
        )
        .define(
            ConfigKey::int(
                CPS_MAX_BATCH_SIZE_CONFIG,
                Importance::Medium,
                "The maximum number of messages to batch per pull request to Cloud Pub/Sub.",
            )
            .with_default(DEFAULT_CPS_MAX_BATCH_SIZE)
            .with_validator(positive()),
        )
        .define(ConfigKey::string(
            KAFKA_MESSAGE_KEY_CONFIG,
            Importance::Medium,
            "The Cloud Pub/Sub message attribute to use as a key for messages published to Kafka.",
        ))
        .define(ConfigKey::string(
            KAFKA_MESSAGE_TIMESTAMP_CONFIG,
            Importance::Medium,
            "The optional Cloud Pub/Sub message attribute to use as a timestamp for messages \
             published to Kafka. The timestamp is an integer epoch value.",
        ))
        .define(
            ConfigKey::int(
                KAFKA_PARTITIONS_CONFIG,
                Importance::Medium,
                "The number of Kafka partitions for the Kafka topic in which messages will be \
                 published to.",
            )
            .with_default(DEFAULT_KAFKA_PARTITIONS)
            .with_validator(positive()),
        )
        .define(
            ConfigKey::string(
                KAFKA_PARTITION_SCHEME_CONFIG,
                Importance::Medium,
                "The scheme for assigning a message to a partition in Kafka.",
            )
            .with_default(DEFAULT_KAFKA_PARTITION_SCHEME)
            .with_validator(Validator::OneOf(PartitionScheme::VALUES)),
        )
        .define(ConfigKey::string(
            GCP_CREDENTIALS_FILE_PATH_CONFIG,
            Importance::High,
            "The path to the GCP credentials file.",
        ))
        .define(
            ConfigKey::string(
                CPS_ENDPOINT_CONFIG,
                Importance::Low,
                "Base URL of the Cloud Pub/Sub API used to verify the subscription.",
            )
            .with_default(DEFAULT_CPS_ENDPOINT)
            .with_validator(Validator::NonEmpty),
        )
        .define(
            ConfigKey::int(
                CPS_VERIFY_TIMEOUT_MS_CONFIG,
                Importance::Low,
                "Deadline in milliseconds for verifying the subscription at startup.",
            )
            .with_default(DEFAULT_VERIFY_TIMEOUT_MS)
            .with_validator(positive()),
        )
}

pub const CONFIG_FILE_ENV: &str = "CONFIG_FILE";

/// Load raw properties: `CONFIG_FILE` (TOML) if set, then environment overrides
pub fn load_props() -> ConnectorResult<RawConfig> {
    load_props_with(|name| env::var(name).ok())
}

/// Like [`load_props`], reading variables through `lookup`
pub fn load_props_with(lookup: impl Fn(&str) -> Option<String>) -> ConnectorResult<RawConfig> {
    let mut props = match lookup(CONFIG_FILE_ENV).filter(|path| !path.is_empty()) {
        Some(path) => RawConfig::from_file(&path)?,
        None => RawConfig::new(),
    };
    props.apply_overrides(&config_def(), lookup);
    Ok(props)
}

/// Validated connector configuration, immutable after [`PubSubSourceConfig::parse`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubSubSourceConfig {
    pub source_project: String,
    pub source_subscription: String,
    pub destination_topic: String,
    pub credentials_path: Option<String>,
    pub max_batch_size: NonZeroU32,
    pub destination_partition_count: NonZeroU32,
    pub partition_scheme: PartitionScheme,
    pub key_attribute_name: Option<String>,
    pub timestamp_attribute_name: Option<String>,
    pub endpoint: String,
    pub verify_timeout_ms: NonZeroU32,
}

impl PubSubSourceConfig {
    /// Parse and validate raw properties, reporting every offending key at once
    pub fn parse(props: &RawConfig) -> ConnectorResult<Self> {
        let parsed = config_def().parse(props.as_map())?;
        Self::from_parsed(&parsed)
    }

    fn from_parsed(parsed: &ParsedConfig) -> ConnectorResult<Self> {
        let scheme_value = parsed.require_string(KAFKA_PARTITION_SCHEME_CONFIG)?;
        let partition_scheme = scheme_value.parse::<PartitionScheme>().map_err(|e| {
            ConnectorError::invalid_config(vec![ConfigViolation::new(
                KAFKA_PARTITION_SCHEME_CONFIG,
                e.to_string(),
            )])
        })?;

        Ok(Self {
            source_project: parsed.require_string(CPS_PROJECT_CONFIG)?,
            source_subscription: parsed.require_string(CPS_SUBSCRIPTION_CONFIG)?,
            destination_topic: parsed.require_string(KAFKA_TOPIC_CONFIG)?,
            credentials_path: optional(parsed, GCP_CREDENTIALS_FILE_PATH_CONFIG),
            max_batch_size: positive_int(parsed, CPS_MAX_BATCH_SIZE_CONFIG)?,
            destination_partition_count: positive_int(parsed, KAFKA_PARTITIONS_CONFIG)?,
            partition_scheme,
            key_attribute_name: optional(parsed, KAFKA_MESSAGE_KEY_CONFIG),
            timestamp_attribute_name: optional(parsed, KAFKA_MESSAGE_TIMESTAMP_CONFIG),
            endpoint: parsed.require_string(CPS_ENDPOINT_CONFIG)?,
            verify_timeout_ms: positive_int(parsed, CPS_VERIFY_TIMEOUT_MS_CONFIG)?,
        })
    }

    /// Fully-qualified subscription resource name
    pub fn subscription_path(&self) -> String {
        subscription_path(&self.source_project, &self.source_subscription)
    }

    /// Deadline for the startup readiness check
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.verify_timeout_ms.get()))
    }

    /// Partitioning parameters every worker derives its assigner from
    pub fn partition_policy(&self) -> PartitionPolicy {
        PartitionPolicy {
            scheme: self.partition_scheme,
            partition_count: self.destination_partition_count,
            key_attribute: self.key_attribute_name.clone(),
            timestamp_attribute: self.timestamp_attribute_name.clone(),
        }
    }

    /// Render back to flat properties; parsing the result yields an equal config
    pub fn to_props(&self) -> RawConfig {
        let mut props = RawConfig::new()
            .with(CPS_PROJECT_CONFIG, self.source_project.as_str())
            .with(CPS_SUBSCRIPTION_CONFIG, self.source_subscription.as_str())
            .with(KAFKA_TOPIC_CONFIG, self.destination_topic.as_str())
            .with(CPS_MAX_BATCH_SIZE_CONFIG, self.max_batch_size.to_string())
            .with(KAFKA_PARTITIONS_CONFIG, self.destination_partition_count.to_string())
            .with(KAFKA_PARTITION_SCHEME_CONFIG, self.partition_scheme.as_str())
            .with(CPS_ENDPOINT_CONFIG, self.endpoint.as_str())
            .with(CPS_VERIFY_TIMEOUT_MS_CONFIG, self.verify_timeout_ms.to_string());

        let optional_keys = [
            (GCP_CREDENTIALS_FILE_PATH_CONFIG, &self.credentials_path),
            (KAFKA_MESSAGE_KEY_CONFIG, &self.key_attribute_name),
            (KAFKA_MESSAGE_TIMESTAMP_CONFIG, &self.timestamp_attribute_name),
        ];
        for (key, value) in optional_keys {
            if let Some(value) = value {
                props.insert(key, value.as_str());
            }
        }
        props
    }
}

/// `projects/{project}/subscriptions/{subscription}`
pub fn subscription_path(project: &str, subscription: &str) -> String {
    format!("projects/{}/subscriptions/{}", project, subscription)
}

// Empty optional strings count as unset
fn optional(parsed: &ParsedConfig, key: &str) -> Option<String> {
    parsed
        .get_string(key)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn positive_int(parsed: &ParsedConfig, key: &str) -> ConnectorResult<NonZeroU32> {
    let value = parsed.require_int(key)?;
    u32::try_from(value)
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or_else(|| {
            ConnectorError::invalid_config(vec![ConfigViolation::new(
                key,
                format!("value {} must be at least 1", value),
            )])
        })
}
