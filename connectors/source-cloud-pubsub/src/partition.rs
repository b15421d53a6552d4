//! Partition assignment for messages bridged into the destination log.
//!
//! The scheme is a closed set selected by `kafka.partition.scheme`:
//!
//! | scheme | partition |
//! |---|---|
//! | `round_robin` | `counter % partition_count`, counter starts at 0 |
//! | `hash_key` | `stable_hash(attributes[key_attribute]) % partition_count` |
//! | `hash_value` | `stable_hash(payload) % partition_count` |
//! | `kafka_partitioner` | left to the destination's default partitioner |
//!
//! `hash_key` falls back to the round-robin counter for a message when no key attribute is
//! configured or the message does not carry it, so keyless messages are never dropped.
//!
//! # Round-robin scope
//!
//! Every worker derives its own [`PartitionAssigner`] from the shared [`PartitionPolicy`], and
//! every assigner owns its own counter starting at 0. Round-robin fairness therefore holds per
//! worker, not across workers: with `N` workers each worker cycles `0, 1, .., count - 1`
//! independently. With a single worker the sequence is globally sequential.

use murmur2::{murmur2, KAFKA_SEED};
use pubsub_connect_core::SourceMessage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

/// Policy for assigning a message to a destination partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PartitionScheme {
    #[default]
    RoundRobin,
    HashKey,
    HashValue,
    /// Leave placement to the destination system's default partitioner
    Delegate,
}

impl PartitionScheme {
    /// Every accepted configuration value, in declaration order
    pub const VALUES: &'static [&'static str] =
        &["round_robin", "hash_key", "hash_value", "kafka_partitioner"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionScheme::RoundRobin => "round_robin",
            PartitionScheme::HashKey => "hash_key",
            PartitionScheme::HashValue => "hash_value",
            PartitionScheme::Delegate => "kafka_partitioner",
        }
    }
}

impl fmt::Display for PartitionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized partition scheme string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown partition scheme '{0}', valid values are [round_robin, hash_key, hash_value, kafka_partitioner]")]
pub struct UnknownPartitionScheme(pub String);

impl FromStr for PartitionScheme {
    type Err = UnknownPartitionScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_robin" => Ok(PartitionScheme::RoundRobin),
            "hash_key" => Ok(PartitionScheme::HashKey),
            "hash_value" => Ok(PartitionScheme::HashValue),
            "kafka_partitioner" => Ok(PartitionScheme::Delegate),
            other => Err(UnknownPartitionScheme(other.to_string())),
        }
    }
}

impl TryFrom<String> for PartitionScheme {
    type Error = UnknownPartitionScheme;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PartitionScheme> for String {
    fn from(scheme: PartitionScheme) -> Self {
        scheme.as_str().to_string()
    }
}

/// Where a message should land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetPartition {
    /// Explicit partition index in `[0, partition_count)`
    Partition(u32),
    /// Let the destination system choose
    Delegate,
}

impl TargetPartition {
    /// Explicit index, `None` when delegated
    pub fn index(&self) -> Option<u32> {
        match self {
            TargetPartition::Partition(p) => Some(*p),
            TargetPartition::Delegate => None,
        }
    }
}

/// Kafka-compatible key hash: murmur2 with Kafka's seed, sign bit masked.
///
/// Matches the destination's own default partitioner so keyed routing agrees with producers
/// that write the same keys directly.
pub fn stable_hash(bytes: &[u8]) -> u32 {
    murmur2(bytes, KAFKA_SEED) & 0x7fff_ffff
}

/// Hash-based partition index for `bytes`
pub fn hash_partition(bytes: &[u8], partition_count: NonZeroU32) -> u32 {
    stable_hash(bytes) % partition_count.get()
}

/// Immutable partitioning parameters shared by value with every worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionPolicy {
    pub scheme: PartitionScheme,
    pub partition_count: NonZeroU32,
    /// Attribute that supplies the destination record key
    pub key_attribute: Option<String>,
    /// Attribute that supplies the destination record timestamp (epoch integer)
    pub timestamp_attribute: Option<String>,
}

impl PartitionPolicy {
    pub fn new(scheme: PartitionScheme, partition_count: NonZeroU32) -> Self {
        Self {
            scheme,
            partition_count,
            key_attribute: None,
            timestamp_attribute: None,
        }
    }

    pub fn with_key_attribute(mut self, name: impl Into<String>) -> Self {
        self.key_attribute = Some(name.into());
        self
    }

    pub fn with_timestamp_attribute(mut self, name: impl Into<String>) -> Self {
        self.timestamp_attribute = Some(name.into());
        self
    }

    /// Create a fresh assigner with its own round-robin counter
    pub fn assigner(&self) -> PartitionAssigner {
        PartitionAssigner::new(self.clone())
    }
}

/// A worker's partition assigner: the shared policy plus this worker's counter
///
/// The counter is atomic so one assigner can serve several threads of the same worker. It is
/// never shared between workers.
#[derive(Debug)]
pub struct PartitionAssigner {
    policy: PartitionPolicy,
    counter: AtomicU64,
}

impl PartitionAssigner {
    pub fn new(policy: PartitionPolicy) -> Self {
        Self {
            policy,
            counter: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &PartitionPolicy {
        &self.policy
    }

    /// Choose the destination partition for `message`. Never fails.
    pub fn assign(&self, message: &SourceMessage) -> TargetPartition {
        let count = self.policy.partition_count;
        match self.policy.scheme {
            PartitionScheme::RoundRobin => self.next_round_robin(),
            PartitionScheme::HashKey => match self.record_key(message) {
                Some(key) => TargetPartition::Partition(hash_partition(key.as_bytes(), count)),
                None => self.next_round_robin(),
            },
            PartitionScheme::HashValue => {
                TargetPartition::Partition(hash_partition(message.payload(), count))
            }
            PartitionScheme::Delegate => TargetPartition::Delegate,
        }
    }

    /// Destination record key: the configured key attribute's value, if present
    pub fn record_key<'a>(&self, message: &'a SourceMessage) -> Option<&'a str> {
        self.policy
            .key_attribute
            .as_deref()
            .and_then(|name| message.get_attribute(name))
    }

    /// Destination record timestamp parsed from the configured timestamp attribute
    pub fn record_timestamp(&self, message: &SourceMessage) -> Option<i64> {
        let name = self.policy.timestamp_attribute.as_deref()?;
        let raw = message.get_attribute(name)?;
        match raw.trim().parse::<i64>() {
            Ok(ts) => Some(ts),
            Err(_) => {
                debug!(
                    attribute = name,
                    value = raw,
                    "Ignoring non-integer timestamp attribute"
                );
                None
            }
        }
    }

    fn next_round_robin(&self) -> TargetPartition {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        TargetPartition::Partition((n % u64::from(self.policy.partition_count.get())) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    fn partitions(assigner: &PartitionAssigner, messages: &[SourceMessage]) -> Vec<u32> {
        messages
            .iter()
            .map(|m| assigner.assign(m).index().unwrap())
            .collect()
    }

    #[test]
    fn test_scheme_round_trips() {
        for value in PartitionScheme::VALUES {
            let scheme: PartitionScheme = value.parse().unwrap();
            assert_eq!(scheme.to_string(), *value);
        }
        assert_eq!(PartitionScheme::default(), PartitionScheme::RoundRobin);
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        for value in ["", "ROUND_ROBIN", "hash", "delegate", "random"] {
            let err = value.parse::<PartitionScheme>().unwrap_err();
            assert!(err.to_string().contains("kafka_partitioner"));
        }
    }

    #[test]
    fn test_scheme_serde_uses_config_strings() {
        let json = serde_json::to_string(&PartitionScheme::Delegate).unwrap();
        assert_eq!(json, "\"kafka_partitioner\"");

        let scheme: PartitionScheme = serde_json::from_str("\"hash_value\"").unwrap();
        assert_eq!(scheme, PartitionScheme::HashValue);

        assert!(serde_json::from_str::<PartitionScheme>("\"nope\"").is_err());
    }

    #[test]
    fn test_round_robin_cycles_from_zero() {
        let assigner = PartitionPolicy::new(PartitionScheme::RoundRobin, count(3)).assigner();
        let messages: Vec<_> = (0..7).map(|i| SourceMessage::new(vec![i as u8])).collect();

        assert_eq!(partitions(&assigner, &messages), vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_round_robin_counters_are_per_assigner() {
        let policy = PartitionPolicy::new(PartitionScheme::RoundRobin, count(4));
        let first = policy.assigner();
        let second = policy.assigner();
        let message = SourceMessage::new("m");

        assert_eq!(first.assign(&message), TargetPartition::Partition(0));
        assert_eq!(first.assign(&message), TargetPartition::Partition(1));
        assert_eq!(second.assign(&message), TargetPartition::Partition(0));
    }

    #[test]
    fn test_stable_hash_matches_kafka_murmur2() {
        // Reference values from Kafka's Utils.murmur2, sign bit masked
        assert_eq!(stable_hash(b"21"), (-973932308i32 as u32) & 0x7fff_ffff);
        assert_eq!(stable_hash(b"foobar"), (-790332482i32 as u32) & 0x7fff_ffff);
        assert_eq!(stable_hash(b"abc"), 479470107);
        assert_eq!(stable_hash(b"21"), 1173551340);
    }

    #[test]
    fn test_hash_key_is_deterministic() {
        let policy =
            PartitionPolicy::new(PartitionScheme::HashKey, count(10)).with_key_attribute("user");
        let message = SourceMessage::new("payload").with_attribute("user", "21");

        let expected = TargetPartition::Partition(1173551340 % 10);
        for _ in 0..5 {
            // A fresh assigner models a restarted worker
            assert_eq!(policy.assigner().assign(&message), expected);
        }
    }

    #[test]
    fn test_hash_key_ignores_payload() {
        let assigner = PartitionPolicy::new(PartitionScheme::HashKey, count(16))
            .with_key_attribute("user")
            .assigner();

        let a = SourceMessage::new("one").with_attribute("user", "alice");
        let b = SourceMessage::new("two").with_attribute("user", "alice");
        assert_eq!(assigner.assign(&a), assigner.assign(&b));
    }

    #[test]
    fn test_hash_key_falls_back_to_round_robin() {
        let with_attr = PartitionPolicy::new(PartitionScheme::HashKey, count(3))
            .with_key_attribute("user")
            .assigner();
        let keyless: Vec<_> = (0..4).map(|_| SourceMessage::new("x")).collect();
        assert_eq!(partitions(&with_attr, &keyless), vec![0, 1, 2, 0]);

        let no_attr_configured =
            PartitionPolicy::new(PartitionScheme::HashKey, count(3)).assigner();
        let keyed: Vec<_> = (0..4)
            .map(|_| SourceMessage::new("x").with_attribute("user", "alice"))
            .collect();
        assert_eq!(partitions(&no_attr_configured, &keyed), vec![0, 1, 2, 0]);
    }

    #[test]
    fn test_hash_value_uses_payload() {
        let assigner = PartitionPolicy::new(PartitionScheme::HashValue, count(10)).assigner();

        let message = SourceMessage::new("21").with_attribute("user", "ignored");
        assert_eq!(
            assigner.assign(&message),
            TargetPartition::Partition(1173551340 % 10)
        );

        let empty = SourceMessage::new(Vec::new());
        assert_eq!(assigner.assign(&empty), assigner.assign(&empty));
    }

    #[test]
    fn test_delegate_returns_sentinel() {
        let assigner = PartitionPolicy::new(PartitionScheme::Delegate, count(5)).assigner();
        let message = SourceMessage::new("payload").with_attribute("user", "alice");

        assert_eq!(assigner.assign(&message), TargetPartition::Delegate);
        assert_eq!(assigner.assign(&message).index(), None);
    }

    #[test]
    fn test_partition_always_in_range() {
        for scheme in [
            PartitionScheme::RoundRobin,
            PartitionScheme::HashKey,
            PartitionScheme::HashValue,
        ] {
            for n in [1, 2, 7, 64] {
                let assigner = PartitionPolicy::new(scheme, count(n))
                    .with_key_attribute("k")
                    .assigner();
                for i in 0..200 {
                    let mut message = SourceMessage::new(format!("payload-{}", i));
                    if i % 3 != 0 {
                        message = message.with_attribute("k", format!("key-{}", i));
                    }
                    let p = assigner.assign(&message).index().unwrap();
                    assert!(p < n, "{} produced {} for {} partitions", scheme, p, n);
                }
            }
        }
    }

    #[test]
    fn test_single_partition() {
        for scheme in [
            PartitionScheme::RoundRobin,
            PartitionScheme::HashKey,
            PartitionScheme::HashValue,
        ] {
            let assigner = PartitionPolicy::new(scheme, count(1))
                .with_key_attribute("k")
                .assigner();
            let message = SourceMessage::new("v").with_attribute("k", "key");
            assert_eq!(assigner.assign(&message), TargetPartition::Partition(0));
        }
    }

    #[test]
    fn test_record_key_and_timestamp() {
        let assigner = PartitionPolicy::new(PartitionScheme::RoundRobin, count(1))
            .with_key_attribute("user")
            .with_timestamp_attribute("ts")
            .assigner();

        let message = SourceMessage::new("v")
            .with_attribute("user", "alice")
            .with_attribute("ts", "1700000000000");
        assert_eq!(assigner.record_key(&message), Some("alice"));
        assert_eq!(assigner.record_timestamp(&message), Some(1_700_000_000_000));

        let bad_ts = SourceMessage::new("v").with_attribute("ts", "yesterday");
        assert_eq!(assigner.record_key(&bad_ts), None);
        assert_eq!(assigner.record_timestamp(&bad_ts), None);
    }

    #[test]
    fn test_unconfigured_key_and_timestamp() {
        let assigner = PartitionPolicy::new(PartitionScheme::RoundRobin, count(1)).assigner();
        let message = SourceMessage::new("v")
            .with_attribute("user", "alice")
            .with_attribute("ts", "1");

        assert_eq!(assigner.record_key(&message), None);
        assert_eq!(assigner.record_timestamp(&message), None);
    }
}
