//! # Cloud Pub/Sub Source Connector
//!
//! Control plane of a connector that pulls messages from a Cloud Pub/Sub subscription and
//! publishes them to a Kafka topic.
//!
//! Starting the connector validates its configuration, loads GCP credentials and verifies that
//! the subscription exists. Only then does it hand out per-worker configuration snapshots.
//! Workers build a [`PartitionAssigner`] from their snapshot to route each message.
//!
//! Round-robin assignment keeps one counter per assigner. Each worker owns its own assigner,
//! so round-robin is fair per worker and not across workers.

pub mod config;
pub mod connector;
pub mod credentials;
pub mod partition;
pub mod readiness;

pub use config::{config_def, load_props, load_props_with, PubSubSourceConfig};
pub use connector::{EnvLookup, PubSubSourceConnector, CONNECTOR_NAME};
pub use credentials::{Credentials, CredentialsError};
pub use partition::{PartitionAssigner, PartitionPolicy, PartitionScheme, TargetPartition};
pub use readiness::{
    emulator_host, ProbeError, RestSubscriptionProbe, SubscriptionDescriptor, SubscriptionProbe,
    SubscriptionReadinessCheck,
};
