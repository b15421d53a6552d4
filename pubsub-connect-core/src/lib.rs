//! # Pub/Sub Connect Core
//!
//! Core SDK for building connectors that bridge a pull-based publish/subscribe system into a
//! partitioned, ordered log.
//!
//! This library covers the control plane of a connector: declaring and validating
//! configuration, guarding the start/stop lifecycle, and fanning out per-worker configuration
//! snapshots. The data plane (pulling, batching, publishing) runs in the workers that consume
//! those snapshots.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use pubsub_connect_core::{
//!     ConfigDef, ConfigKey, ConnectorResult, Importance, Lifecycle, LifecycleState, RawConfig,
//!     SourceConnector,
//! };
//!
//! pub struct MyConnector {
//!     lifecycle: Lifecycle,
//!     props: RawConfig,
//! }
//!
//! #[async_trait]
//! impl SourceConnector for MyConnector {
//!     type TaskConfig = RawConfig;
//!
//!     fn version(&self) -> &'static str {
//!         "0.1.0"
//!     }
//!
//!     fn config_def(&self) -> ConfigDef {
//!         ConfigDef::new()
//!             .define(ConfigKey::string("topic", Importance::High, "Topic").required())
//!     }
//!
//!     async fn start(&mut self, props: RawConfig) -> ConnectorResult<()> {
//!         self.lifecycle.begin_validation()?;
//!         self.config_def().parse(props.as_map())?;
//!         self.props = props;
//!         self.lifecycle.mark_ready()
//!     }
//!
//!     fn task_configs(&self, max_tasks: usize) -> ConnectorResult<Vec<RawConfig>> {
//!         self.lifecycle.require_ready("compute task configs")?;
//!         Ok(vec![self.props.clone(); max_tasks])
//!     }
//!
//!     fn stop(&mut self) {
//!         self.lifecycle.stop();
//!     }
//!
//!     fn state(&self) -> LifecycleState {
//!         self.lifecycle.state()
//!     }
//! }
//! ```

mod config;
mod error;
mod lifecycle;
mod message;
mod metrics;
mod runtime;
mod traits;

// Re-export public API
pub use config::{
    ConfigDef, ConfigKey, ConfigType, ConfigValue, Importance, KeyDefault, ParsedConfig,
    RawConfig, Validator,
};
pub use error::{BoxError, ConfigViolation, ConnectorError, ConnectorResult};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use message::SourceMessage;
pub use metrics::ConnectorMetrics;
pub use runtime::{ConnectorRuntime, RuntimeConfig};
pub use traits::SourceConnector;

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
