//! Connector trait implemented by every source connector.

use crate::{ConfigDef, ConnectorResult, LifecycleState, RawConfig};
use async_trait::async_trait;
use serde::Serialize;

/// Control plane of a source connector (External System → partitioned log)
///
/// The host calls these methods strictly in sequence: `start` completes before any
/// `task_configs`, which completes before `stop`. Implementations need no internal locking.
#[async_trait]
pub trait SourceConnector: Send {
    /// Per-worker configuration snapshot handed out by [`task_configs`](Self::task_configs)
    type TaskConfig: Clone + Serialize + Send;

    /// Connector version string
    fn version(&self) -> &'static str;

    /// Schema of every configuration key the connector recognizes
    fn config_def(&self) -> ConfigDef;

    /// Validate configuration and external dependencies
    ///
    /// Returns only after every startup check has completed. On error no worker
    /// configuration can ever be produced by this instance.
    async fn start(&mut self, props: RawConfig) -> ConnectorResult<()>;

    /// Produce exactly `max_tasks` independent worker snapshots
    fn task_configs(&self, max_tasks: usize) -> ConnectorResult<Vec<Self::TaskConfig>>;

    /// Mark the connector stopped. Cannot fail.
    fn stop(&mut self);

    /// Current lifecycle state
    fn state(&self) -> LifecycleState;
}
