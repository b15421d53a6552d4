//! Runtime for hosting a connector's control plane.
//!
//! The runtime handles:
//! - Tracing initialization
//! - Connector start (configuration and dependency validation)
//! - Fanning out task configurations to the worker supervisor
//! - Waiting for a shutdown signal and stopping the connector

use crate::{ConnectorError, ConnectorMetrics, ConnectorResult, RawConfig, SourceConnector};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::Future;
use tracing::{error, info, warn};

/// Settings of the hosting runtime itself (not of the connector)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Name used in logs and metric labels
    pub connector_name: String,

    /// Number of worker snapshots to produce
    pub max_tasks: usize,

    /// Log level used when `RUST_LOG` is not set
    pub log_level: String,
}

impl RuntimeConfig {
    /// Load runtime settings from environment variables, falling back to `defaults`
    ///
    /// Environment variables:
    /// - `CONNECTOR_NAME`: Connector name
    /// - `MAX_TASKS`: Number of worker snapshots
    /// - `LOG_LEVEL`: Log level
    pub fn from_env_or(defaults: RuntimeConfig) -> ConnectorResult<Self> {
        Self::from_lookup_or(defaults, |name| env::var(name).ok())
    }

    fn from_lookup_or(
        defaults: RuntimeConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ConnectorResult<Self> {
        let connector_name = lookup("CONNECTOR_NAME").unwrap_or(defaults.connector_name);

        let max_tasks = match lookup("MAX_TASKS") {
            Some(s) => s
                .trim()
                .parse()
                .map_err(|_| ConnectorError::config(format!("MAX_TASKS is not a number: {}", s)))?,
            None => defaults.max_tasks,
        };

        let log_level = lookup("LOG_LEVEL").unwrap_or(defaults.log_level);

        Ok(Self {
            connector_name,
            max_tasks,
            log_level,
        })
    }

    /// Validate the runtime settings
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.connector_name.is_empty() {
            return Err(ConnectorError::config("connector_name cannot be empty"));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            connector_name: "connector".to_string(),
            max_tasks: 1,
            log_level: "info".to_string(),
        }
    }
}

/// Hosts one connector instance from start to stop
pub struct ConnectorRuntime<C: SourceConnector> {
    connector: C,
    props: RawConfig,
    config: RuntimeConfig,
    metrics: ConnectorMetrics,
}

impl<C: SourceConnector> ConnectorRuntime<C> {
    /// Create a new runtime
    pub fn new(connector: C, props: RawConfig, config: RuntimeConfig) -> ConnectorResult<Self> {
        config.validate()?;

        Self::init_tracing(&config);

        info!("Initializing connector runtime");
        info!("Connector: {}", config.connector_name);
        info!("Version: {}", connector.version());
        info!("Max tasks: {}", config.max_tasks);

        let metrics = ConnectorMetrics::new(&config.connector_name);

        Ok(Self {
            connector,
            props,
            config,
            metrics,
        })
    }

    /// The hosted connector
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run until ctrl-c
    pub async fn run<F>(&mut self, dispatch: F) -> ConnectorResult<()>
    where
        F: FnOnce(Vec<C::TaskConfig>) -> ConnectorResult<()>,
    {
        self.run_until(shutdown_signal(), dispatch).await
    }

    /// Start the connector, hand its task configurations to `dispatch`, then wait for
    /// `shutdown` and stop the connector.
    ///
    /// A failed start returns immediately and `dispatch` is never called.
    pub async fn run_until<S, F>(&mut self, shutdown: S, dispatch: F) -> ConnectorResult<()>
    where
        S: Future<Output = ()>,
        F: FnOnce(Vec<C::TaskConfig>) -> ConnectorResult<()>,
    {
        info!("Starting connector runtime");

        if let Err(e) = self.connector.start(self.props.clone()).await {
            error!("Connector failed to start: {}", e);
            self.connector.stop();
            return Err(e);
        }
        info!("Connector started successfully");

        let tasks = self.connector.task_configs(self.config.max_tasks)?;
        self.metrics.record_task_configs(tasks.len());
        info!("Dispatching {} task configuration(s)", tasks.len());

        if let Err(e) = dispatch(tasks) {
            error!("Failed to dispatch task configurations: {}", e);
            self.shutdown_connector();
            return Err(e);
        }

        shutdown.await;
        self.shutdown_connector();
        Ok(())
    }

    fn shutdown_connector(&mut self) {
        info!("Stopping connector");
        self.connector.stop();
        self.metrics.set_ready(false);
        info!("Connector runtime stopped (state: {})", self.connector.state());
    }

    /// Initialize tracing/logging
    fn init_tracing(config: &RuntimeConfig) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .ok(); // Ignore if already initialized
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => warn!("Failed to listen for ctrl-c, stopping now: {}", e),
    }
}
