//! Cloud Pub/Sub Source Connector
//!
//! Validates the connector configuration, verifies the subscription, then prints one worker
//! configuration per line (JSON) for the worker supervisor and waits for ctrl-c.

use anyhow::Context;
use cloud_pubsub_source::{config_def, load_props, PubSubSourceConnector, CONNECTOR_NAME};
use pubsub_connect_core::{ConnectorRuntime, RuntimeConfig};
use std::io::Write;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "--describe") {
        describe_config();
        return Ok(());
    }

    let runtime_config = RuntimeConfig::from_env_or(RuntimeConfig {
        connector_name: CONNECTOR_NAME.to_string(),
        ..RuntimeConfig::default()
    })?;
    init_tracing(&runtime_config.log_level);

    tracing::info!("Starting Cloud Pub/Sub Source Connector");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let props = load_props().context("failed to load connector properties")?;

    let mut runtime = ConnectorRuntime::new(PubSubSourceConnector::new(), props, runtime_config)?;

    runtime
        .run(|tasks| {
            let mut out = std::io::stdout().lock();
            for (task_id, task) in tasks.iter().enumerate() {
                let line = serde_json::json!({
                    "task_id": task_id,
                    "config": task.to_props(),
                });
                writeln!(out, "{}", line).map_err(|e| {
                    pubsub_connect_core::ConnectorError::config(format!(
                        "failed to write task configuration: {}",
                        e
                    ))
                })?;
            }
            Ok(())
        })
        .await?;

    tracing::info!("Cloud Pub/Sub Source Connector stopped");
    Ok(())
}

fn describe_config() {
    for key in config_def().keys() {
        let default = match &key.default {
            pubsub_connect_core::KeyDefault::Required => "(required)".to_string(),
            pubsub_connect_core::KeyDefault::Unset => "(unset)".to_string(),
            pubsub_connect_core::KeyDefault::Value(value) => value.to_string(),
        };
        println!(
            "{:<28} {:<7} {:<10} {}",
            key.name,
            format!("{:?}", key.config_type).to_lowercase(),
            default,
            key.importance
        );
        println!("    {}", key.documentation);
    }
}

fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();
}
