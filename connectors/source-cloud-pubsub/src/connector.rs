//! Cloud Pub/Sub Source Connector implementation

use crate::config::{self, PubSubSourceConfig};
use crate::credentials::Credentials;
use crate::readiness::{
    emulator_host, RestSubscriptionProbe, SubscriptionProbe, SubscriptionReadinessCheck,
};
use async_trait::async_trait;
use pubsub_connect_core::{
    ConfigDef, ConnectorError, ConnectorMetrics, ConnectorResult, Lifecycle, LifecycleState,
    RawConfig, SourceConnector,
};
use std::env;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

pub const CONNECTOR_NAME: &str = "cloud-pubsub-source";

/// Reads an environment variable by name
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Control plane of the Cloud Pub/Sub → Kafka source connector
///
/// `start` validates configuration, loads credentials and verifies the subscription
/// before any worker configuration can be produced.
pub struct PubSubSourceConnector {
    lifecycle: Lifecycle,
    config: Option<PubSubSourceConfig>,
    probe: Option<Arc<dyn SubscriptionProbe>>,
    env: EnvLookup,
    metrics: ConnectorMetrics,
}

impl PubSubSourceConnector {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            config: None,
            probe: None,
            env: Arc::new(|name| env::var(name).ok()),
            metrics: ConnectorMetrics::new(CONNECTOR_NAME),
        }
    }

    /// Use `probe` for the readiness check instead of the REST API at `cps.endpoint`
    pub fn with_probe(mut self, probe: Arc<dyn SubscriptionProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Read `PUBSUB_EMULATOR_HOST` and `GOOGLE_APPLICATION_CREDENTIALS` through `lookup`
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.env = Arc::new(lookup);
        self
    }

    /// The validated configuration, once started
    pub fn config(&self) -> Option<&PubSubSourceConfig> {
        self.config.as_ref()
    }

    async fn validate_and_verify(&self, props: &RawConfig) -> ConnectorResult<PubSubSourceConfig> {
        let config = PubSubSourceConfig::parse(props)?;
        info!(
            subscription = %config.subscription_path(),
            topic = %config.destination_topic,
            partitions = config.destination_partition_count.get(),
            scheme = %config.partition_scheme,
            "Configuration validated"
        );

        let emulator = emulator_host(|name| (self.env)(name));

        // Application default credentials are never consulted for the emulator
        let credentials = match (&emulator, config.credentials_path.as_deref()) {
            (Some(_), None) => Credentials::Anonymous,
            (_, path) => Credentials::resolve_with(path, |name| (self.env)(name))?,
        };

        let probe: Arc<dyn SubscriptionProbe> = match (&self.probe, &emulator) {
            (Some(probe), _) => Arc::clone(probe),
            (None, Some(host)) => {
                info!("Using Pub/Sub emulator at {}", host);
                Arc::new(RestSubscriptionProbe::emulator(host))
            }
            (None, None) => Arc::new(RestSubscriptionProbe::new(config.endpoint.as_str())),
        };
        let check = SubscriptionReadinessCheck::new(probe, config.verify_timeout());

        let started = Instant::now();
        check
            .verify(&config.source_project, &config.source_subscription, &credentials)
            .await?;
        self.metrics.record_readiness_latency(started.elapsed());

        Ok(config)
    }
}

impl Default for PubSubSourceConnector {
    fn default() -> Self {
        Self::new()
    }
}

fn failure_kind(error: &ConnectorError) -> &'static str {
    match error {
        ConnectorError::InvalidConfig { .. } | ConnectorError::Config(_) => "invalid_config",
        ConnectorError::CredentialLoad { .. } => "credentials",
        ConnectorError::SubscriptionUnreachable { .. } => "subscription_unreachable",
        ConnectorError::IllegalState { .. } => "illegal_state",
    }
}

#[async_trait]
impl SourceConnector for PubSubSourceConnector {
    type TaskConfig = PubSubSourceConfig;

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn config_def(&self) -> ConfigDef {
        config::config_def()
    }

    async fn start(&mut self, props: RawConfig) -> ConnectorResult<()> {
        self.lifecycle.begin_validation()?;
        self.metrics.record_start_attempt();
        info!("Starting Cloud Pub/Sub source connector");

        match self.validate_and_verify(&props).await {
            Ok(config) => {
                self.config = Some(config);
                self.lifecycle.mark_ready()?;
                self.metrics.set_ready(true);
                info!("Cloud Pub/Sub source connector is ready");
                Ok(())
            }
            Err(e) => {
                error!("Cloud Pub/Sub source connector failed to start: {}", e);
                self.metrics.record_start_failure(failure_kind(&e));
                self.lifecycle.mark_failed()?;
                Err(e)
            }
        }
    }

    fn task_configs(&self, max_tasks: usize) -> ConnectorResult<Vec<PubSubSourceConfig>> {
        self.lifecycle.require_ready("compute task configs")?;
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| ConnectorError::illegal_state("compute task configs", self.state()))?;

        Ok((0..max_tasks).map(|_| config.clone()).collect())
    }

    fn stop(&mut self) {
        self.lifecycle.stop();
        self.metrics.set_ready(false);
        info!("Cloud Pub/Sub source connector stopped");
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::minimal_props;
    use crate::config::{CPS_MAX_BATCH_SIZE_CONFIG, GCP_CREDENTIALS_FILE_PATH_CONFIG};
    use crate::credentials::tests::{authorized_user_json, credentials_file, service_account_json};
    use crate::credentials::GOOGLE_APPLICATION_CREDENTIALS;
    use crate::readiness::{
        MockSubscriptionProbe, ProbeError, SubscriptionDescriptor, PUBSUB_EMULATOR_HOST,
    };
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    fn connector() -> PubSubSourceConnector {
        PubSubSourceConnector::new().with_env(|_| None)
    }

    fn env_vars(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn found_probe() -> Arc<MockSubscriptionProbe> {
        let mut probe = MockSubscriptionProbe::new();
        probe.expect_describe().times(1).returning(|name, _| {
            Ok(SubscriptionDescriptor {
                name: name.to_string(),
                topic: "projects/my-project/topics/events".to_string(),
                ack_deadline_seconds: None,
            })
        });
        Arc::new(probe)
    }

    fn unused_probe() -> Arc<MockSubscriptionProbe> {
        let mut probe = MockSubscriptionProbe::new();
        probe.expect_describe().times(0);
        Arc::new(probe)
    }

    async fn ready_connector() -> PubSubSourceConnector {
        let mut connector = connector().with_probe(found_probe());
        connector.start(minimal_props()).await.unwrap();
        connector
    }

    /// Emulator stand-in that refuses any request carrying credentials
    async fn emulator_describe(
        Path((project, subscription)): Path<(String, String)>,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        if headers.contains_key("authorization") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        Json(serde_json::json!({
            "name": format!("projects/{}/subscriptions/{}", project, subscription),
            "topic": format!("projects/{}/topics/events", project),
        }))
        .into_response()
    }

    async fn fake_emulator() -> String {
        let app = Router::new().route(
            "/v1/projects/{project}/subscriptions/{subscription}",
            get(emulator_describe),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    #[tokio::test]
    async fn test_start_then_fan_out() {
        let connector = ready_connector().await;
        assert_eq!(connector.state(), LifecycleState::Ready);

        let stored = connector.config().unwrap().clone();
        for n in [0, 1, 4] {
            let tasks = connector.task_configs(n).unwrap();
            assert_eq!(tasks.len(), n);
            assert!(tasks.iter().all(|task| *task == stored));
        }
    }

    #[tokio::test]
    async fn test_snapshots_are_independent() {
        let connector = ready_connector().await;

        let mut tasks = connector.task_configs(3).unwrap();
        tasks[0].destination_topic = "mutated".to_string();

        assert_eq!(tasks[1].destination_topic, "events");
        assert_eq!(connector.config().unwrap().destination_topic, "events");
        assert_eq!(connector.task_configs(1).unwrap()[0].destination_topic, "events");
    }

    #[tokio::test]
    async fn test_missing_subscription_blocks_workers() {
        let mut probe = MockSubscriptionProbe::new();
        probe
            .expect_describe()
            .times(1)
            .returning(|name, _| Err(ProbeError::NotFound(name.to_string())));

        let mut connector = connector().with_probe(Arc::new(probe));
        let err = connector.start(minimal_props()).await.unwrap_err();

        match &err {
            ConnectorError::SubscriptionUnreachable {
                project,
                subscription,
                ..
            } => {
                assert_eq!(project, "my-project");
                assert_eq!(subscription, "my-subscription");
            }
            other => panic!("expected SubscriptionUnreachable, got {:?}", other),
        }
        assert_eq!(connector.state(), LifecycleState::Failed);
        assert!(connector.config().is_none());
        assert!(matches!(
            connector.task_configs(2),
            Err(ConnectorError::IllegalState { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_never_probes() {
        let mut connector = connector().with_probe(unused_probe());

        let props = minimal_props().with(CPS_MAX_BATCH_SIZE_CONFIG, "0");
        let err = connector.start(props).await.unwrap_err();

        assert!(err.is_config_error());
        assert_eq!(err.violations()[0].key, CPS_MAX_BATCH_SIZE_CONFIG);
        assert_eq!(connector.state(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_unreadable_credentials_never_probe() {
        let mut connector = connector().with_probe(unused_probe());

        let props = minimal_props().with(GCP_CREDENTIALS_FILE_PATH_CONFIG, "/nonexistent/sa.json");
        let err = connector.start(props).await.unwrap_err();

        assert!(matches!(err, ConnectorError::CredentialLoad { .. }));
        assert_eq!(connector.state(), LifecycleState::Failed);
    }

    #[tokio::test]
    async fn test_start_with_service_account_file() {
        let file = credentials_file(&service_account_json("https://oauth2.example/token"));

        // The mock probe never exchanges the assertion, so the token URI is never contacted
        let mut connector = connector().with_probe(found_probe());
        let props =
            minimal_props().with(GCP_CREDENTIALS_FILE_PATH_CONFIG, file.path().to_str().unwrap());
        connector.start(props).await.unwrap();

        assert_eq!(connector.state(), LifecycleState::Ready);
        assert!(connector.config().unwrap().credentials_path.is_some());
    }

    #[tokio::test]
    async fn test_emulator_ignores_user_application_default_credentials() {
        let host = fake_emulator().await;
        let adc = credentials_file(&authorized_user_json());
        let adc_path = adc.path().to_str().unwrap().to_string();

        let mut connector = PubSubSourceConnector::new().with_env(env_vars(&[
            (PUBSUB_EMULATOR_HOST, host.as_str()),
            (GOOGLE_APPLICATION_CREDENTIALS, adc_path.as_str()),
        ]));
        connector.start(minimal_props()).await.unwrap();

        assert_eq!(connector.state(), LifecycleState::Ready);
        assert_eq!(connector.task_configs(2).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_emulator_ignores_missing_application_default_credentials() {
        let host = fake_emulator().await;

        let mut connector = PubSubSourceConnector::new().with_env(env_vars(&[
            (PUBSUB_EMULATOR_HOST, host.as_str()),
            (GOOGLE_APPLICATION_CREDENTIALS, "/nonexistent/adc.json"),
        ]));
        connector.start(minimal_props()).await.unwrap();

        assert_eq!(connector.state(), LifecycleState::Ready);
    }

    #[tokio::test]
    async fn test_emulator_still_loads_configured_credentials() {
        let host = fake_emulator().await;

        let mut connector = PubSubSourceConnector::new()
            .with_env(env_vars(&[(PUBSUB_EMULATOR_HOST, host.as_str())]));
        let props = minimal_props().with(GCP_CREDENTIALS_FILE_PATH_CONFIG, "/nonexistent/sa.json");
        let err = connector.start(props).await.unwrap_err();

        assert!(matches!(err, ConnectorError::CredentialLoad { .. }));
    }

    #[tokio::test]
    async fn test_user_application_default_credentials_run_anonymously() {
        let adc = credentials_file(&authorized_user_json());
        let adc_path = adc.path().to_str().unwrap().to_string();

        let mut probe = MockSubscriptionProbe::new();
        probe
            .expect_describe()
            .withf(|_, credentials| matches!(credentials, Credentials::Anonymous))
            .times(1)
            .returning(|name, _| {
                Ok(SubscriptionDescriptor {
                    name: name.to_string(),
                    topic: String::new(),
                    ack_deadline_seconds: None,
                })
            });

        let mut connector = PubSubSourceConnector::new()
            .with_env(env_vars(&[(GOOGLE_APPLICATION_CREDENTIALS, adc_path.as_str())]))
            .with_probe(Arc::new(probe));
        connector.start(minimal_props()).await.unwrap();

        assert_eq!(connector.state(), LifecycleState::Ready);
    }

    #[tokio::test]
    async fn test_service_account_application_default_credentials() {
        let adc = credentials_file(&service_account_json("https://oauth2.example/token"));
        let adc_path = adc.path().to_str().unwrap().to_string();

        let mut probe = MockSubscriptionProbe::new();
        probe
            .expect_describe()
            .withf(|_, credentials| matches!(credentials, Credentials::ServiceAccount(_)))
            .times(1)
            .returning(|name, _| {
                Ok(SubscriptionDescriptor {
                    name: name.to_string(),
                    topic: String::new(),
                    ack_deadline_seconds: None,
                })
            });

        let mut connector = PubSubSourceConnector::new()
            .with_env(env_vars(&[(GOOGLE_APPLICATION_CREDENTIALS, adc_path.as_str())]))
            .with_probe(Arc::new(probe));
        connector.start(minimal_props()).await.unwrap();

        assert_eq!(connector.state(), LifecycleState::Ready);
    }

    #[tokio::test]
    async fn test_lifecycle_misuse() {
        let connector = connector().with_probe(unused_probe());
        assert!(matches!(
            connector.task_configs(1),
            Err(ConnectorError::IllegalState { .. })
        ));

        let mut connector = ready_connector().await;
        let err = connector.start(minimal_props()).await.unwrap_err();
        assert!(matches!(err, ConnectorError::IllegalState { .. }));
        assert_eq!(connector.state(), LifecycleState::Ready);

        connector.stop();
        assert_eq!(connector.state(), LifecycleState::Stopped);
        assert!(connector.task_configs(1).is_err());

        connector.stop();
        assert_eq!(connector.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_version_and_schema() {
        let connector = PubSubSourceConnector::default();
        assert_eq!(connector.version(), env!("CARGO_PKG_VERSION"));
        assert!(connector.config_def().key(config::CPS_SUBSCRIPTION_CONFIG).is_some());
        assert_eq!(connector.state(), LifecycleState::Unstarted);
    }
}
