//! Startup check that the configured subscription exists and is reachable.
//!
//! The check is a single descriptor fetch bounded by a deadline. No messages are pulled.

use crate::config::subscription_path;
use crate::credentials::{Credentials, CredentialsError};
use async_trait::async_trait;
use pubsub_connect_core::{ConnectorError, ConnectorResult};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const PUBSUB_EMULATOR_HOST: &str = "PUBSUB_EMULATOR_HOST";

/// Emulator `host:port` from `PUBSUB_EMULATOR_HOST`, read through `lookup`
///
/// When set, the emulator replaces the configured endpoint and no credentials are used.
pub fn emulator_host(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    lookup(PUBSUB_EMULATOR_HOST).filter(|host| !host.is_empty())
}

/// Subscription metadata returned by the Pub/Sub admin API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDescriptor {
    pub name: String,
    #[serde(default)]
    pub topic: String,
    pub ack_deadline_seconds: Option<i32>,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("subscription {0} was not found")]
    NotFound(String),

    #[error("permission denied on subscription {0}")]
    PermissionDenied(String),

    #[error("authentication failed: {0}")]
    Auth(#[from] CredentialsError),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Fetches a subscription descriptor by its fully-qualified name
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubscriptionProbe: Send + Sync {
    async fn describe(
        &self,
        subscription_name: &str,
        credentials: &Credentials,
    ) -> Result<SubscriptionDescriptor, ProbeError>;
}

/// Describes subscriptions through the Pub/Sub REST API
#[derive(Debug, Clone)]
pub struct RestSubscriptionProbe {
    endpoint: String,
    client: reqwest::Client,
    authenticate: bool,
}

impl RestSubscriptionProbe {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            authenticate: true,
        }
    }

    /// Plain-HTTP probe against a local emulator; credentials are never sent
    pub fn emulator(host: &str) -> Self {
        Self {
            authenticate: false,
            ..Self::new(format!("http://{}", host))
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SubscriptionProbe for RestSubscriptionProbe {
    async fn describe(
        &self,
        subscription_name: &str,
        credentials: &Credentials,
    ) -> Result<SubscriptionDescriptor, ProbeError> {
        let url = format!("{}/v1/{}", self.endpoint, subscription_name);
        let mut request = self.client.get(&url);

        if self.authenticate {
            if let Some(token) = credentials.access_token(&self.client).await? {
                request = request.bearer_auth(token);
            }
        }

        debug!(url = %url, "Describing subscription");
        let response = request.send().await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => Ok(response.json().await?),
            404 => Err(ProbeError::NotFound(subscription_name.to_string())),
            403 => Err(ProbeError::PermissionDenied(subscription_name.to_string())),
            code => Err(ProbeError::Status {
                status: code,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// Verifies the subscription before the connector is allowed to hand out work
#[derive(Clone)]
pub struct SubscriptionReadinessCheck {
    probe: Arc<dyn SubscriptionProbe>,
    deadline: Duration,
}

impl SubscriptionReadinessCheck {
    pub fn new(probe: Arc<dyn SubscriptionProbe>, deadline: Duration) -> Self {
        Self { probe, deadline }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Describe `projects/{project}/subscriptions/{subscription}` within the deadline.
    ///
    /// Every failure, including the deadline expiring, surfaces as
    /// [`ConnectorError::SubscriptionUnreachable`] carrying the underlying cause.
    pub async fn verify(
        &self,
        project: &str,
        subscription: &str,
        credentials: &Credentials,
    ) -> ConnectorResult<SubscriptionDescriptor> {
        let name = subscription_path(project, subscription);
        let started = Instant::now();

        let describe = self.probe.describe(&name, credentials);
        let outcome = match tokio::time::timeout(self.deadline, describe).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout(self.deadline)),
        };

        match outcome {
            Ok(descriptor) => {
                info!(
                    subscription = %descriptor.name,
                    topic = %descriptor.topic,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Subscription verified"
                );
                Ok(descriptor)
            }
            Err(e) => {
                warn!("Subscription {} could not be verified: {}", name, e);
                Err(ConnectorError::subscription_unreachable(project, subscription, e))
            }
        }
    }
}
