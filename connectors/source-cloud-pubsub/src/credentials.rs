//! Google Cloud credentials for the subscription readiness check.
//!
//! Resolution order:
//! 1. `gcp.credentials.file.path`, which must hold a service account key
//! 2. `GOOGLE_APPLICATION_CREDENTIALS`; a file of any other type (such as a gcloud
//!    `authorized_user` file) is skipped with a warning
//! 3. anonymous (emulators, or endpoints that need no auth)
//!
//! Service-account keys are exchanged for an access token with the OAuth 2.0 JWT bearer flow:
//! an RS256 assertion signed with the account's private key is posted to its `token_uri`.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use pubsub_connect_core::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const PUBSUB_SCOPE: &str = "https://www.googleapis.com/auth/pubsub";

const SERVICE_ACCOUNT_TYPE: &str = "service_account";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Failure to obtain an access token from loaded credentials
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("failed to sign token assertion: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),

    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint rejected the assertion with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// The `type` discriminator every Google credentials file carries
#[derive(Deserialize)]
struct CredentialsFileKind {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// On-disk service account key (the subset we need)
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// A loaded service account, ready to mint access tokens
pub struct ServiceAccount {
    client_email: String,
    private_key_id: Option<String>,
    token_uri: String,
    key: EncodingKey,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    /// Signed JWT assertion issued at `now` (epoch seconds)
    fn assertion(&self, now: i64) -> Result<String, CredentialsError> {
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: PUBSUB_SCOPE,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        Ok(jsonwebtoken::encode(&header, &claims, &self.key)?)
    }

    async fn fetch_token(&self, client: &reqwest::Client) -> Result<String, CredentialsError> {
        let assertion = self.assertion(chrono::Utc::now().timestamp())?;

        debug!(token_uri = %self.token_uri, "Exchanging service account assertion");
        let response = client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialsError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }
}

/// Credentials used to authenticate the readiness check
#[derive(Debug)]
pub enum Credentials {
    Anonymous,
    ServiceAccount(ServiceAccount),
}

impl Credentials {
    /// Resolve credentials from an explicit path, then the environment, else anonymous
    pub fn resolve(path: Option<&str>) -> ConnectorResult<Self> {
        Self::resolve_with(path, |name| env::var(name).ok())
    }

    /// Like [`Credentials::resolve`], reading `GOOGLE_APPLICATION_CREDENTIALS` through `lookup`
    pub fn resolve_with(
        path: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ConnectorResult<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let Some(path) = lookup(GOOGLE_APPLICATION_CREDENTIALS).filter(|p| !p.is_empty()) else {
            debug!("No credentials configured, using anonymous access");
            return Ok(Credentials::Anonymous);
        };

        info!("Using credentials from {}", GOOGLE_APPLICATION_CREDENTIALS);
        let content = read_credentials_file(&path)?;
        match credentials_kind(&path, &content)? {
            Some(kind) if kind != SERVICE_ACCOUNT_TYPE => {
                warn!(
                    path = %path,
                    kind = %kind,
                    "Only service account credentials are supported, continuing without credentials"
                );
                Ok(Credentials::Anonymous)
            }
            _ => Self::from_json(&path, &content),
        }
    }

    /// Load a service account key file
    pub fn from_file(path: &str) -> ConnectorResult<Self> {
        let content = read_credentials_file(path)?;
        Self::from_json(path, &content)
    }

    /// Parse service account JSON; `origin` names the source in errors
    pub fn from_json(origin: &str, content: &str) -> ConnectorResult<Self> {
        if let Some(kind) = credentials_kind(origin, content)? {
            if kind != SERVICE_ACCOUNT_TYPE {
                return Err(ConnectorError::credential_load(
                    origin,
                    format!("unsupported credentials type '{}'", kind),
                ));
            }
        }

        let key: ServiceAccountKey =
            serde_json::from_str(content).map_err(|e| ConnectorError::credential_load(origin, e))?;

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            ConnectorError::credential_load(origin, format!("invalid private key: {}", e))
        })?;

        info!("Loaded service account credentials for {}", key.client_email);
        Ok(Credentials::ServiceAccount(ServiceAccount {
            client_email: key.client_email,
            private_key_id: key.private_key_id,
            token_uri: key.token_uri,
            key: encoding_key,
        }))
    }

    /// Bearer token for the request, `None` for anonymous access
    pub async fn access_token(
        &self,
        client: &reqwest::Client,
    ) -> Result<Option<String>, CredentialsError> {
        match self {
            Credentials::Anonymous => Ok(None),
            Credentials::ServiceAccount(account) => account.fetch_token(client).await.map(Some),
        }
    }
}

fn read_credentials_file(path: &str) -> ConnectorResult<String> {
    std::fs::read_to_string(path).map_err(|e| ConnectorError::credential_load(path, e))
}

fn credentials_kind(origin: &str, content: &str) -> ConnectorResult<Option<String>> {
    let file: CredentialsFileKind =
        serde_json::from_str(content).map_err(|e| ConnectorError::credential_load(origin, e))?;
    Ok(file.kind)
}
