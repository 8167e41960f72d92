//! Push delivery through Firebase Cloud Messaging.

use crate::config::FcmConfig;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::observability::TracedRequestExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider not enabled: {0}")]
    NotEnabled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),

    /// The token is no longer registered or is malformed; callers prune it.
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Authentication error: {0}")]
    Authentication(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub device_token: String,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Deliver to one device; returns the provider's message id.
    async fn send(&self, push: &PushMessage) -> Result<String, ProviderError>;
    fn is_enabled(&self) -> bool;
}

/// Fields of a Google service account key the token exchange needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

enum Credentials {
    ServiceAccount {
        key: ServiceAccountKey,
        encoding_key: EncodingKey,
    },
    Static(Secret<String>),
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Serialize)]
struct FcmRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Debug, Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    notification: FcmNotification<'a>,
    data: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct FcmErrorBody {
    error: FcmError,
}

#[derive(Debug, Deserialize)]
struct FcmError {
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct FcmErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

impl FcmError {
    /// FCM puts the precise reason in `details[].errorCode`.
    fn code(&self) -> &str {
        self.details
            .iter()
            .find_map(|d| d.error_code.as_deref())
            .unwrap_or(&self.status)
    }

    fn is_invalid_token(&self) -> bool {
        matches!(self.code(), "UNREGISTERED" | "INVALID_ARGUMENT")
    }
}

pub struct FcmProvider {
    config: FcmConfig,
    client: Client,
    credentials: Credentials,
    cached_token: AsyncMutex<Option<(String, DateTime<Utc>)>>,
}

impl FcmProvider {
    /// Build from config; the service account key must be valid JSON with
    /// an RSA private key.
    pub fn new(config: FcmConfig) -> Result<Self, ProviderError> {
        let key: ServiceAccountKey =
            serde_json::from_str(config.service_account_key.expose_secret()).map_err(|e| {
                ProviderError::Configuration(format!("Invalid FCM service account key: {}", e))
            })?;
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|e| {
            ProviderError::Configuration(format!("Invalid FCM private key: {}", e))
        })?;

        Ok(Self {
            config,
            client: Client::new(),
            credentials: Credentials::ServiceAccount { key, encoding_key },
            cached_token: AsyncMutex::new(None),
        })
    }

    /// Use a pre-minted OAuth2 access token instead of a service account.
    pub fn with_access_token(config: FcmConfig, token: Secret<String>) -> Self {
        Self {
            config,
            client: Client::new(),
            credentials: Credentials::Static(token),
            cached_token: AsyncMutex::new(None),
        }
    }

    async fn get_access_token(&self) -> Result<String, ProviderError> {
        let (key, encoding_key) = match &self.credentials {
            Credentials::Static(token) => return Ok(token.expose_secret().clone()),
            Credentials::ServiceAccount { key, encoding_key } => (key, encoding_key),
        };

        let mut cached = self.cached_token.lock().await;
        let now = Utc::now();
        if let Some((token, expires_at)) = cached.as_ref() {
            if *expires_at > now + TimeDelta::seconds(60) {
                return Ok(token.clone());
            }
        }

        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: FCM_SCOPE,
            aud: &key.token_uri,
            iat: now.timestamp(),
            exp: (now + TimeDelta::hours(1)).timestamp(),
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, encoding_key)
            .map_err(|e| ProviderError::Authentication(format!("Failed to sign assertion: {}", e)))?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Connection(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Authentication(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            ProviderError::Authentication(format!("Failed to parse token response: {}", e))
        })?;

        *cached = Some((
            token.access_token.clone(),
            now + TimeDelta::seconds(token.expires_in),
        ));
        Ok(token.access_token)
    }
}

#[async_trait]
impl PushProvider for FcmProvider {
    async fn send(&self, push: &PushMessage) -> Result<String, ProviderError> {
        if !self.config.enabled {
            return Err(ProviderError::NotEnabled(
                "FCM push provider is not enabled".to_string(),
            ));
        }

        if self.config.project_id.is_empty() {
            return Err(ProviderError::Configuration(
                "FCM project_id is not configured".to_string(),
            ));
        }

        let access_token = self.get_access_token().await?;

        let request = FcmRequest {
            message: FcmMessage {
                token: &push.device_token,
                notification: FcmNotification {
                    title: &push.title,
                    body: &push.body,
                },
                data: &push.data,
            },
        };

        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.config.api_base_url, self.config.project_id
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&access_token)
            .with_trace_context()
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(format!("Failed to connect to FCM: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(FcmErrorBody { error }) = serde_json::from_str::<FcmErrorBody>(&body) {
                if error.is_invalid_token() {
                    return Err(ProviderError::InvalidRecipient(format!(
                        "{}: {}",
                        error.code(),
                        error.message
                    )));
                }
            }
            return Err(ProviderError::SendFailed(format!(
                "FCM API returned error status {}: {}",
                status, body
            )));
        }

        let fcm_response: FcmResponse = response.json().await.map_err(|e| {
            ProviderError::SendFailed(format!("Failed to parse FCM response: {}", e))
        })?;

        tracing::debug!(message = %fcm_response.name, "Push notification sent via FCM");
        Ok(fcm_response.name)
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// Logs instead of delivering; used when FCM is switched off.
pub struct DisabledPushProvider;

#[async_trait]
impl PushProvider for DisabledPushProvider {
    async fn send(&self, _push: &PushMessage) -> Result<String, ProviderError> {
        Err(ProviderError::NotEnabled(
            "Push delivery is disabled".to_string(),
        ))
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Mock push provider for testing. Records every message; tokens marked
/// invalid are rejected the way FCM rejects unregistered devices.
#[derive(Default)]
pub struct MockPushProvider {
    send_count: AtomicU64,
    sent: Mutex<Vec<PushMessage>>,
    invalid_tokens: Mutex<HashSet<String>>,
}

impl MockPushProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_invalid(&self, token: &str) {
        if let Ok(mut invalid) = self.invalid_tokens.lock() {
            invalid.insert(token.to_string());
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PushProvider for MockPushProvider {
    async fn send(&self, push: &PushMessage) -> Result<String, ProviderError> {
        let invalid = self
            .invalid_tokens
            .lock()
            .map(|set| set.contains(&push.device_token))
            .unwrap_or(false);
        if invalid {
            return Err(ProviderError::InvalidRecipient(
                "UNREGISTERED: mock token".to_string(),
            ));
        }

        let count = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(push.clone());
        }

        tracing::info!(
            device_token = %push.device_token,
            title = %push.title,
            "[MOCK] Push notification would be sent"
        );

        Ok(format!("mock-push-{}", count))
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> FcmConfig {
        FcmConfig {
            enabled: true,
            project_id: "demo-project".to_string(),
            service_account_key: Secret::new(String::new()),
            api_base_url: base_url.to_string(),
        }
    }

    fn message(token: &str) -> PushMessage {
        PushMessage {
            device_token: token.to_string(),
            title: "New Booking Received".to_string(),
            body: "Deep cleaning by Asha".to_string(),
            data: BTreeMap::from([("type".to_string(), "BOOKING_CREATED".to_string())]),
        }
    }

    #[tokio::test]
    async fn sends_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/demo-project/messages:send"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/demo-project/messages/1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider =
            FcmProvider::with_access_token(config(&server.uri()), Secret::new("test-token".into()));
        let name = provider.send(&message("device-1")).await.unwrap();
        assert_eq!(name, "projects/demo-project/messages/1");
    }

    #[tokio::test]
    async fn unregistered_token_is_invalid_recipient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {
                    "code": 404,
                    "message": "Requested entity was not found.",
                    "status": "NOT_FOUND",
                    "details": [{
                        "@type": "type.googleapis.com/google.firebase.fcm.v1.FcmError",
                        "errorCode": "UNREGISTERED"
                    }]
                }
            })))
            .mount(&server)
            .await;

        let provider =
            FcmProvider::with_access_token(config(&server.uri()), Secret::new("t".into()));
        let err = provider.send(&message("stale")).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRecipient(_)));
    }

    #[tokio::test]
    async fn server_errors_are_not_token_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let provider =
            FcmProvider::with_access_token(config(&server.uri()), Secret::new("t".into()));
        let err = provider.send(&message("device-1")).await.unwrap_err();
        assert!(matches!(err, ProviderError::SendFailed(_)));
    }

    #[test]
    fn malformed_service_account_key_is_rejected() {
        let mut cfg = config("http://localhost");
        cfg.service_account_key = Secret::new("not json".into());
        assert!(matches!(
            FcmProvider::new(cfg),
            Err(ProviderError::Configuration(_))
        ));
    }
}
