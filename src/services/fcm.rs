use crate::config::FcmSettings;
use crate::models::{DeliveryStatus, PushMessage, TokenOutcome};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Documented multicast ceiling of the batched gateway
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

/// Errors that can occur when talking to the batched push gateway
#[derive(Debug, Error)]
pub enum FcmError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Failed to read credential: {0}")]
    Credential(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
struct MulticastRequest<'a> {
    tokens: &'a [String],
    notification: NotificationBody<'a>,
    data: &'a BTreeMap<String, String>,
    #[serde(rename = "platformConfig")]
    platform_config: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct NotificationBody<'a> {
    title: &'a str,
    body: &'a str,
}

/// One entry of the gateway's per-token result array
#[derive(Debug, Clone, Deserialize)]
pub struct SendResult {
    pub success: bool,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MulticastResponse {
    Bare(Vec<SendResult>),
    Wrapped {
        #[serde(alias = "results")]
        responses: Vec<SendResult>,
    },
}

impl MulticastResponse {
    fn into_results(self) -> Vec<SendResult> {
        match self {
            MulticastResponse::Bare(results) => results,
            MulticastResponse::Wrapped { responses } => responses,
        }
    }
}

/// Classify a gateway error code. Only codes meaning the token is dead are permanent.
pub fn classify_error_code(code: &str) -> DeliveryStatus {
    let normalized: String = code
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase();

    match normalized.as_str() {
        "unregistered" | "invalidargument" => DeliveryStatus::Permanent(code.to_string()),
        _ => DeliveryStatus::Transient(code.to_string()),
    }
}

/// Batched push gateway client (Android-class devices)
///
/// One HTTP call carries many tokens and returns a result per token, in order.
/// Without a credential the client is disabled and every token is reported as skipped.
pub struct FcmClient {
    endpoint: String,
    credential: Option<String>,
    max_batch_size: usize,
    client: Client,
}

impl FcmClient {
    /// Create a new gateway client
    pub fn new(
        endpoint: String,
        credential: Option<String>,
        max_batch_size: usize,
        timeout: Duration,
    ) -> Result<Self, FcmError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        let credential = credential
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(Self {
            endpoint,
            credential,
            max_batch_size: max_batch_size.max(1),
            client,
        })
    }

    /// Create a client from settings, reading the credential file if one is configured
    pub fn from_settings(settings: &FcmSettings) -> Result<Self, FcmError> {
        let credential = match (&settings.credential, &settings.credential_path) {
            (Some(content), _) if !content.trim().is_empty() => Some(content.clone()),
            (_, Some(path)) if !path.trim().is_empty() => Some(std::fs::read_to_string(path)?),
            _ => None,
        };

        if credential.is_none() {
            tracing::info!("FCM credential not configured - Android notifications disabled");
        }

        Self::new(
            settings.endpoint.clone(),
            credential,
            settings.max_batch_size,
            Duration::from_secs(settings.timeout_secs),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.credential.is_some()
    }

    /// Largest token list a single `send_batch` call may carry
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Send one multicast call for `tokens`
    ///
    /// Callers chunk to `max_batch_size()`. The returned outcomes line up with `tokens`.
    pub async fn send_batch(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<Vec<TokenOutcome>, FcmError> {
        let credential = match &self.credential {
            Some(credential) => credential,
            None => {
                return Ok(tokens
                    .iter()
                    .map(|t| TokenOutcome::new(t.as_str(), DeliveryStatus::Skipped))
                    .collect())
            }
        };

        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        if tokens.len() > self.max_batch_size {
            return Err(FcmError::ApiError(format!(
                "batch of {} tokens exceeds limit of {}",
                tokens.len(),
                self.max_batch_size
            )));
        }

        let request = MulticastRequest {
            tokens,
            notification: NotificationBody {
                title: &message.title,
                body: &message.body,
            },
            data: &message.data,
            platform_config: serde_json::json!({ "android": { "priority": "high" } }),
        };

        tracing::debug!("Sending multicast to {} Android devices", tokens.len());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
            return Err(FcmError::ApiError(format!("{} - {}", status, body)));
        }

        let results = response
            .json::<MulticastResponse>()
            .await
            .map_err(|e| FcmError::InvalidResponse(format!("Failed to parse results: {}", e)))?
            .into_results();

        if results.len() != tokens.len() {
            return Err(FcmError::InvalidResponse(format!(
                "expected {} results, got {}",
                tokens.len(),
                results.len()
            )));
        }

        let outcomes = tokens
            .iter()
            .zip(results)
            .map(|(token, result)| {
                let status = if result.success {
                    DeliveryStatus::Sent
                } else {
                    classify_error_code(result.error_code.as_deref().unwrap_or("Unknown"))
                };
                TokenOutcome::new(token.as_str(), status)
            })
            .collect();

        Ok(outcomes)
    }
}
