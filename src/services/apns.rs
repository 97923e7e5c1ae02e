use crate::config::ApnsSettings;
use crate::models::{token_prefix, DeliveryStatus, PushMessage, TokenOutcome};
use crate::services::apns_token::{CredentialSigner, SigningError};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const PRODUCTION_ENDPOINT: &str = "https://api.push.apple.com";
pub const SANDBOX_ENDPOINT: &str = "https://api.sandbox.push.apple.com";

/// Errors that can occur when talking to the per-device push gateway
#[derive(Debug, Error)]
pub enum ApnsError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Credential error: {0}")]
    Signing(#[from] SigningError),

    #[error("Failed to read private key: {0}")]
    KeyFile(#[from] std::io::Error),

    #[error("APNs is not configured")]
    NotConfigured,
}

#[derive(Debug, Serialize)]
struct ApnsPayload<'a> {
    aps: Aps<'a>,
    #[serde(flatten)]
    data: &'a std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct Aps<'a> {
    alert: Alert<'a>,
    sound: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'a str>,
    #[serde(rename = "thread-id", skip_serializing_if = "Option::is_none")]
    thread_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Alert<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    reason: String,
}

/// Gateway answer for one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApnsResponse {
    pub success: bool,
    pub status_code: u16,
    pub reason: Option<String>,
}

impl ApnsResponse {
    pub fn into_outcome(self, token: &str) -> TokenOutcome {
        let status = if self.success {
            DeliveryStatus::Sent
        } else {
            let reason = match (self.reason, self.status_code) {
                (Some(reason), _) => reason,
                // 410 means the token is no longer active for the topic
                (None, 410) => "Unregistered".to_string(),
                (None, status_code) => format!("HTTP {}", status_code),
            };
            classify_reason(&reason)
        };
        TokenOutcome::new(token, status)
    }
}

/// Reasons meaning the device token will never work again
pub fn classify_reason(reason: &str) -> DeliveryStatus {
    match reason {
        "BadDeviceToken" | "Unregistered" | "ExpiredToken" => {
            DeliveryStatus::Permanent(reason.to_string())
        }
        _ => DeliveryStatus::Transient(reason.to_string()),
    }
}

/// Per-device push gateway client (Apple-class devices)
///
/// Every request carries the cached ES256 bearer credential. The endpoint is
/// fixed at construction. Without a signer the client is disabled.
pub struct ApnsClient {
    base_url: String,
    topic: String,
    signer: Option<CredentialSigner>,
    client: Client,
}

impl ApnsClient {
    pub fn new(
        base_url: String,
        topic: String,
        signer: Option<CredentialSigner>,
        timeout: Duration,
    ) -> Result<Self, ApnsError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(600))
            .http2_keep_alive_interval(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            topic,
            signer,
            client,
        })
    }

    /// Build the client from settings
    ///
    /// Missing identifiers or key disable the client; a key that is present
    /// but unparseable is an error.
    pub fn from_settings(settings: &ApnsSettings) -> Result<Self, ApnsError> {
        let base_url = settings.endpoint.clone().unwrap_or_else(|| {
            if settings.production {
                PRODUCTION_ENDPOINT.to_string()
            } else {
                SANDBOX_ENDPOINT.to_string()
            }
        });
        let timeout = Duration::from_secs(settings.timeout_secs);

        let private_key = match (&settings.private_key, &settings.private_key_path) {
            (Some(content), _) if !content.trim().is_empty() => Some(content.clone()),
            (_, Some(path)) if !path.trim().is_empty() => Some(std::fs::read_to_string(path)?),
            _ => None,
        };

        let configured = (
            settings.team_id.as_deref().filter(|v| !v.is_empty()),
            settings.key_id.as_deref().filter(|v| !v.is_empty()),
            settings.bundle_id.as_deref().filter(|v| !v.is_empty()),
            private_key,
        );

        match configured {
            (Some(team_id), Some(key_id), Some(bundle_id), Some(key)) => {
                let signer = CredentialSigner::new(
                    team_id,
                    key_id,
                    &key,
                    chrono::Duration::seconds(settings.refresh_after_secs as i64),
                )?;

                tracing::info!(
                    "APNs client configured (endpoint: {}, key_id: {}, team_id: {})",
                    base_url,
                    key_id,
                    team_id
                );

                Self::new(base_url, bundle_id.to_string(), Some(signer), timeout)
            }
            _ => {
                tracing::info!("APNs credentials not configured - Apple notifications disabled");
                Self::new(base_url, String::new(), None, timeout)
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.signer.is_some()
    }

    pub fn signer(&self) -> Option<&CredentialSigner> {
        self.signer.as_ref()
    }

    /// Send one alert to one device
    pub async fn send(
        &self,
        token: &str,
        message: &PushMessage,
    ) -> Result<ApnsResponse, ApnsError> {
        let signer = self.signer.as_ref().ok_or(ApnsError::NotConfigured)?;

        let bearer = signer.bearer().await?;

        let payload = ApnsPayload {
            aps: Aps {
                alert: Alert {
                    title: &message.title,
                    body: &message.body,
                },
                sound: "default",
                category: message.category.as_deref(),
                thread_id: message.thread_id.as_deref(),
            },
            data: &message.data,
        };

        let url = format!("{}/3/device/{}", self.base_url, token);

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("bearer {}", bearer))
            .header("apns-topic", &self.topic)
            .header("apns-push-type", "alert")
            .header("apns-priority", "10")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::trace!("APNs accepted notification for {}", token_prefix(token));
            return Ok(ApnsResponse {
                success: true,
                status_code: status.as_u16(),
                reason: None,
            });
        }

        let reason = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.reason)
            .ok();

        // Provider credential rejected: sign a fresh one for the next request
        if status == StatusCode::FORBIDDEN
            && matches!(
                reason.as_deref(),
                Some("ExpiredProviderToken") | Some("InvalidProviderToken")
            )
        {
            signer.invalidate().await;
        }

        Ok(ApnsResponse {
            success: false,
            status_code: status.as_u16(),
            reason,
        })
    }

    /// Send and classify, folding the disabled and network-error paths into an outcome
    pub async fn deliver(
        &self,
        token: &str,
        message: &PushMessage,
    ) -> (TokenOutcome, Option<ApnsError>) {
        if !self.is_enabled() {
            return (TokenOutcome::new(token, DeliveryStatus::Skipped), None);
        }

        match self.send(token, message).await {
            Ok(response) => (response.into_outcome(token), None),
            Err(e) => {
                tracing::warn!("APNs send to {} failed: {}", token_prefix(token), e);
                let status = DeliveryStatus::Transient(e.to_string());
                (TokenOutcome::new(token, status), Some(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::apns_token::tests::TEST_PRIVATE_KEY;
    use mockito::Matcher;
    use std::collections::BTreeMap;

    fn message() -> PushMessage {
        PushMessage {
            title: "New listing in Haarlem".to_string(),
            body: "Studio - 199000".to_string(),
            data: BTreeMap::from([("listingId".to_string(), "l-7".to_string())]),
            category: Some("NEW_LISTING".to_string()),
            thread_id: Some("listings".to_string()),
        }
    }

    fn enabled_client(base_url: String) -> ApnsClient {
        let signer = CredentialSigner::new(
            "TEAM123456",
            "KEY1234567",
            TEST_PRIVATE_KEY,
            chrono::Duration::minutes(50),
        )
        .unwrap();
        let topic = "com.example.listings".to_string();
        ApnsClient::new(base_url, topic, Some(signer), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_classify_reasons() {
        assert!(matches!(classify_reason("BadDeviceToken"), DeliveryStatus::Permanent(_)));
        assert!(matches!(classify_reason("Unregistered"), DeliveryStatus::Permanent(_)));
        assert!(matches!(classify_reason("ExpiredToken"), DeliveryStatus::Permanent(_)));
        assert!(matches!(classify_reason("TooManyRequests"), DeliveryStatus::Transient(_)));
        assert!(matches!(classify_reason("InternalServerError"), DeliveryStatus::Transient(_)));
    }

    #[test]
    fn test_unconfigured_settings_disable_client() {
        let settings = ApnsSettings {
            team_id: Some("TEAM".to_string()),
            key_id: None,
            ..Default::default()
        };

        let client = ApnsClient::from_settings(&settings).unwrap();
        assert!(!client.is_enabled());
        assert_eq!(client.base_url, SANDBOX_ENDPOINT);
    }

    #[test]
    fn test_bad_key_is_a_configuration_error() {
        let settings = ApnsSettings {
            team_id: Some("TEAM".to_string()),
            key_id: Some("KEY".to_string()),
            bundle_id: Some("com.example".to_string()),
            private_key: Some("definitely-not-base64!".to_string()),
            production: true,
            ..Default::default()
        };

        assert!(ApnsClient::from_settings(&settings).is_err());
    }

    #[tokio::test]
    async fn test_send_sets_gateway_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/3/device/device-abc")
            .match_header(
                "authorization",
                Matcher::Regex(r"^bearer [\w-]+\.[\w-]+\.[\w-]+$".to_string()),
            )
            .match_header("apns-topic", "com.example.listings")
            .match_header("apns-push-type", "alert")
            .match_header("apns-priority", "10")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "aps": {
                    "alert": { "title": "New listing in Haarlem", "body": "Studio - 199000" },
                    "category": "NEW_LISTING",
                    "thread-id": "listings"
                }
            })))
            .with_status(200)
            .create_async()
            .await;

        let client = enabled_client(server.url());
        let response = client.send("device-abc", &message()).await.unwrap();

        mock.assert_async().await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_error_reason_classified() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/3/device/gone")
            .with_status(410)
            .with_body(r#"{"reason": "Unregistered", "timestamp": 1700000000000}"#)
            .create_async()
            .await;
        server
            .mock("POST", "/3/device/busy")
            .with_status(429)
            .with_body(r#"{"reason": "TooManyRequests"}"#)
            .create_async()
            .await;

        let client = enabled_client(server.url());

        let (gone, _) = client.deliver("gone", &message()).await;
        let (busy, _) = client.deliver("busy", &message()).await;

        assert_eq!(gone.status, DeliveryStatus::Permanent("Unregistered".to_string()));
        assert_eq!(busy.status, DeliveryStatus::Transient("TooManyRequests".to_string()));
    }

    #[test]
    fn test_gone_without_reason_is_permanent() {
        let gone = ApnsResponse {
            success: false,
            status_code: 410,
            reason: None,
        };
        let failing = ApnsResponse {
            success: false,
            status_code: 500,
            reason: None,
        };

        assert_eq!(
            gone.into_outcome("gone").status,
            DeliveryStatus::Permanent("Unregistered".to_string())
        );
        assert_eq!(
            failing.into_outcome("failing").status,
            DeliveryStatus::Transient("HTTP 500".to_string())
        );
    }

    #[tokio::test]
    async fn test_unparseable_gone_body_prunes_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/3/device/gone")
            .with_status(410)
            .with_body("gone")
            .create_async()
            .await;

        let client = enabled_client(server.url());
        let (gone, error) = client.deliver("gone", &message()).await;

        assert!(gone.is_permanent());
        assert!(error.is_none());
    }

    #[tokio::test]
    async fn test_rejected_provider_token_is_resigned() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/3/device/dev")
            .with_status(403)
            .with_body(r#"{"reason": "ExpiredProviderToken"}"#)
            .expect(2)
            .create_async()
            .await;

        let client = enabled_client(server.url());
        client.send("dev", &message()).await.unwrap();
        client.send("dev", &message()).await.unwrap();

        assert_eq!(client.signer().map(|s| s.signings()), Some(2));
    }

    #[tokio::test]
    async fn test_disabled_client_skips() {
        let endpoint = SANDBOX_ENDPOINT.to_string();
        let timeout = Duration::from_secs(1);
        let client = ApnsClient::new(endpoint, String::new(), None, timeout).unwrap();
        let (outcome, error) = client.deliver("tok", &message()).await;

        assert_eq!(outcome.status, DeliveryStatus::Skipped);
        assert!(error.is_none());
    }
}
