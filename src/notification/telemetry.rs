use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::errors::{AppError, ProviderKind};

/// Redacted event properties. Never carries justifications or mail addresses.
pub type TelemetryProps = BTreeMap<String, String>;

/// Fire-and-forget event sink. Implementations must not block or fail the caller.
pub trait Telemetry: Send + Sync {
    fn track_event(&self, name: &str, props: TelemetryProps);

    fn track_exception(&self, error: &AppError, props: TelemetryProps);
}

// ── Telemetry Event ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    /// `event` or `exception`.
    pub kind: &'static str,
    pub name: String,
    /// ISO-8601 timestamp of when the event occurred.
    pub timestamp: String,
    pub properties: TelemetryProps,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    /// Redacted description; the full chain stays in local logs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TelemetryEvent {
    pub fn event(name: &str, props: TelemetryProps) -> Self {
        Self {
            kind: "event",
            name: name.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            properties: props,
            error_code: None,
            provider: None,
            error: None,
        }
    }

    pub fn exception(error: &AppError, props: TelemetryProps) -> Self {
        Self {
            kind: "exception",
            name: "TeamJoinException".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            properties: props,
            error_code: Some(error.code()),
            provider: error.provider_kind(),
            error: Some(error.redacted()),
        }
    }
}

// ── Tracing Sink ─────────────────────────────────────────────

/// Writes telemetry to the log only.
#[derive(Debug, Clone, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn track_event(&self, name: &str, props: TelemetryProps) {
        info!(event = name, properties = ?props, "telemetry event");
    }

    fn track_exception(&self, error: &AppError, props: TelemetryProps) {
        tracing::error!(code = error.code(), error = %error, properties = ?props, "telemetry exception");
    }
}

// ── HMAC Signing ─────────────────────────────────────────────

/// Compute HMAC-SHA256 of `payload` using `secret`.
/// Returns lowercase hex digest (e.g. "sha256=<hex>").
fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid HMAC key: {}", e))?;
    mac.update(payload);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

// ── Webhook Sink ─────────────────────────────────────────────

/// Logs like [`TracingTelemetry`] and forwards every event to webhook URLs.
/// Supports:
/// - HMAC-SHA256 signing (X-Joinflow-Signature header)
/// - Up to 2 retries with back-off (1s → 5s)
#[derive(Clone)]
pub struct WebhookTelemetry {
    client: reqwest::Client,
    urls: Vec<String>,
    signing_secret: Option<String>,
}

impl WebhookTelemetry {
    pub fn new(urls: Vec<String>, signing_secret: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Joinflow-Telemetry/1.0")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build telemetry HTTP client: {}", e))?;
        Ok(Self {
            client,
            urls,
            signing_secret,
        })
    }

    /// Deliver one event to one URL, retrying on failure.
    pub async fn send(&self, url: &str, event: &TelemetryEvent) -> Result<()> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| anyhow::anyhow!("telemetry serialize error: {}", e))?;
        let delivery_id = uuid::Uuid::new_v4().to_string();
        let signature = match self.signing_secret {
            Some(ref s) => Some(hmac_sha256_hex(s, &payload)?),
            None => None,
        };

        let backoff_secs: &[u64] = &[0, 1, 5];

        for (attempt, &delay) in backoff_secs.iter().enumerate() {
            if delay > 0 {
                debug!(url, attempt, delay_secs = delay, event = %event.name, "retrying telemetry delivery");
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let mut req = self
                .client
                .post(url)
                .header("content-type", "application/json")
                .header("x-joinflow-delivery-id", &delivery_id)
                .header("x-joinflow-event", &event.name);

            if let Some(ref sig) = signature {
                req = req.header("x-joinflow-signature", sig.as_str());
            }

            match req.body(payload.clone()).send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url, event = %event.name, delivery_id = %delivery_id, attempt, "telemetry delivered");
                    return Ok(());
                }
                Ok(resp) => {
                    warn!(
                        url,
                        event = %event.name,
                        delivery_id = %delivery_id,
                        attempt,
                        status = %resp.status(),
                        "telemetry delivery failed (non-2xx)"
                    );
                }
                Err(e) => {
                    warn!(url, event = %event.name, delivery_id = %delivery_id, attempt, error = %e, "telemetry request error");
                }
            }
        }

        Err(anyhow::anyhow!("telemetry delivery failed after retries: {}", url))
    }

    fn dispatch(&self, event: TelemetryEvent) {
        if self.urls.is_empty() {
            return;
        }
        let sink = self.clone();
        tokio::spawn(async move {
            for url in &sink.urls {
                if let Err(e) = sink.send(url, &event).await {
                    warn!(url, error = %e, "telemetry dispatch ultimately failed");
                }
            }
        });
    }
}

impl Telemetry for WebhookTelemetry {
    fn track_event(&self, name: &str, props: TelemetryProps) {
        TracingTelemetry.track_event(name, props.clone());
        self.dispatch(TelemetryEvent::event(name, props));
    }

    fn track_exception(&self, error: &AppError, props: TelemetryProps) {
        TracingTelemetry.track_exception(error, props.clone());
        self.dispatch(TelemetryEvent::exception(error, props));
    }
}
