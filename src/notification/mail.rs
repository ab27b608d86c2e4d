use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::MailProvider;
use crate::config::MailConfig;
use crate::models::mail::{MailMessage, MailReceipt};

/// Delivers pre-rendered mail through an HTTP mail relay.
#[derive(Clone)]
pub struct HttpMailProvider {
    client: reqwest::Client,
    config: MailConfig,
}

impl HttpMailProvider {
    pub fn new(config: MailConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!("joinflow-mail/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build mail HTTP client")?;
        Ok(Self { client, config })
    }
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
    categories: &'a [String],
    correlation_id: &'a str,
}

#[derive(Deserialize)]
struct RelayResponse {
    id: Option<String>,
}

#[async_trait]
impl MailProvider for HttpMailProvider {
    async fn send_mail(&self, message: &MailMessage) -> anyhow::Result<MailReceipt> {
        if message.to.is_empty() {
            anyhow::bail!("mail has no recipients");
        }

        let body = RelayMessage {
            from: &self.config.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.content,
            categories: &message.category,
            correlation_id: &message.correlation_id,
        };

        let mut req = self
            .client
            .post(&self.config.url)
            .header("x-correlation-id", &message.correlation_id)
            .json(&body);
        if let Some(ref key) = self.config.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.context("failed to send mail")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("mail relay returned error: status={}, body={}", status, body);
        }

        let receipt: RelayResponse = resp.json().await.unwrap_or(RelayResponse { id: None });
        let id = receipt.id.unwrap_or_else(|| message.correlation_id.clone());
        tracing::info!(
            receipt = %id,
            recipients = message.to.len(),
            correlation_id = %message.correlation_id,
            "mail accepted by relay"
        );
        Ok(MailReceipt { id })
    }
}
