//! Microsoft Graph directory client.
//!
//! Uses the OAuth2 client-credentials flow and caches the access token until
//! shortly before it expires.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::DirectoryResolver;
use crate::config::GraphConfig;

/// Refresh this long before the reported expiry.
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    mail: Option<String>,
    user_principal_name: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct GraphDirectory {
    config: GraphConfig,
    http: Client,
    token: Mutex<Option<CachedToken>>,
}

impl GraphDirectory {
    pub fn new(config: GraphConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("failed to build graph HTTP client")?;
        Ok(Self {
            config,
            http,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(ref cached) = *guard {
            if cached.expires_at > Instant::now() {
                return Ok(cached.value.clone());
            }
        }

        let resp = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", "https://graph.microsoft.com/.default"),
            ])
            .send()
            .await
            .context("graph token request failed")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("graph token endpoint returned status={}", status);
        }

        let token: TokenResponse = resp.json().await.context("invalid graph token response")?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_SLACK);
        *guard = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        tracing::debug!(expires_in = token.expires_in, "refreshed graph access token");
        Ok(token.access_token)
    }
}

#[async_trait]
impl DirectoryResolver for GraphDirectory {
    async fn address_for_upn(&self, upn: &str) -> anyhow::Result<String> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/users/{}?$select=mail,userPrincipalName",
            self.config.api_url.trim_end_matches('/'),
            urlencoding::encode(upn)
        );

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("graph lookup for {} failed", upn))?;

        match resp.status() {
            StatusCode::NOT_FOUND => anyhow::bail!("directory has no user {}", upn),
            s if !s.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                anyhow::bail!("graph returned error: status={}, body={}", s, body);
            }
            _ => {}
        }

        let user: GraphUser = resp.json().await.context("invalid graph user response")?;
        match user.mail.filter(|m| !m.is_empty()) {
            Some(mail) => Ok(mail),
            None => anyhow::bail!(
                "directory user {} has no mail address",
                user.user_principal_name.as_deref().unwrap_or(upn)
            ),
        }
    }
}
