//! GitHub REST API adapters: team membership and workflow issues.

pub mod issues;
pub mod org;

use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::GithubConfig;

/// Thin authenticated client shared by the GitHub adapters.
#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(config: &GithubConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("joinflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .bearer_auth(&self.token)
    }

    /// Send and return the response if it is a success or a 404.
    async fn send(&self, req: RequestBuilder, what: &str) -> anyhow::Result<Response> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("GitHub request failed: {}", what))?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("GitHub returned error for {}: status={}, body={}", what, status, body)
    }

    async fn json<T: DeserializeOwned>(resp: Response, what: &str) -> anyhow::Result<T> {
        resp.json::<T>()
            .await
            .with_context(|| format!("invalid GitHub response for {}", what))
    }
}
