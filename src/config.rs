use std::collections::{BTreeSet, HashMap};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::team::{OrgRef, Repo};

/// Kind of approval channel an org can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ApprovalProviderKind {
    #[serde(rename = "mail")]
    Mail,
    #[serde(rename = "issueTracker")]
    IssueTracker,
}

/// Per-org settings loaded from the orgs file.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgSettings {
    pub name: String,
    pub id: i64,
    /// The broad-access team; joining it bypasses approval.
    pub all_members_team_id: Option<i64>,
    /// `owner/name` of the repository that receives approval issues.
    #[serde(default)]
    pub workflow_repository: Option<String>,
    #[serde(default)]
    pub approval_providers: BTreeSet<ApprovalProviderKind>,
}

impl OrgSettings {
    pub fn org_ref(&self) -> OrgRef {
        OrgRef {
            id: self.id,
            name: self.name.clone(),
        }
    }

    pub fn workflow_repo(&self) -> Option<Repo> {
        self.workflow_repository.as_deref().and_then(Repo::parse)
    }
}

#[derive(Debug, Deserialize)]
struct OrgsFile {
    orgs: Vec<OrgSettings>,
}

#[derive(Debug, Clone)]
pub struct GithubConfig {
    pub api_url: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub api_url: String,
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Shared key the portal front end presents on every API call.
    pub service_key: Option<String>,
    /// Host used to build review/action links.
    pub site_host: String,
    /// Build action links with `http` instead of `https` (local development).
    pub allow_insecure_local: bool,
    /// Embedded in rendered mail content.
    pub version_tag: String,
    pub orgs: HashMap<String, OrgSettings>,
    pub github: Option<GithubConfig>,
    pub mail: Option<MailConfig>,
    pub graph: Option<GraphConfig>,
    pub telemetry_webhook_urls: Vec<String>,
    pub telemetry_webhook_secret: Option<String>,
}

impl Config {
    /// Case-insensitive org lookup by name.
    pub fn org(&self, name: &str) -> Option<&OrgSettings> {
        self.orgs.get(&name.to_lowercase())
    }

    pub fn site_url(&self) -> String {
        let scheme = if self.allow_insecure_local { "http" } else { "https" };
        format!("{}://{}", scheme, self.site_host.trim_end_matches('/'))
    }
}

pub fn parse_orgs(yaml: &str) -> anyhow::Result<HashMap<String, OrgSettings>> {
    let file: OrgsFile = serde_yaml::from_str(yaml).context("invalid orgs file")?;
    let mut orgs = HashMap::new();
    for org in file.orgs {
        if let Some(ref repo) = org.workflow_repository {
            if Repo::parse(repo).is_none() {
                anyhow::bail!(
                    "org '{}': workflow_repository '{}' is not in owner/name form",
                    org.name,
                    repo
                );
            }
        }
        let key = org.name.to_lowercase();
        if orgs.insert(key, org).is_some() {
            anyhow::bail!("duplicate org entry in orgs file");
        }
    }
    Ok(orgs)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let orgs = match std::env::var("JOINFLOW_ORGS_FILE") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read orgs file {}", path))?;
            parse_orgs(&raw)?
        }
        Err(_) => {
            tracing::warn!("JOINFLOW_ORGS_FILE is not set, no organizations are configured");
            HashMap::new()
        }
    };

    let github = std::env::var("JOINFLOW_GITHUB_TOKEN").ok().map(|token| GithubConfig {
        api_url: std::env::var("JOINFLOW_GITHUB_API_URL")
            .unwrap_or_else(|_| "https://api.github.com".into()),
        token,
    });

    let mail = match (
        std::env::var("JOINFLOW_MAIL_URL").ok(),
        std::env::var("JOINFLOW_MAIL_FROM").ok(),
    ) {
        (Some(url), Some(from)) => Some(MailConfig {
            url,
            api_key: std::env::var("JOINFLOW_MAIL_API_KEY").ok(),
            from,
        }),
        _ => None,
    };

    let graph = match (
        std::env::var("JOINFLOW_GRAPH_CLIENT_ID").ok(),
        std::env::var("JOINFLOW_GRAPH_CLIENT_SECRET").ok(),
        std::env::var("JOINFLOW_GRAPH_TOKEN_URL").ok(),
    ) {
        (Some(client_id), Some(client_secret), Some(token_url)) => Some(GraphConfig {
            api_url: std::env::var("JOINFLOW_GRAPH_URL")
                .unwrap_or_else(|_| "https://graph.microsoft.com/v1.0".into()),
            token_url,
            client_id,
            client_secret,
        }),
        _ => None,
    };

    Ok(Config {
        port: std::env::var("JOINFLOW_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .unwrap_or(8080),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/joinflow".into()),
        service_key: std::env::var("JOINFLOW_SERVICE_KEY").ok(),
        site_host: std::env::var("JOINFLOW_SITE_HOST").unwrap_or_else(|_| "localhost:8080".into()),
        allow_insecure_local: env_flag("JOINFLOW_ALLOW_INSECURE_LOCAL"),
        version_tag: std::env::var("JOINFLOW_VERSION_TAG")
            .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").into()),
        orgs,
        github,
        mail,
        graph,
        telemetry_webhook_urls: std::env::var("JOINFLOW_TELEMETRY_WEBHOOK_URLS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        telemetry_webhook_secret: std::env::var("JOINFLOW_TELEMETRY_WEBHOOK_SECRET").ok(),
    })
}
