//! Human-facing notification channels for approval requests.
//!
//! - `IssueTracker`: workflow issue creation plus best-effort assignment
//! - `MailProvider`: delivery of pre-rendered mail
//! - `TemplateRenderer`: mail body rendering, kept apart from delivery so the
//!   two failure kinds can be told apart
//! - `telemetry::Telemetry`: fire-and-forget event sink

pub mod mail;
pub mod telemetry;
pub mod templates;

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::approval::IssueRef;
use crate::models::mail::{MailMessage, MailReceipt};
use crate::models::team::Repo;

/// Issue as returned by the tracker. Fields are optional so that an
/// incomplete response can be detected by the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueResponse {
    pub id: Option<i64>,
    pub number: Option<i64>,
    pub html_url: Option<String>,
}

impl IssueResponse {
    /// Both the reference id and the number are required.
    pub fn issue_ref(&self) -> Result<IssueRef, String> {
        match (self.id, self.number) {
            (Some(ref_id), Some(number)) => Ok(IssueRef { ref_id, number }),
            (None, Some(_)) => Err("issue response is missing the reference id".into()),
            (Some(_), None) => Err("issue response is missing the issue number".into()),
            (None, None) => Err("issue response is missing the reference id and number".into()),
        }
    }
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_issue(&self, repo: &Repo, title: &str, body: &str) -> anyhow::Result<IssueResponse>;

    async fn assign_issue(&self, repo: &Repo, number: i64, assignee: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait MailProvider: Send + Sync {
    async fn send_mail(&self, message: &MailMessage) -> anyhow::Result<MailReceipt>;
}

pub trait TemplateRenderer: Send + Sync {
    /// Pure function of template name and context.
    fn render(&self, template: &str, context: &serde_json::Value) -> anyhow::Result<String>;
}
