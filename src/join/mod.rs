//! Team join requests: eligibility, reviewer selection, persistence and
//! fan-out to the approval channels.

pub mod channels;
pub mod maintainers;
pub mod orchestrator;
pub mod outcome;

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::config::OrgSettings;
use crate::directory::DirectoryResolver;
use crate::models::team::{Requester, TeamRef};
use crate::notification::telemetry::Telemetry;
use crate::notification::{IssueTracker, MailProvider, TemplateRenderer};
use crate::org::OrgMembership;
use crate::store::ApprovalStore;

pub use orchestrator::JoinPipeline;
pub use outcome::{JoinStep, OutcomeLog, StepStatus};

/// External collaborators used by the pipeline. Unwired channels are `None`.
#[derive(Clone)]
pub struct JoinServices {
    pub org: Arc<dyn OrgMembership>,
    pub store: Arc<dyn ApprovalStore>,
    pub directory: Arc<dyn DirectoryResolver>,
    pub issues: Option<Arc<dyn IssueTracker>>,
    pub mail: Option<Arc<dyn MailProvider>>,
    pub templates: Arc<dyn TemplateRenderer>,
    pub telemetry: Arc<dyn Telemetry>,
}

/// Site-wide values embedded in links and mail.
#[derive(Debug, Clone)]
pub struct SiteSettings {
    /// Scheme and host, e.g. `https://repos.contoso.com`.
    pub site_url: String,
    pub version_tag: String,
}

/// Everything one submission needs, passed explicitly by the caller.
#[derive(Debug, Clone)]
pub struct JoinContext {
    pub requester: Requester,
    pub org: OrgSettings,
    pub team: TeamRef,
    pub justification: Option<String>,
    pub correlation_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinOutcome {
    /// Where the caller should send the requester next.
    pub redirect: String,
    /// Confirmation shown to the requester.
    pub notice: String,
    /// Set when an approval request was created.
    pub request_id: Option<Uuid>,
    pub outcome: OutcomeLog,
}
