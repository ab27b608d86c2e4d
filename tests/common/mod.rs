//! In-memory collaborators for pipeline tests.
//!
//! Every side-effecting call is appended to a shared journal so tests can
//! assert on the order of writes across collaborators.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use joinflow::config::{ApprovalProviderKind, OrgSettings};
use joinflow::directory::DirectoryResolver;
use joinflow::errors::AppError;
use joinflow::join::{JoinContext, JoinPipeline, JoinServices, SiteSettings};
use joinflow::models::approval::{ApprovalPatch, ApprovalRequest};
use joinflow::models::mail::{MailMessage, MailReceipt};
use joinflow::models::team::{CorporateLink, Maintainer, MembershipRole, OrgRef, Repo, Requester, TeamRef};
use joinflow::notification::telemetry::{Telemetry, TelemetryProps};
use joinflow::notification::{IssueResponse, IssueTracker, MailProvider, TemplateRenderer};
use joinflow::org::OrgMembership;
use joinflow::store::ApprovalStore;

pub const TEAM_ID: i64 = 7;
pub const ALL_MEMBERS_TEAM_ID: i64 = 5;

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Knobs for one test run. Defaults describe the happy path.
pub struct Scenario {
    pub maintainers: Vec<Maintainer>,
    pub already_member: bool,
    pub issue_response: IssueResponse,
    pub fail_add_membership: bool,
    pub fail_list_maintainers: bool,
    pub fail_insert: bool,
    pub fail_create_issue: bool,
    pub fail_assign: bool,
    pub failing_upns: Vec<String>,
    pub failing_mail_recipient: Option<String>,
    pub failing_template: Option<&'static str>,
    pub mail_wired: bool,
    pub issues_wired: bool,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            maintainers: vec![
                maintainer("alice", Some("alice@contoso.com")),
                maintainer("bob", Some("bob@contoso.com")),
            ],
            already_member: false,
            issue_response: IssueResponse {
                id: Some(9001),
                number: Some(12),
                html_url: Some("https://github.com/contoso/approvals/issues/12".into()),
            },
            fail_add_membership: false,
            fail_list_maintainers: false,
            fail_insert: false,
            fail_create_issue: false,
            fail_assign: false,
            failing_upns: Vec::new(),
            failing_mail_recipient: None,
            failing_template: None,
            mail_wired: true,
            issues_wired: true,
        }
    }
}

pub fn maintainer(login: &str, upn: Option<&str>) -> Maintainer {
    Maintainer {
        login: Some(login.to_string()),
        link: Some(CorporateLink {
            github_login: login.to_string(),
            github_id: 100,
            corporate_upn: upn.map(String::from),
            corporate_display_name: Some(login.to_uppercase()),
        }),
    }
}

pub fn unlinked(login: &str) -> Maintainer {
    Maintainer {
        login: Some(login.to_string()),
        link: None,
    }
}

// ── Org ──────────────────────────────────────────────────────

pub struct FakeOrg {
    journal: Journal,
    maintainers: Vec<Maintainer>,
    already_member: bool,
    fail_add: bool,
    fail_list: bool,
    pub added: Mutex<Vec<(String, MembershipRole)>>,
}

#[async_trait]
impl OrgMembership for FakeOrg {
    async fn get_team(&self, _org: &OrgRef, team_id: i64) -> anyhow::Result<Option<TeamRef>> {
        Ok((team_id == TEAM_ID).then(team))
    }

    async fn is_member(&self, _org: &OrgRef, _team: &TeamRef, _login: &str) -> anyhow::Result<bool> {
        Ok(self.already_member)
    }

    async fn add_membership(
        &self,
        _org: &OrgRef,
        _team: &TeamRef,
        login: &str,
        role: MembershipRole,
    ) -> anyhow::Result<()> {
        if self.fail_add {
            anyhow::bail!("membership API returned 500");
        }
        self.journal.push("org.add_membership");
        self.added.lock().unwrap().push((login.to_string(), role));
        Ok(())
    }

    async fn official_maintainers(&self, _org: &OrgRef, _team: &TeamRef) -> anyhow::Result<Vec<Maintainer>> {
        if self.fail_list {
            anyhow::bail!("maintainer listing timed out");
        }
        Ok(self.maintainers.clone())
    }
}

// ── Store ────────────────────────────────────────────────────

pub struct FakeStore {
    journal: Journal,
    fail_insert: bool,
    pub inserts: Mutex<Vec<(i64, ApprovalRequest, Uuid)>>,
    pub patches: Mutex<Vec<(Uuid, ApprovalPatch)>>,
}

#[async_trait]
impl ApprovalStore for FakeStore {
    async fn insert_approval_request(&self, team_id: i64, record: &ApprovalRequest) -> anyhow::Result<Uuid> {
        if self.fail_insert {
            anyhow::bail!("connection reset");
        }
        self.journal.push("store.insert");
        let id = Uuid::new_v4();
        self.inserts.lock().unwrap().push((team_id, record.clone(), id));
        Ok(id)
    }

    async fn update_approval_request(&self, request_id: Uuid, patch: &ApprovalPatch) -> anyhow::Result<()> {
        self.journal.push("store.update");
        self.patches.lock().unwrap().push((request_id, patch.clone()));
        Ok(())
    }
}

// ── Directory ────────────────────────────────────────────────

pub struct FakeDirectory {
    failing: Vec<String>,
    pub lookups: Mutex<Vec<String>>,
}

#[async_trait]
impl DirectoryResolver for FakeDirectory {
    async fn address_for_upn(&self, upn: &str) -> anyhow::Result<String> {
        self.lookups.lock().unwrap().push(upn.to_string());
        if self.failing.iter().any(|f| f == upn) {
            anyhow::bail!("no directory entry for {}", upn);
        }
        Ok(upn.replace("@contoso.com", "@mail.contoso.com"))
    }
}

// ── Issues ───────────────────────────────────────────────────

pub struct FakeIssues {
    journal: Journal,
    response: IssueResponse,
    fail_create: bool,
    fail_assign: bool,
    pub created: Mutex<Vec<(Repo, String, String)>>,
    pub assigned: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl IssueTracker for FakeIssues {
    async fn create_issue(&self, repo: &Repo, title: &str, body: &str) -> anyhow::Result<IssueResponse> {
        if self.fail_create {
            anyhow::bail!("issue API returned 502");
        }
        self.journal.push("issue.create");
        self.created
            .lock()
            .unwrap()
            .push((repo.clone(), title.to_string(), body.to_string()));
        Ok(self.response.clone())
    }

    async fn assign_issue(&self, _repo: &Repo, number: i64, assignee: &str) -> anyhow::Result<()> {
        if self.fail_assign {
            anyhow::bail!("422: {} cannot be assigned", assignee);
        }
        self.journal.push("issue.assign");
        self.assigned.lock().unwrap().push((number, assignee.to_string()));
        Ok(())
    }
}

// ── Mail ─────────────────────────────────────────────────────

pub struct FakeMail {
    journal: Journal,
    failing_recipient: Option<String>,
    pub sent: Mutex<Vec<MailMessage>>,
}

#[async_trait]
impl MailProvider for FakeMail {
    async fn send_mail(&self, message: &MailMessage) -> anyhow::Result<MailReceipt> {
        if let Some(ref bad) = self.failing_recipient {
            if message.to.contains(bad) {
                anyhow::bail!("relay rejected {}", bad);
            }
        }
        self.journal.push("mail.send");
        self.sent.lock().unwrap().push(message.clone());
        Ok(MailReceipt {
            id: message.correlation_id.clone(),
        })
    }
}

// ── Templates ────────────────────────────────────────────────

pub struct FakeTemplates {
    failing: Option<&'static str>,
}

impl TemplateRenderer for FakeTemplates {
    fn render(&self, template: &str, context: &Value) -> anyhow::Result<String> {
        if self.failing == Some(template) {
            anyhow::bail!("template '{}' has a syntax error", template);
        }
        Ok(format!("{}|{}", template, context))
    }
}

// ── Telemetry ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingTelemetry {
    pub events: Mutex<Vec<(String, TelemetryProps)>>,
    pub exceptions: Mutex<Vec<(&'static str, TelemetryProps)>>,
}

impl RecordingTelemetry {
    pub fn event_names(&self) -> Vec<String> {
        self.events.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }
}

impl Telemetry for RecordingTelemetry {
    fn track_event(&self, name: &str, props: TelemetryProps) {
        self.events.lock().unwrap().push((name.to_string(), props));
    }

    fn track_exception(&self, error: &AppError, props: TelemetryProps) {
        self.exceptions.lock().unwrap().push((error.code(), props));
    }
}

// ── Harness ──────────────────────────────────────────────────

pub struct Harness {
    pub journal: Journal,
    pub org: Arc<FakeOrg>,
    pub store: Arc<FakeStore>,
    pub directory: Arc<FakeDirectory>,
    pub issues: Arc<FakeIssues>,
    pub mail: Arc<FakeMail>,
    pub telemetry: Arc<RecordingTelemetry>,
    pub pipeline: JoinPipeline,
}

impl Harness {
    pub fn new(scenario: Scenario) -> Self {
        let journal = Journal::default();
        let org = Arc::new(FakeOrg {
            journal: journal.clone(),
            maintainers: scenario.maintainers,
            already_member: scenario.already_member,
            fail_add: scenario.fail_add_membership,
            fail_list: scenario.fail_list_maintainers,
            added: Mutex::new(Vec::new()),
        });
        let store = Arc::new(FakeStore {
            journal: journal.clone(),
            fail_insert: scenario.fail_insert,
            inserts: Mutex::new(Vec::new()),
            patches: Mutex::new(Vec::new()),
        });
        let directory = Arc::new(FakeDirectory {
            failing: scenario.failing_upns,
            lookups: Mutex::new(Vec::new()),
        });
        let issues = Arc::new(FakeIssues {
            journal: journal.clone(),
            response: scenario.issue_response,
            fail_create: scenario.fail_create_issue,
            fail_assign: scenario.fail_assign,
            created: Mutex::new(Vec::new()),
            assigned: Mutex::new(Vec::new()),
        });
        let mail = Arc::new(FakeMail {
            journal: journal.clone(),
            failing_recipient: scenario.failing_mail_recipient,
            sent: Mutex::new(Vec::new()),
        });
        let telemetry = Arc::new(RecordingTelemetry::default());

        let services = JoinServices {
            org: org.clone(),
            store: store.clone(),
            directory: directory.clone(),
            issues: scenario
                .issues_wired
                .then(|| issues.clone() as Arc<dyn IssueTracker>),
            mail: scenario.mail_wired.then(|| mail.clone() as Arc<dyn MailProvider>),
            templates: Arc::new(FakeTemplates {
                failing: scenario.failing_template,
            }),
            telemetry: telemetry.clone(),
        };
        let pipeline = JoinPipeline::new(
            services,
            SiteSettings {
                site_url: "https://repos.contoso.com".into(),
                version_tag: "1.2.3".into(),
            },
        );

        Self {
            journal,
            org,
            store,
            directory,
            issues,
            mail,
            telemetry,
            pipeline,
        }
    }

    pub fn insert_count(&self) -> usize {
        self.store.inserts.lock().unwrap().len()
    }

    pub fn patches(&self) -> Vec<ApprovalPatch> {
        self.store.patches.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn sent_mail(&self) -> Vec<MailMessage> {
        self.mail.sent.lock().unwrap().clone()
    }

    pub fn exception_step(&self) -> Option<String> {
        self.telemetry
            .exceptions
            .lock()
            .unwrap()
            .last()
            .and_then(|(_, props)| props.get("step").cloned())
    }
}

// ── Inputs ───────────────────────────────────────────────────

pub fn team() -> TeamRef {
    TeamRef {
        id: TEAM_ID,
        slug: "sdk".into(),
        name: "SDK".into(),
    }
}

pub fn org(providers: &[ApprovalProviderKind], workflow_repository: Option<&str>) -> OrgSettings {
    OrgSettings {
        name: "contoso".into(),
        id: 1001,
        all_members_team_id: Some(ALL_MEMBERS_TEAM_ID),
        workflow_repository: workflow_repository.map(String::from),
        approval_providers: providers.iter().copied().collect::<BTreeSet<_>>(),
    }
}

pub fn both_channels() -> OrgSettings {
    org(
        &[ApprovalProviderKind::Mail, ApprovalProviderKind::IssueTracker],
        Some("contoso/approvals"),
    )
}

pub fn requester() -> Requester {
    Requester {
        account_id: 42,
        login: "octocat".into(),
        display_name: "Mona Lisa".into(),
        upn: "mona@contoso.com".into(),
        org_member: true,
    }
}

pub fn context(org: OrgSettings) -> JoinContext {
    JoinContext {
        requester: requester(),
        org,
        team: team(),
        justification: Some("I maintain the SDK release tooling".into()),
        correlation_id: "corr-123".into(),
    }
}
