//! The join-request pipeline.
//!
//! Each stage consumes the previous stage's value and returns the next one,
//! so a stage cannot run before the side effect it depends on has been
//! acknowledged. The pending insert always precedes issue creation and mail,
//! and any fatal error leaves at most a pending record behind.

use chrono::Utc;
use serde_json::json;
use tracing::Instrument;
use uuid::Uuid;

use super::channels::ApprovalChannels;
use super::maintainers::{approver_addresses, list_eligible_maintainers, pick_assignee, EligibleMaintainer};
use super::outcome::{JoinStep, OutcomeLog};
use super::{JoinContext, JoinOutcome, JoinServices, SiteSettings};
use crate::config::OrgSettings;
use crate::errors::{AppError, ProviderKind};
use crate::models::approval::{ApprovalPatch, ApprovalRequest, ApprovalRequestType, IssueRef};
use crate::models::mail::MailMessage;
use crate::models::team::{MembershipRole, OrgRef, Requester, TeamRef};
use crate::notification::telemetry::TelemetryProps;
use crate::notification::templates::{PLEASE_APPROVE, REQUEST_SUBMITTED};
use crate::notification::IssueResponse;

const MAIL_CATEGORIES: [&str; 2] = ["request", "repos"];

// ── Stages ───────────────────────────────────────────────────

/// Validated input and the channels in use for this request.
struct Submission {
    requester: Requester,
    org: OrgRef,
    team: TeamRef,
    justification: String,
    correlation_id: String,
    channels: ApprovalChannels,
}

impl Submission {
    fn props(&self) -> TelemetryProps {
        props(&self.correlation_id, &self.org.name, &self.team.slug, &self.requester.login)
    }
}

struct Addressed {
    sub: Submission,
    requester_mail: String,
}

struct Reviewed {
    sub: Submission,
    maintainers: Vec<EligibleMaintainer>,
    assignee: String,
    approver_mail: Vec<String>,
    record: ApprovalRequest,
}

struct Persisted {
    sub: Submission,
    maintainers: Vec<EligibleMaintainer>,
    assignee: String,
    approver_mail: Vec<String>,
    record: ApprovalRequest,
    request_id: Uuid,
}

struct Finalized {
    sub: Submission,
    assignee: String,
    approver_mail: Vec<String>,
    record: ApprovalRequest,
    request_id: Uuid,
    issue: Option<IssueRef>,
}

struct Completion {
    redirect: String,
    notice: String,
    request_id: Option<Uuid>,
}

fn props(correlation_id: &str, org: &str, team: &str, login: &str) -> TelemetryProps {
    let mut p = TelemetryProps::new();
    p.insert("correlation_id".into(), correlation_id.to_string());
    p.insert("org".into(), org.to_string());
    p.insert("team".into(), team.to_string());
    p.insert("requester".into(), login.to_string());
    p
}

fn ensure_org_member(org: &OrgSettings, org_member: bool) -> Result<(), AppError> {
    if org_member {
        return Ok(());
    }
    Err(AppError::Validation(format!(
        "You must be a member of the {} organization before you can join its teams",
        org.name
    )))
}

fn require_justification(justification: Option<&str>) -> Result<String, AppError> {
    justification
        .map(str::trim)
        .filter(|j| !j.is_empty())
        .map(String::from)
        .ok_or_else(|| {
            AppError::Validation("A business justification is required to request team membership".to_string())
        })
}

fn team_root(org: &OrgRef, team: &TeamRef) -> String {
    format!("/{}/teams/{}", org.name, team.slug)
}

fn issue_title(sub: &Submission) -> String {
    format!(
        "{} wants to join {} in the {} organization",
        sub.requester.login, sub.team.name, sub.org.name
    )
}

fn issue_body(sub: &Submission, maintainers: &[EligibleMaintainer], review_url: &str) -> String {
    let quoted: Vec<String> = sub
        .justification
        .lines()
        .map(|l| format!("> {}", l))
        .collect();
    let mentions: Vec<String> = maintainers.iter().map(|m| format!("@{}", m.login)).collect();
    format!(
        "Hi,\n\n{} ({}) has requested to join the **{}** team in the **{}** organization.\n\n\
         **Business justification**\n\n{}\n\n\
         **Team maintainers**: {}\n\n\
         Please review the request: {}\n\n\
         _Correlation ID: {}_\n",
        sub.requester.login,
        sub.requester.display_name,
        sub.team.name,
        sub.org.name,
        quoted.join("\n"),
        mentions.join(" "),
        review_url,
        sub.correlation_id
    )
}

// ── Pipeline ─────────────────────────────────────────────────

pub struct JoinPipeline {
    services: JoinServices,
    site: SiteSettings,
}

impl JoinPipeline {
    pub fn new(services: JoinServices, site: SiteSettings) -> Self {
        Self { services, site }
    }

    /// Handle one join submission from start to a terminal outcome.
    pub async fn submit_join_request(&self, ctx: JoinContext) -> Result<JoinOutcome, AppError> {
        let span = tracing::info_span!(
            "join_request",
            correlation_id = %ctx.correlation_id,
            org = %ctx.org.name,
            team = %ctx.team.slug,
        );
        let mut failure_props = props(&ctx.correlation_id, &ctx.org.name, &ctx.team.slug, &ctx.requester.login);
        let mut log = OutcomeLog::default();

        match self.run(ctx, &mut log).instrument(span).await {
            Ok(done) => Ok(JoinOutcome {
                redirect: done.redirect,
                notice: done.notice,
                request_id: done.request_id,
                outcome: log,
            }),
            Err(e) => {
                if let Some(step) = log.in_progress() {
                    failure_props.insert("step".into(), step.as_str().to_string());
                }
                match e {
                    AppError::Configuration(ref m) => tracing::warn!(reason = %m, "join request not started"),
                    ref other if other.is_fatal() => {
                        self.services.telemetry.track_exception(other, failure_props)
                    }
                    ref other => tracing::info!(reason = %other, "join request rejected"),
                }
                Err(e)
            }
        }
    }

    /// Input checks that need no collaborator call. Callers run this before
    /// any lookup of their own so a rejected request costs nothing.
    pub fn preflight(
        &self,
        org: &OrgSettings,
        team_id: i64,
        org_member: bool,
        justification: Option<&str>,
    ) -> Result<(), AppError> {
        ensure_org_member(org, org_member)?;
        if org.all_members_team_id == Some(team_id) {
            return Ok(());
        }
        require_justification(justification)?;
        self.channels_for(org)?;
        Ok(())
    }

    fn channels_for(&self, org: &OrgSettings) -> Result<ApprovalChannels, AppError> {
        ApprovalChannels::resolve(
            &org.approval_providers,
            org.workflow_repo(),
            self.services.mail.as_ref(),
            self.services.issues.as_ref(),
        )
    }

    async fn run(&self, ctx: JoinContext, log: &mut OutcomeLog) -> Result<Completion, AppError> {
        ensure_org_member(&ctx.org, ctx.requester.org_member)?;
        if ctx.org.all_members_team_id == Some(ctx.team.id) {
            return self.join_directly(ctx, log).await;
        }

        let sub = self.validate(ctx)?;
        let addressed = self.resolve_requester(sub, log).await?;
        let addressed = self.ensure_not_member(addressed, log).await?;
        let reviewed = self.select_reviewers(addressed, log).await?;
        let persisted = self.persist_pending(reviewed, log).await?;
        let (persisted, issue) = self.open_issue(persisted, log).await?;
        let finalized = self.finalize(persisted, issue, log).await?;
        self.assign_issue(&finalized, log).await;
        let finalized = self.mail_approvers(finalized, log).await?;
        let finalized = self.mail_requester(finalized, log).await?;
        Ok(self.complete(finalized))
    }

    /// The broad-access team takes members without review.
    async fn join_directly(&self, ctx: JoinContext, log: &mut OutcomeLog) -> Result<Completion, AppError> {
        let org = ctx.org.org_ref();
        log.begin(JoinStep::DirectJoin);
        self.services
            .org
            .add_membership(&org, &ctx.team, &ctx.requester.login, MembershipRole::Member)
            .await
            .map_err(|e| AppError::provider(ProviderKind::Org, "add team membership", e))?;
        log.completed(JoinStep::DirectJoin);

        self.services.telemetry.track_event(
            "TeamJoinDirect",
            props(&ctx.correlation_id, &org.name, &ctx.team.slug, &ctx.requester.login),
        );
        tracing::info!(login = %ctx.requester.login, "joined broad-access team directly");

        Ok(Completion {
            redirect: team_root(&org, &ctx.team),
            notice: format!("You have joined the {} team.", ctx.team.name),
            request_id: None,
        })
    }

    fn validate(&self, ctx: JoinContext) -> Result<Submission, AppError> {
        let justification = require_justification(ctx.justification.as_deref())?;
        let channels = self.channels_for(&ctx.org)?;
        tracing::debug!(channels = %channels.describe(), "resolved approval channels");

        Ok(Submission {
            org: ctx.org.org_ref(),
            requester: ctx.requester,
            team: ctx.team,
            justification,
            correlation_id: ctx.correlation_id,
            channels,
        })
    }

    async fn resolve_requester(&self, sub: Submission, log: &mut OutcomeLog) -> Result<Addressed, AppError> {
        log.begin(JoinStep::ResolveRequesterMail);
        let requester_mail = self
            .services
            .directory
            .address_for_upn(&sub.requester.upn)
            .await
            .map_err(|e| AppError::provider(ProviderKind::Directory, "resolve requester mail", e))?;
        log.completed(JoinStep::ResolveRequesterMail);
        Ok(Addressed { sub, requester_mail })
    }

    async fn ensure_not_member(&self, a: Addressed, log: &mut OutcomeLog) -> Result<Addressed, AppError> {
        log.begin(JoinStep::CheckMembership);
        let member = self
            .services
            .org
            .is_member(&a.sub.org, &a.sub.team, &a.sub.requester.login)
            .await
            .map_err(|e| AppError::provider(ProviderKind::Org, "check team membership", e))?;
        if member {
            return Err(AppError::Validation(format!(
                "You are already a member of the {} team",
                a.sub.team.name
            )));
        }
        log.completed(JoinStep::CheckMembership);
        Ok(a)
    }

    async fn select_reviewers(&self, a: Addressed, log: &mut OutcomeLog) -> Result<Reviewed, AppError> {
        let Addressed { sub, requester_mail } = a;

        log.begin(JoinStep::ListMaintainers);
        let maintainers = list_eligible_maintainers(self.services.org.as_ref(), &sub.org, &sub.team)
            .await
            .map_err(|e| AppError::provider(ProviderKind::Org, "list team maintainers", e))?;
        let assignee = {
            let mut rng = rand::thread_rng();
            pick_assignee(&maintainers, &mut rng).map(|m| m.login.clone())
        };
        let assignee = assignee.ok_or_else(|| AppError::NoEligibleReviewer {
            team: sub.team.name.clone(),
        })?;
        log.completed(JoinStep::ListMaintainers);

        log.begin(JoinStep::ResolveApproverMail);
        let approver_mail = approver_addresses(self.services.directory.as_ref(), &maintainers)
            .await
            .map_err(|e| AppError::provider(ProviderKind::Directory, "resolve approver mail", e))?;
        if sub.channels.mail_in_use() && approver_mail.is_empty() {
            tracing::warn!("no maintainer has a directory identity to mail");
            return Err(AppError::NoEligibleReviewer {
                team: sub.team.name.clone(),
            });
        }
        log.completed(JoinStep::ResolveApproverMail);

        let record = ApprovalRequest {
            requester_account_id: sub.requester.account_id,
            requester_login: sub.requester.login.clone(),
            requester_name: sub.requester.display_name.clone(),
            requester_email: requester_mail,
            justification: sub.justification.clone(),
            requested_at: Utc::now(),
            active: false,
            request_type: ApprovalRequestType::JoinTeam,
            org_id: sub.org.id,
            org_name: sub.org.name.clone(),
            team_id: sub.team.id,
            team_name: sub.team.name.clone(),
            issue_ref_id: None,
            issue_number: None,
            mail_sent_to_approvers: None,
            mail_sent_to_requester: None,
        };

        Ok(Reviewed {
            sub,
            maintainers,
            assignee,
            approver_mail,
            record,
        })
    }

    async fn persist_pending(&self, r: Reviewed, log: &mut OutcomeLog) -> Result<Persisted, AppError> {
        log.begin(JoinStep::PersistPending);
        let request_id = self
            .services
            .store
            .insert_approval_request(r.sub.team.id, &r.record)
            .await
            .map_err(|e| AppError::provider(ProviderKind::Store, "insert approval request", e))?;
        log.completed(JoinStep::PersistPending);
        tracing::info!(request_id = %request_id, "stored pending approval request");

        Ok(Persisted {
            sub: r.sub,
            maintainers: r.maintainers,
            assignee: r.assignee,
            approver_mail: r.approver_mail,
            record: r.record,
            request_id,
        })
    }

    async fn open_issue(
        &self,
        p: Persisted,
        log: &mut OutcomeLog,
    ) -> Result<(Persisted, Option<IssueResponse>), AppError> {
        let channel = match p.sub.channels.issues.clone() {
            Some(channel) => channel,
            None => {
                log.skipped(JoinStep::CreateIssue);
                return Ok((p, None));
            }
        };

        log.begin(JoinStep::CreateIssue);
        let title = issue_title(&p.sub);
        let body = issue_body(&p.sub, &p.maintainers, &self.review_url(p.request_id));
        let issue = channel
            .tracker
            .create_issue(&channel.repo, &title, &body)
            .await
            .map_err(|e| AppError::provider(ProviderKind::IssueTracker, "create workflow issue", e))?;
        log.completed(JoinStep::CreateIssue);
        Ok((p, Some(issue)))
    }

    async fn finalize(
        &self,
        p: Persisted,
        issue: Option<IssueResponse>,
        log: &mut OutcomeLog,
    ) -> Result<Finalized, AppError> {
        log.begin(JoinStep::Finalize);
        let issue = issue
            .map(|resp| resp.issue_ref())
            .transpose()
            .map_err(|detail| AppError::MalformedResponse {
                provider: ProviderKind::IssueTracker,
                detail,
            })?;

        let patch = ApprovalPatch::finalize(issue);
        self.services
            .store
            .update_approval_request(p.request_id, &patch)
            .await
            .map_err(|e| AppError::provider(ProviderKind::Store, "finalize approval request", e))?;
        let mut record = p.record;
        patch.apply_to(&mut record);
        log.completed(JoinStep::Finalize);

        Ok(Finalized {
            sub: p.sub,
            assignee: p.assignee,
            approver_mail: p.approver_mail,
            record,
            request_id: p.request_id,
            issue,
        })
    }

    /// The chosen maintainer may not be assignable (e.g. not linked to the
    /// tracker's identity system); failure is recorded but never fatal.
    async fn assign_issue(&self, f: &Finalized, log: &mut OutcomeLog) {
        let (channel, issue) = match (&f.sub.channels.issues, f.issue) {
            (Some(channel), Some(issue)) => (channel, issue),
            _ => {
                log.skipped(JoinStep::AssignIssue);
                return;
            }
        };

        log.begin(JoinStep::AssignIssue);
        match channel.tracker.assign_issue(&channel.repo, issue.number, &f.assignee).await {
            Ok(()) => log.completed(JoinStep::AssignIssue),
            Err(e) => {
                tracing::warn!(
                    issue = issue.number,
                    assignee = %f.assignee,
                    error = %e,
                    "could not assign workflow issue"
                );
                log.soft_failure(JoinStep::AssignIssue, format!("{:#}", e));
                let mut p = f.sub.props();
                p.insert("issue_number".into(), issue.number.to_string());
                self.services.telemetry.track_event("TeamJoinIssueAssignmentFailed", p);
            }
        }
    }

    async fn mail_approvers(&self, mut f: Finalized, log: &mut OutcomeLog) -> Result<Finalized, AppError> {
        let mail = match f.sub.channels.mail.clone() {
            Some(mail) => mail,
            None => {
                log.skipped(JoinStep::MailApprovers);
                return Ok(f);
            }
        };

        log.begin(JoinStep::MailApprovers);
        let content = self.render(PLEASE_APPROVE, &f)?;
        let message = MailMessage {
            to: f.approver_mail.clone(),
            subject: format!(
                "{} wants to join the {} team",
                f.sub.requester.display_name, f.sub.team.name
            ),
            content,
            correlation_id: f.sub.correlation_id.clone(),
            category: MAIL_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        };
        mail.send_mail(&message)
            .await
            .map_err(|e| AppError::provider(ProviderKind::Mail, "send approver mail", e))?;

        let patch = ApprovalPatch {
            mail_sent_to_approvers: Some(message.to),
            ..Default::default()
        };
        self.services
            .store
            .update_approval_request(f.request_id, &patch)
            .await
            .map_err(|e| AppError::provider(ProviderKind::Store, "record approver mail", e))?;
        patch.apply_to(&mut f.record);
        log.completed(JoinStep::MailApprovers);
        Ok(f)
    }

    async fn mail_requester(&self, mut f: Finalized, log: &mut OutcomeLog) -> Result<Finalized, AppError> {
        let mail = match f.sub.channels.mail.clone() {
            Some(mail) => mail,
            None => {
                log.skipped(JoinStep::MailRequester);
                return Ok(f);
            }
        };

        log.begin(JoinStep::MailRequester);
        let content = self.render(REQUEST_SUBMITTED, &f)?;
        let message = MailMessage {
            to: vec![f.record.requester_email.clone()],
            subject: format!("Your {} membership request has been submitted", f.sub.team.name),
            content,
            correlation_id: f.sub.correlation_id.clone(),
            category: MAIL_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        };
        mail.send_mail(&message)
            .await
            .map_err(|e| AppError::provider(ProviderKind::Mail, "send requester mail", e))?;

        let patch = ApprovalPatch {
            mail_sent_to_approvers: f.record.mail_sent_to_approvers.clone(),
            mail_sent_to_requester: Some(f.record.requester_email.clone()),
            ..Default::default()
        };
        self.services
            .store
            .update_approval_request(f.request_id, &patch)
            .await
            .map_err(|e| AppError::provider(ProviderKind::Store, "record requester mail", e))?;
        patch.apply_to(&mut f.record);
        log.completed(JoinStep::MailRequester);
        Ok(f)
    }

    fn complete(&self, f: Finalized) -> Completion {
        let mut p = f.sub.props();
        p.insert("request_id".into(), f.request_id.to_string());
        p.insert("providers".into(), f.sub.channels.describe());
        if let Some(issue) = f.issue {
            p.insert("issue_number".into(), issue.number.to_string());
        }
        self.services.telemetry.track_event("TeamJoinRequestSubmitted", p);
        tracing::info!(request_id = %f.request_id, "join request submitted");

        Completion {
            redirect: team_root(&f.sub.org, &f.sub.team),
            notice: format!(
                "Your request to join the {} team has been submitted and the team maintainers have been notified.",
                f.sub.team.name
            ),
            request_id: Some(f.request_id),
        }
    }

    fn review_url(&self, request_id: Uuid) -> String {
        format!("{}/approvals/{}", self.site.site_url.trim_end_matches('/'), request_id)
    }

    fn render(&self, template: &str, f: &Finalized) -> Result<String, AppError> {
        let context = json!({
            "requester_name": f.sub.requester.display_name,
            "requester_login": f.sub.requester.login,
            "requester_email": f.record.requester_email,
            "team_name": f.sub.team.name,
            "org_name": f.sub.org.name,
            "justification": f.sub.justification,
            "action_url": self.review_url(f.request_id),
            "correlation_id": f.sub.correlation_id,
            "version": self.site.version_tag,
        });
        self.services
            .templates
            .render(template, &context)
            .map_err(|e| AppError::MailRender {
                template: template.to_string(),
                reason: format!("{:#}", e),
            })
    }
}
