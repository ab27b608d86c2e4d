use serde::Serialize;

/// Steps of one join submission, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStep {
    DirectJoin,
    ResolveRequesterMail,
    CheckMembership,
    ListMaintainers,
    ResolveApproverMail,
    PersistPending,
    CreateIssue,
    Finalize,
    AssignIssue,
    MailApprovers,
    MailRequester,
}

impl JoinStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinStep::DirectJoin => "direct_join",
            JoinStep::ResolveRequesterMail => "resolve_requester_mail",
            JoinStep::CheckMembership => "check_membership",
            JoinStep::ListMaintainers => "list_maintainers",
            JoinStep::ResolveApproverMail => "resolve_approver_mail",
            JoinStep::PersistPending => "persist_pending",
            JoinStep::CreateIssue => "create_issue",
            JoinStep::Finalize => "finalize",
            JoinStep::AssignIssue => "assign_issue",
            JoinStep::MailApprovers => "mail_approvers",
            JoinStep::MailRequester => "mail_requester",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    /// Channel not in use for this org.
    Skipped,
    /// Failed without affecting the outcome.
    SoftFailure { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeEntry {
    pub step: JoinStep,
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Per-request record of what each step did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutcomeLog {
    entries: Vec<OutcomeEntry>,
    #[serde(skip)]
    in_progress: Option<JoinStep>,
}

impl OutcomeLog {
    /// Mark `step` as started; cleared when the step records a status.
    pub fn begin(&mut self, step: JoinStep) {
        self.in_progress = Some(step);
    }

    /// The step that was started but never recorded, i.e. the one that failed.
    pub fn in_progress(&self) -> Option<JoinStep> {
        self.in_progress
    }

    pub fn completed(&mut self, step: JoinStep) {
        self.record(step, StepStatus::Completed);
    }

    pub fn skipped(&mut self, step: JoinStep) {
        self.record(step, StepStatus::Skipped);
    }

    pub fn soft_failure(&mut self, step: JoinStep, reason: impl Into<String>) {
        self.record(step, StepStatus::SoftFailure { reason: reason.into() });
    }

    fn record(&mut self, step: JoinStep, status: StepStatus) {
        if self.in_progress == Some(step) {
            self.in_progress = None;
        }
        self.entries.push(OutcomeEntry { step, status });
    }

    pub fn status_of(&self, step: JoinStep) -> Option<&StepStatus> {
        self.entries.iter().rev().find(|e| e.step == step).map(|e| &e.status)
    }

    pub fn soft_failures(&self) -> impl Iterator<Item = &OutcomeEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, StepStatus::SoftFailure { .. }))
    }
}
