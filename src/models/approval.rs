use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminator for rows in `approval_requests`. This service only creates
/// `JoinTeam`; the column leaves room for other request kinds.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
#[sqlx(type_name = "varchar", rename_all = "camelCase")]
pub enum ApprovalRequestType {
    JoinTeam,
}

/// A join request as written by the pipeline.
///
/// Starts out pending (`active = false`, no issue or mail bookkeeping) and is
/// finalized by a single patch once its notification artifacts exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalRequest {
    pub requester_account_id: i64,
    pub requester_login: String,
    pub requester_name: String,
    pub requester_email: String,
    pub justification: String,
    pub requested_at: DateTime<Utc>,
    pub active: bool,
    pub request_type: ApprovalRequestType,
    pub org_id: i64,
    pub org_name: String,
    pub team_id: i64,
    pub team_name: String,
    pub issue_ref_id: Option<i64>,
    pub issue_number: Option<i64>,
    pub mail_sent_to_approvers: Option<Vec<String>>,
    pub mail_sent_to_requester: Option<String>,
}

/// Partial update; `None` fields are left untouched by the store.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ApprovalPatch {
    pub active: Option<bool>,
    pub issue_ref_id: Option<i64>,
    pub issue_number: Option<i64>,
    pub mail_sent_to_approvers: Option<Vec<String>>,
    pub mail_sent_to_requester: Option<String>,
}

impl ApprovalPatch {
    pub fn finalize(issue: Option<IssueRef>) -> Self {
        Self {
            active: Some(true),
            issue_ref_id: issue.map(|i| i.ref_id),
            issue_number: issue.map(|i| i.number),
            ..Default::default()
        }
    }

    pub fn apply_to(&self, record: &mut ApprovalRequest) {
        if let Some(active) = self.active {
            record.active = active;
        }
        if let Some(id) = self.issue_ref_id {
            record.issue_ref_id = Some(id);
        }
        if let Some(number) = self.issue_number {
            record.issue_number = Some(number);
        }
        if let Some(ref to) = self.mail_sent_to_approvers {
            record.mail_sent_to_approvers = Some(to.clone());
        }
        if let Some(ref to) = self.mail_sent_to_requester {
            record.mail_sent_to_requester = Some(to.clone());
        }
    }
}

/// Reference to a created tracker issue. Only constructed from a response
/// that carried both fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IssueRef {
    pub ref_id: i64,
    pub number: i64,
}

/// Stored row, as read back for listing.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApprovalRequestRow {
    pub id: Uuid,
    pub request_type: ApprovalRequestType,
    pub requester_account_id: i64,
    pub requester_login: String,
    pub requester_name: String,
    pub requester_email: String,
    pub justification: String,
    pub requested_at: DateTime<Utc>,
    pub active: bool,
    pub org_id: i64,
    pub org_name: String,
    pub team_id: i64,
    pub team_name: String,
    pub issue_ref_id: Option<i64>,
    pub issue_number: Option<i64>,
    pub mail_sent_to_approvers: Option<Vec<String>>,
    pub mail_sent_to_requester: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> ApprovalRequest {
        ApprovalRequest {
            requester_account_id: 42,
            requester_login: "octocat".into(),
            requester_name: "Mona Lisa".into(),
            requester_email: "mona@contoso.com".into(),
            justification: "working on the SDK".into(),
            requested_at: Utc::now(),
            active: false,
            request_type: ApprovalRequestType::JoinTeam,
            org_id: 1,
            org_name: "contoso".into(),
            team_id: 7,
            team_name: "sdk".into(),
            issue_ref_id: None,
            issue_number: None,
            mail_sent_to_approvers: None,
            mail_sent_to_requester: None,
        }
    }

    #[test]
    fn test_finalize_without_issue_only_activates() {
        let mut record = pending();
        ApprovalPatch::finalize(None).apply_to(&mut record);
        assert!(record.active);
        assert_eq!(record.issue_ref_id, None);
        assert_eq!(record.issue_number, None);
    }

    #[test]
    fn test_finalize_with_issue_sets_both_refs() {
        let mut record = pending();
        ApprovalPatch::finalize(Some(IssueRef { ref_id: 9001, number: 12 })).apply_to(&mut record);
        assert!(record.active);
        assert_eq!(record.issue_ref_id, Some(9001));
        assert_eq!(record.issue_number, Some(12));
    }

    #[test]
    fn test_patch_leaves_unnamed_fields_untouched() {
        let mut record = pending();
        record.active = true;
        let patch = ApprovalPatch {
            mail_sent_to_requester: Some("mona@contoso.com".into()),
            ..Default::default()
        };
        patch.apply_to(&mut record);
        assert!(record.active);
        assert_eq!(record.mail_sent_to_requester.as_deref(), Some("mona@contoso.com"));
        assert!(record.mail_sent_to_approvers.is_none());
    }

    #[test]
    fn test_request_type_serializes_as_join_team() {
        let json = serde_json::to_value(ApprovalRequestType::JoinTeam).unwrap();
        assert_eq!(json, "joinTeam");
    }
}
