use std::collections::BTreeSet;
use std::sync::Arc;

use crate::config::ApprovalProviderKind;
use crate::errors::AppError;
use crate::models::team::Repo;
use crate::notification::{IssueTracker, MailProvider};

#[derive(Clone)]
pub struct IssueChannel {
    pub tracker: Arc<dyn IssueTracker>,
    pub repo: Repo,
}

/// Approval channels usable for one request, fixed at pipeline entry.
#[derive(Clone, Default)]
pub struct ApprovalChannels {
    pub mail: Option<Arc<dyn MailProvider>>,
    pub issues: Option<IssueChannel>,
}

impl ApprovalChannels {
    /// Resolve which enabled providers can actually be used.
    ///
    /// A missing workflow repository downgrades the issue tracker to unused,
    /// since that is a legitimate per-org state. An enabled provider with no
    /// client wired is a hard configuration error.
    pub fn resolve(
        enabled: &BTreeSet<ApprovalProviderKind>,
        workflow_repo: Option<Repo>,
        mail: Option<&Arc<dyn MailProvider>>,
        issues: Option<&Arc<dyn IssueTracker>>,
    ) -> Result<Self, AppError> {
        if enabled.is_empty() {
            return Err(AppError::Configuration(
                "no approval providers are enabled".to_string(),
            ));
        }

        let mail = if enabled.contains(&ApprovalProviderKind::Mail) {
            match mail {
                Some(m) => Some(Arc::clone(m)),
                None => {
                    return Err(AppError::Configuration(
                        "mail approvals are enabled but no mail provider is configured".to_string(),
                    ))
                }
            }
        } else {
            None
        };

        let issues = if enabled.contains(&ApprovalProviderKind::IssueTracker) {
            let tracker = issues.ok_or_else(|| {
                AppError::Configuration(
                    "issue approvals are enabled but no issue tracker is configured".to_string(),
                )
            })?;
            match workflow_repo {
                Some(repo) => Some(IssueChannel {
                    tracker: Arc::clone(tracker),
                    repo,
                }),
                None => {
                    tracing::warn!("issue approvals enabled but org has no workflow repository; not using issues");
                    None
                }
            }
        } else {
            None
        };

        let channels = Self { mail, issues };
        if !channels.mail_in_use() && !channels.issue_tracker_in_use() {
            return Err(AppError::Configuration(
                "no usable approval provider is available".to_string(),
            ));
        }
        Ok(channels)
    }

    pub fn mail_in_use(&self) -> bool {
        self.mail.is_some()
    }

    pub fn issue_tracker_in_use(&self) -> bool {
        self.issues.is_some()
    }

    pub fn describe(&self) -> String {
        match (self.mail_in_use(), self.issue_tracker_in_use()) {
            (true, true) => "mail,issueTracker",
            (true, false) => "mail",
            (false, true) => "issueTracker",
            (false, false) => "none",
        }
        .to_string()
    }
}
