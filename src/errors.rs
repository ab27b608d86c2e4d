use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// External collaborator a fatal error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Directory,
    Org,
    Store,
    IssueTracker,
    Mail,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Directory => "directory",
            ProviderKind::Org => "org",
            ProviderKind::Store => "store",
            ProviderKind::IssueTracker => "issue_tracker",
            ProviderKind::Mail => "mail",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    /// User-facing and recoverable; raised before any side effect.
    #[error("{0}")]
    Validation(String),

    #[error("approval configuration error: {0}")]
    Configuration(String),

    #[error("no eligible maintainer can review requests for team '{team}'")]
    NoEligibleReviewer { team: String },

    #[error("{provider} error during {operation}: {source:#}")]
    Provider {
        provider: ProviderKind,
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("malformed {provider} response: {detail}")]
    MalformedResponse {
        provider: ProviderKind,
        detail: String,
    },

    #[error("failed to render mail template '{template}': {reason}")]
    MailRender { template: String, reason: String },

    #[error("not found: {0}")]
    NotFound(String),
}

impl AppError {
    pub fn provider(
        provider: ProviderKind,
        operation: &'static str,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        AppError::Provider {
            provider,
            operation,
            source: source.into(),
        }
    }

    /// Fatal errors abort the pipeline and are reported to telemetry.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AppError::Validation(_) | AppError::NotFound(_) | AppError::Configuration(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_failed",
            AppError::Configuration(_) => "approval_not_configured",
            AppError::NoEligibleReviewer { .. } => "no_eligible_reviewer",
            AppError::Provider { .. } => "provider_failed",
            AppError::MalformedResponse { .. } => "malformed_response",
            AppError::MailRender { .. } => "mail_render_failed",
            AppError::NotFound(_) => "not_found",
        }
    }
}

impl AppError {
    /// Description safe to send off-box: provider and operation only, never
    /// the source chain, which can carry identifiers and upstream bodies.
    pub fn redacted(&self) -> String {
        match self {
            AppError::Provider { provider, operation, .. } => {
                format!("{} error during {}", provider, operation)
            }
            AppError::MalformedResponse { provider, .. } => format!("malformed {} response", provider),
            AppError::MailRender { template, .. } => format!("failed to render mail template '{}'", template),
            AppError::NoEligibleReviewer { .. } => "no eligible maintainer for team".to_string(),
            AppError::Validation(_) => "validation failed".to_string(),
            AppError::Configuration(_) => "approval configuration error".to_string(),
            AppError::NotFound(_) => "not found".to_string(),
        }
    }

    pub fn provider_kind(&self) -> Option<ProviderKind> {
        match self {
            AppError::Provider { provider, .. } | AppError::MalformedResponse { provider, .. } => Some(*provider),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, msg) = match &self {
            AppError::Validation(m) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_request_error",
                m.clone(),
            ),
            AppError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "invalid_request_error",
                self.to_string(),
            ),
            AppError::NoEligibleReviewer { .. } => {
                tracing::warn!("{}", self);
                (StatusCode::CONFLICT, "approval_error", self.to_string())
            }
            AppError::Configuration(m) => {
                tracing::error!("Approval configuration error: {}", m);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "approval_error",
                    "team join requests are not available for this organization".to_string(),
                )
            }
            AppError::Provider { .. }
            | AppError::MalformedResponse { .. }
            | AppError::MailRender { .. } => {
                tracing::error!("Join request failed: {}", self);
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream_error",
                    "your request could not be completed, please try again later".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": self.code(),
            }
        }));

        (status, body).into_response()
    }
}
