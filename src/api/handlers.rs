use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::config::OrgSettings;
use crate::errors::{AppError, ProviderKind};
use crate::join::maintainers::{team_overview, MaintainerContact};
use crate::join::{JoinContext, JoinOutcome};
use crate::models::approval::ApprovalRequestRow;
use crate::models::team::{Requester, TeamRef};
use crate::AppState;

// ── Request DTOs ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RequesterBody {
    pub account_id: i64,
    pub login: String,
    pub display_name: String,
    pub upn: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinRequestBody {
    pub requester: RequesterBody,
    /// Whether the requester is an active member of the org.
    pub org_member: bool,
    pub justification: Option<String>,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApprovalListParams {
    pub team_id: i64,
}

// ── Helpers ──────────────────────────────────────────────────

fn org_settings(state: &AppState, org: &str) -> Result<OrgSettings, AppError> {
    state
        .config
        .org(org)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("organization '{}' is not configured", org)))
}

async fn lookup_team(state: &AppState, org: &OrgSettings, team_id: i64) -> Result<TeamRef, AppError> {
    state
        .services
        .org
        .get_team(&org.org_ref(), team_id)
        .await
        .map_err(|e| AppError::provider(ProviderKind::Org, "get team", e))?
        .ok_or_else(|| AppError::NotFound(format!("team {} not found in {}", team_id, org.name)))
}

/// Body value first, then the `X-Correlation-Id` header, else a fresh id.
fn correlation_id(from_body: Option<String>, headers: &HeaderMap) -> String {
    let non_blank = |c: &str| Some(c.trim().to_string()).filter(|c| !c.is_empty());
    from_body
        .as_deref()
        .and_then(non_blank)
        .or_else(|| {
            headers
                .get("x-correlation-id")
                .and_then(|v| v.to_str().ok())
                .and_then(non_blank)
        })
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /api/v1/orgs/:org/teams/:team_id/join
pub async fn submit_join_request(
    State(state): State<Arc<AppState>>,
    Path((org, team_id)): Path<(String, i64)>,
    headers: HeaderMap,
    Json(body): Json<JoinRequestBody>,
) -> Result<Json<JoinOutcome>, AppError> {
    let org = org_settings(&state, &org)?;
    state
        .pipeline
        .preflight(&org, team_id, body.org_member, body.justification.as_deref())?;
    let team = lookup_team(&state, &org, team_id).await?;

    let ctx = JoinContext {
        requester: Requester {
            account_id: body.requester.account_id,
            login: body.requester.login,
            display_name: body.requester.display_name,
            upn: body.requester.upn,
            org_member: body.org_member,
        },
        org,
        team,
        justification: body.justification,
        correlation_id: correlation_id(body.correlation_id, &headers),
    };

    let outcome = state.pipeline.submit_join_request(ctx).await?;
    Ok(Json(outcome))
}

/// GET /api/v1/orgs/:org/teams/:team_id/maintainers
pub async fn team_maintainers(
    State(state): State<Arc<AppState>>,
    Path((org, team_id)): Path<(String, i64)>,
) -> Result<Json<Vec<MaintainerContact>>, AppError> {
    let org = org_settings(&state, &org)?;
    let team = lookup_team(&state, &org, team_id).await?;

    let contacts = team_overview(
        state.services.org.as_ref(),
        state.services.directory.as_ref(),
        &org.org_ref(),
        &team,
    )
    .await
    .map_err(|e| AppError::provider(ProviderKind::Org, "list team maintainers", e))?;
    Ok(Json(contacts))
}

/// GET /api/v1/approvals?team_id=
pub async fn list_approvals(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ApprovalListParams>,
) -> Result<Json<Vec<ApprovalRequestRow>>, AppError> {
    let rows = state
        .db
        .list_pending_approvals(params.team_id)
        .await
        .map_err(|e| AppError::provider(ProviderKind::Store, "list pending approvals", e))?;
    Ok(Json(rows))
}

/// GET /api/v1/approvals/:id
pub async fn get_approval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApprovalRequestRow>, AppError> {
    state
        .db
        .get_approval_request(id)
        .await
        .map_err(|e| AppError::provider(ProviderKind::Store, "get approval request", e))?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("approval request {} not found", id)))
}
