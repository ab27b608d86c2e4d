use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod handlers;

/// Build the service API router.
/// All routes are relative; the caller mounts this under `/api/v1`.
pub fn api_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/orgs/:org/teams/:team_id/join",
            post(handlers::submit_join_request),
        )
        .route(
            "/orgs/:org/teams/:team_id/maintainers",
            get(handlers::team_maintainers),
        )
        .route("/approvals", get(handlers::list_approvals))
        .route("/approvals/:id", get(handlers::get_approval))
        .layer(middleware::from_fn_with_state(state, service_auth))
        .layer(TraceLayer::new_for_http())
        .fallback(fallback_404)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Middleware: validates `X-Service-Key` (or a bearer token) against the
/// configured service key. 401 if missing or wrong, 500 if no key is configured.
async fn service_auth(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided_key = req
        .headers()
        .get("x-service-key")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|t| t.trim())
        });

    let expected = state.config.service_key.as_deref().ok_or_else(|| {
        tracing::error!("JOINFLOW_SERVICE_KEY is not set");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    match provided_key {
        Some(k) if k == expected => Ok(next.run(req).await),
        Some(k) => {
            // never log the expected key or the full provided key
            let masked = if k.len() > 8 {
                format!("{}…{}", &k[..4], &k[k.len() - 4..])
            } else {
                "****".to_string()
            };
            tracing::warn!(provided = %masked, "service API: invalid key");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            tracing::warn!("service API: missing X-Service-Key header");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
