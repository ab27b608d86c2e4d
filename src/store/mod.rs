pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::approval::{ApprovalPatch, ApprovalRequest};
use crate::models::team::CorporateLink;

/// Durable record of approval requests.
/// Implementations: PgStore (Postgres); tests use an in-memory recorder.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Insert a new request and return its generated id.
    async fn insert_approval_request(
        &self,
        team_id: i64,
        record: &ApprovalRequest,
    ) -> anyhow::Result<Uuid>;

    /// Merge `patch` into the single request identified by `request_id`.
    async fn update_approval_request(
        &self,
        request_id: Uuid,
        patch: &ApprovalPatch,
    ) -> anyhow::Result<()>;
}

/// Source of corporate identity links for tracker accounts.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Links for the given logins (case-insensitive). Unlinked logins are absent.
    async fn links_for_logins(&self, logins: &[String]) -> anyhow::Result<Vec<CorporateLink>>;
}
