//! Org and team membership, as seen by the join workflow.

use async_trait::async_trait;

use crate::models::team::{Maintainer, MembershipRole, OrgRef, TeamRef};

/// Abstraction over the membership backend.
/// Implementations: GitHubOrgs (REST API + corporate links).
#[async_trait]
pub trait OrgMembership: Send + Sync {
    async fn get_team(&self, org: &OrgRef, team_id: i64) -> anyhow::Result<Option<TeamRef>>;

    /// Fails only when the backend cannot be reached.
    async fn is_member(&self, org: &OrgRef, team: &TeamRef, login: &str) -> anyhow::Result<bool>;

    /// Idempotent from the caller's side.
    async fn add_membership(
        &self,
        org: &OrgRef,
        team: &TeamRef,
        login: &str,
        role: MembershipRole,
    ) -> anyhow::Result<()>;

    /// Designated maintainers; entries may lack a corporate link.
    async fn official_maintainers(
        &self,
        org: &OrgRef,
        team: &TeamRef,
    ) -> anyhow::Result<Vec<Maintainer>>;
}
