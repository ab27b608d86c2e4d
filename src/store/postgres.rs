use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ApprovalStore, LinkStore};
use crate::models::approval::{ApprovalPatch, ApprovalRequest, ApprovalRequestRow};
use crate::models::team::CorporateLink;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // -- Approval Reads --

    pub async fn get_approval_request(
        &self,
        request_id: Uuid,
    ) -> anyhow::Result<Option<ApprovalRequestRow>> {
        let row = sqlx::query_as::<_, ApprovalRequestRow>(
            "SELECT * FROM approval_requests WHERE id = $1",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Requests that are finalized but not yet decided by a reviewer.
    pub async fn list_pending_approvals(
        &self,
        team_id: i64,
    ) -> anyhow::Result<Vec<ApprovalRequestRow>> {
        let rows = sqlx::query_as::<_, ApprovalRequestRow>(
            "SELECT * FROM approval_requests WHERE team_id = $1 AND active = TRUE ORDER BY requested_at ASC",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl LinkStore for PgStore {
    async fn links_for_logins(&self, logins: &[String]) -> anyhow::Result<Vec<CorporateLink>> {
        if logins.is_empty() {
            return Ok(Vec::new());
        }
        let lowered: Vec<String> = logins.iter().map(|l| l.to_lowercase()).collect();
        let rows = sqlx::query_as::<_, CorporateLink>(
            r#"SELECT github_login, github_id, corporate_upn, corporate_display_name
               FROM corporate_links WHERE LOWER(github_login) = ANY($1)"#,
        )
        .bind(&lowered)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl ApprovalStore for PgStore {
    async fn insert_approval_request(
        &self,
        team_id: i64,
        record: &ApprovalRequest,
    ) -> anyhow::Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"INSERT INTO approval_requests
                 (request_type, requester_account_id, requester_login, requester_name, requester_email,
                  justification, requested_at, active, org_id, org_name, team_id, team_name)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
               RETURNING id"#,
        )
        .bind(record.request_type)
        .bind(record.requester_account_id)
        .bind(&record.requester_login)
        .bind(&record.requester_name)
        .bind(&record.requester_email)
        .bind(&record.justification)
        .bind(record.requested_at)
        .bind(record.active)
        .bind(record.org_id)
        .bind(&record.org_name)
        .bind(team_id)
        .bind(&record.team_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("insert_approval_request failed: {:?}", e);
            e
        })?;
        Ok(id)
    }

    async fn update_approval_request(
        &self,
        request_id: Uuid,
        patch: &ApprovalPatch,
    ) -> anyhow::Result<()> {
        let result = sqlx::query(
            r#"UPDATE approval_requests SET
                 active = COALESCE($2, active),
                 issue_ref_id = COALESCE($3, issue_ref_id),
                 issue_number = COALESCE($4, issue_number),
                 mail_sent_to_approvers = COALESCE($5, mail_sent_to_approvers),
                 mail_sent_to_requester = COALESCE($6, mail_sent_to_requester)
               WHERE id = $1"#,
        )
        .bind(request_id)
        .bind(patch.active)
        .bind(patch.issue_ref_id)
        .bind(patch.issue_number)
        .bind(&patch.mail_sent_to_approvers)
        .bind(&patch.mail_sent_to_requester)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() != 1 {
            anyhow::bail!("approval request {} not found", request_id);
        }
        Ok(())
    }
}
