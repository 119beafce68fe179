use async_trait::async_trait;
use sqlx::PgPool;

use auditrail_application::MembershipRepository;
use auditrail_core::{AppError, AppResult, OrganizationId, UserId};
use auditrail_domain::MembershipRole;

/// PostgreSQL-backed organization membership directory.
#[derive(Clone)]
pub struct PostgresMembershipRepository {
    pool: PgPool,
}

impl PostgresMembershipRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Grants or replaces a member's role.
    pub async fn upsert_membership(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        role: MembershipRole,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO organization_memberships (organization_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (organization_id, user_id)
            DO UPDATE SET role = EXCLUDED.role
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to save membership: {error}")))?;

        Ok(())
    }
}

#[async_trait]
impl MembershipRepository for PostgresMembershipRepository {
    async fn find_role(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> AppResult<Option<MembershipRole>> {
        let role = sqlx::query_scalar::<_, String>(
            r#"
            SELECT role
            FROM organization_memberships
            WHERE organization_id = $1
              AND user_id = $2
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to resolve organization membership: {error}"))
        })?;

        role.map(|role| role.parse::<MembershipRole>()).transpose()
    }
}
