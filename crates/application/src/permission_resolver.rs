use std::sync::Arc;

use tracing::warn;

use auditrail_core::{AppError, AppResult, OrganizationId, UserId};
use auditrail_domain::UserAuditPermissions;

use crate::audit_ports::MembershipRepository;

/// Computes audit capabilities from current membership data.
///
/// Results are never cached: every call reads the membership provider, so a
/// revoked role is effective on the next request.
#[derive(Clone)]
pub struct AuditPermissionResolver {
    membership_repository: Arc<dyn MembershipRepository>,
}

impl AuditPermissionResolver {
    /// Creates a resolver over a membership provider.
    #[must_use]
    pub fn new(membership_repository: Arc<dyn MembershipRepository>) -> Self {
        Self {
            membership_repository,
        }
    }

    /// Resolves the caller's capabilities in the organization asserted by the
    /// authenticated session.
    pub async fn resolve(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> AppResult<UserAuditPermissions> {
        let Some(role) = self
            .membership_repository
            .find_role(user_id, organization_id)
            .await?
        else {
            warn!(
                user_id = %user_id,
                organization_id = %organization_id,
                "audit access attempted without organization membership"
            );
            return Err(AppError::Unauthorized(format!(
                "user '{user_id}' is not a member of organization '{organization_id}'"
            )));
        };

        Ok(UserAuditPermissions::for_role(organization_id, role))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use auditrail_core::{AppError, OrganizationId, UserId};
    use auditrail_domain::MembershipRole;

    use super::AuditPermissionResolver;
    use crate::test_support::FakeMembershipRepository;

    #[tokio::test]
    async fn non_member_is_unauthorized() {
        let resolver = AuditPermissionResolver::new(Arc::new(FakeMembershipRepository::default()));

        let result = resolver.resolve(UserId::new(), OrganizationId::new()).await;

        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn role_changes_take_effect_on_next_call() {
        let memberships = Arc::new(FakeMembershipRepository::default());
        let resolver = AuditPermissionResolver::new(memberships.clone());
        let user_id = UserId::new();
        let organization_id = OrganizationId::new();
        memberships
            .set_role(user_id, organization_id, MembershipRole::Admin)
            .await;

        let before = resolver.resolve(user_id, organization_id).await;
        assert!(before.is_ok_and(|permissions| permissions.can_export_audit_logs()));

        memberships
            .set_role(user_id, organization_id, MembershipRole::Member)
            .await;
        let after = resolver.resolve(user_id, organization_id).await;
        assert!(after.is_ok_and(|permissions| !permissions.can_export_audit_logs()));

        memberships.remove(user_id, organization_id).await;
        assert!(matches!(
            resolver.resolve(user_id, organization_id).await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn permissions_are_bound_to_the_requested_organization() {
        let memberships = Arc::new(FakeMembershipRepository::default());
        let resolver = AuditPermissionResolver::new(memberships.clone());
        let user_id = UserId::new();
        let organization_a = OrganizationId::new();
        let organization_b = OrganizationId::new();
        memberships
            .set_role(user_id, organization_a, MembershipRole::Owner)
            .await;

        let permissions = resolver.resolve(user_id, organization_a).await;
        assert!(permissions.is_ok_and(|permissions| permissions.organization_id() == organization_a));
        assert!(resolver.resolve(user_id, organization_b).await.is_err());
    }
}
