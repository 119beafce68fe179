use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use auditrail_application::MembershipRepository;
use auditrail_core::{AppResult, OrganizationId, UserId};
use auditrail_domain::MembershipRole;

/// In-memory organization membership directory.
#[derive(Debug, Default)]
pub struct InMemoryMembershipRepository {
    roles: RwLock<HashMap<(UserId, OrganizationId), MembershipRole>>,
}

impl InMemoryMembershipRepository {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants or replaces a role.
    pub async fn set_role(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        role: MembershipRole,
    ) {
        self.roles
            .write()
            .await
            .insert((user_id, organization_id), role);
    }

    /// Removes a membership.
    pub async fn remove_member(&self, user_id: UserId, organization_id: OrganizationId) {
        self.roles.write().await.remove(&(user_id, organization_id));
    }
}

#[async_trait]
impl MembershipRepository for InMemoryMembershipRepository {
    async fn find_role(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> AppResult<Option<MembershipRole>> {
        Ok(self
            .roles
            .read()
            .await
            .get(&(user_id, organization_id))
            .copied())
    }
}
