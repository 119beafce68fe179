use serde::{Deserialize, Serialize};

use crate::{OrganizationId, UserId};

/// Caller identity asserted by the authenticated gateway.
///
/// The organization is the one bound to the session, never one taken from a
/// request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    user_id: UserId,
    organization_id: OrganizationId,
}

impl UserIdentity {
    /// Creates a user identity from authentication and tenancy data.
    #[must_use]
    pub fn new(user_id: UserId, organization_id: OrganizationId) -> Self {
        Self {
            user_id,
            organization_id,
        }
    }

    /// Returns the authenticated user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the organization bound to the session.
    #[must_use]
    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }
}
