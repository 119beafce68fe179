use std::fmt::{Display, Formatter};
use std::str::FromStr;

use auditrail_core::{AppError, AppResult, OrganizationId};
use serde::{Deserialize, Serialize};

/// Role a user holds inside one organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipRole {
    /// Organization owner.
    Owner,
    /// Organization administrator.
    Admin,
    /// Compliance reviewer with access to sensitive payloads.
    ComplianceOfficer,
    /// Read and export access without sensitive or technical data.
    Auditor,
    /// Regular member.
    Member,
    /// External guest.
    Guest,
}

impl MembershipRole {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::ComplianceOfficer => "compliance_officer",
            Self::Auditor => "auditor",
            Self::Member => "member",
            Self::Guest => "guest",
        }
    }
}

impl Display for MembershipRole {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for MembershipRole {
    type Err = AppError;

    fn from_str(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "compliance_officer" => Ok(Self::ComplianceOfficer),
            "auditor" => Ok(Self::Auditor),
            "member" => Ok(Self::Member),
            "guest" => Ok(Self::Guest),
            _ => Err(AppError::Validation(format!(
                "unknown membership role '{value}'"
            ))),
        }
    }
}

/// Effective audit capabilities of one user in one organization.
///
/// Derived fresh from membership on every request and never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAuditPermissions {
    organization_id: OrganizationId,
    can_view_audit_logs: bool,
    can_export_audit_logs: bool,
    can_view_system_actions: bool,
    can_view_sensitive_data: bool,
    can_view_technical_data: bool,
}

impl UserAuditPermissions {
    /// Permission set for a user with no membership in the organization.
    #[must_use]
    pub fn none(organization_id: OrganizationId) -> Self {
        Self {
            organization_id,
            can_view_audit_logs: false,
            can_export_audit_logs: false,
            can_view_system_actions: false,
            can_view_sensitive_data: false,
            can_view_technical_data: false,
        }
    }

    /// Maps a membership role to its capability set.
    #[must_use]
    pub fn for_role(organization_id: OrganizationId, role: MembershipRole) -> Self {
        let (view, export, system, sensitive, technical) = match role {
            MembershipRole::Owner | MembershipRole::Admin => (true, true, true, true, true),
            MembershipRole::ComplianceOfficer => (true, true, true, true, false),
            MembershipRole::Auditor => (true, true, true, false, false),
            MembershipRole::Member => (true, false, false, false, false),
            MembershipRole::Guest => (false, false, false, false, false),
        };

        Self {
            organization_id,
            can_view_audit_logs: view,
            can_export_audit_logs: export,
            can_view_system_actions: system,
            can_view_sensitive_data: sensitive,
            can_view_technical_data: technical,
        }
    }

    /// Organization the permissions apply to.
    #[must_use]
    pub fn organization_id(&self) -> OrganizationId {
        self.organization_id
    }

    /// Whether the user may read audit logs at all.
    #[must_use]
    pub fn can_view_audit_logs(&self) -> bool {
        self.can_view_audit_logs
    }

    /// Whether the user may request exports.
    #[must_use]
    pub fn can_export_audit_logs(&self) -> bool {
        self.can_export_audit_logs
    }

    /// Whether events without a human actor are visible.
    #[must_use]
    pub fn can_view_system_actions(&self) -> bool {
        self.can_view_system_actions
    }

    /// Whether sensitive payload fields are returned unmasked.
    #[must_use]
    pub fn can_view_sensitive_data(&self) -> bool {
        self.can_view_sensitive_data
    }

    /// Whether IP address and user agent are returned unmasked.
    #[must_use]
    pub fn can_view_technical_data(&self) -> bool {
        self.can_view_technical_data
    }
}
