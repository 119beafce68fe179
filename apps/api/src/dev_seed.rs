//! Deterministic demo data for local development.

use auditrail_core::{OrganizationId, UserId};
use auditrail_domain::{AuditEvent, MembershipRole};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

const DEV_SEED_ORGANIZATION_ID: u128 = 0x1111_1111_1111_1111_1111_1111_1111_1111;
const DEV_SEED_OTHER_ORGANIZATION_ID: u128 = 0x2222_2222_2222_2222_2222_2222_2222_2222;
const DEV_SEED_OWNER_ID: u128 = 0xa2c8_ea5f_4f39_4724_97f5_932f_97f5_4f76;
const DEV_SEED_COMPLIANCE_ID: u128 = 0x5b1e_0c4d_9a7f_4e21_8d33_6f0a_b2c4_e901;
const DEV_SEED_AUDITOR_ID: u128 = 0x3e6a_4b2c_1d8f_4a90_b7e5_0c9d_2f1a_6b48;
const DEV_SEED_MEMBER_ID: u128 = 0x96d1_1e90_7403_4654_9727_cb10_43f8_bd31;
const DEV_SEED_EVENT_COUNT: u128 = 60;

/// Organization the demo members belong to.
pub fn organization_id() -> OrganizationId {
    OrganizationId::from_uuid(Uuid::from_u128(DEV_SEED_ORGANIZATION_ID))
}

/// Demo memberships, one per role of interest.
pub fn memberships() -> Vec<(UserId, OrganizationId, MembershipRole)> {
    let organization_id = organization_id();
    [
        (DEV_SEED_OWNER_ID, MembershipRole::Owner),
        (DEV_SEED_COMPLIANCE_ID, MembershipRole::ComplianceOfficer),
        (DEV_SEED_AUDITOR_ID, MembershipRole::Auditor),
        (DEV_SEED_MEMBER_ID, MembershipRole::Member),
    ]
    .into_iter()
    .map(|(user_id, role)| {
        (
            UserId::from_uuid(Uuid::from_u128(user_id)),
            organization_id,
            role,
        )
    })
    .collect()
}

/// Demo events: user actions with sensitive payload fields, system actions,
/// and a few events of a second organization.
pub fn events() -> Vec<AuditEvent> {
    let organization_id = organization_id();
    let other_organization_id =
        OrganizationId::from_uuid(Uuid::from_u128(DEV_SEED_OTHER_ORGANIZATION_ID));
    let actors: Vec<Option<UserId>> = memberships()
        .into_iter()
        .map(|(user_id, _, _)| Some(user_id))
        .chain([None])
        .collect();
    let base = seed_base_time();

    (0..DEV_SEED_EVENT_COUNT)
        .map(|index| {
            let slot = usize::try_from(index).unwrap_or_default();
            let (event_type, resource_type, payload) = match slot % 4 {
                0 => (
                    "user.login",
                    "session",
                    json!({"method": "password", "password": "dev-only-secret"}),
                ),
                1 => (
                    "project.updated",
                    "project",
                    json!({"name": format!("Project {slot}"), "changes": {"budget": slot * 100}}),
                ),
                2 => (
                    "integration.configured",
                    "integration",
                    json!({"provider": "billing", "credentials": {"api_key": "sk-dev-0000"}}),
                ),
                _ => (
                    "invoice.sent",
                    "invoice",
                    json!({"amount_cents": slot * 1250, "customer": {"email": "ap@example.com"}}),
                ),
            };
            let organization = if slot % 10 == 9 {
                other_organization_id
            } else {
                organization_id
            };

            AuditEvent {
                id: Uuid::from_u128(0xe000_0000_0000_4000_8000_0000_0000_0000 + index),
                organization_id: organization,
                actor_id: actors[slot % actors.len()],
                event_type: event_type.to_owned(),
                resource_type: resource_type.to_owned(),
                resource_id: format!("{resource_type}-{}", slot % 7),
                timestamp: base + Duration::minutes(i64::try_from(index * 17).unwrap_or_default()),
                payload,
                ip_address: Some(format!("198.51.100.{}", slot % 250 + 1)),
                user_agent: Some("Mozilla/5.0 (X11; Linux x86_64)".to_owned()),
            }
        })
        .collect()
}

fn seed_base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
