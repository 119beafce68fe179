use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use proptest::prelude::*;

use auditrail_core::{AppError, OrganizationId, UserId};
use auditrail_domain::{
    AuditLogFilter, MembershipRole, REDACTION_PLACEHOLDER, SortDirection, SortField,
    UserAuditPermissions,
};

use super::AuditQueryService;
use crate::test_support::{FakeEventStore, base_time, event_at};

fn permissions(organization_id: OrganizationId, role: MembershipRole) -> UserAuditPermissions {
    UserAuditPermissions::for_role(organization_id, role)
}

#[tokio::test]
async fn search_is_confined_to_the_callers_organization() {
    let organization_a = OrganizationId::new();
    let organization_b = OrganizationId::new();
    let actor = Some(UserId::new());
    let store = FakeEventStore::with_events(vec![
        event_at(organization_a, actor, "project.created", 1),
        event_at(organization_b, actor, "project.created", 2),
        event_at(organization_b, actor, "project.deleted", 3),
    ]);
    let service = AuditQueryService::new(Arc::new(store));

    let filter = AuditLogFilter {
        organization_id: Some(organization_b),
        ..AuditLogFilter::default()
    };
    let page = service
        .search(&permissions(organization_a, MembershipRole::Owner), filter)
        .await;

    let page = page.unwrap_or_else(|_| unreachable!());
    assert_eq!(page.total_elements, 1);
    assert!(
        page.entries
            .iter()
            .all(|entry| entry.organization_id == organization_a)
    );
}

#[tokio::test]
async fn missing_view_capability_wins_over_a_malformed_filter() {
    let organization_id = OrganizationId::new();
    let service = AuditQueryService::new(Arc::new(FakeEventStore::default()));
    let malformed = AuditLogFilter::default().with_page(0, 0);

    let result = service
        .search(&permissions(organization_id, MembershipRole::Guest), malformed)
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn search_requires_view_capability() {
    let organization_id = OrganizationId::new();
    let service = AuditQueryService::new(Arc::new(FakeEventStore::default()));

    let result = service
        .search(
            &permissions(organization_id, MembershipRole::Guest),
            AuditLogFilter::default(),
        )
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn invalid_filters_are_rejected() {
    let organization_id = OrganizationId::new();
    let service = AuditQueryService::new(Arc::new(FakeEventStore::default()));

    let result = service
        .search(
            &permissions(organization_id, MembershipRole::Owner),
            AuditLogFilter::default().with_page(0, 0),
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn member_never_sees_system_actions_or_raw_sensitive_fields() {
    let organization_id = OrganizationId::new();
    let store = FakeEventStore::with_events(vec![
        event_at(organization_id, None, "retention.purged", 1),
        event_at(organization_id, Some(UserId::new()), "api_key.rotated", 2),
    ]);
    let service = AuditQueryService::new(Arc::new(store));

    let page = service
        .search(
            &permissions(organization_id, MembershipRole::Member),
            AuditLogFilter::default(),
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(page.total_elements, 1);
    for entry in &page.entries {
        assert!(entry.actor_id.is_some());
        assert_eq!(entry.payload["api_key"], REDACTION_PLACEHOLDER);
        assert_eq!(entry.ip_address.as_deref(), Some(REDACTION_PLACEHOLDER));
        assert!(!entry.payload.to_string().contains("sk-live-123"));
    }
}

#[tokio::test]
async fn detail_of_foreign_entry_is_not_found() {
    let organization_a = OrganizationId::new();
    let organization_b = OrganizationId::new();
    let foreign = event_at(organization_b, Some(UserId::new()), "user.login", 1);
    let foreign_id = foreign.id;
    let service = AuditQueryService::new(Arc::new(FakeEventStore::with_events(vec![foreign])));

    let result = service
        .get_detail(&permissions(organization_a, MembershipRole::Owner), foreign_id)
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn detail_hides_system_entries_from_members() {
    let organization_id = OrganizationId::new();
    let system_event = event_at(organization_id, None, "retention.purged", 1);
    let system_event_id = system_event.id;
    let service =
        AuditQueryService::new(Arc::new(FakeEventStore::with_events(vec![system_event])));

    let member = service
        .get_detail(
            &permissions(organization_id, MembershipRole::Member),
            system_event_id,
        )
        .await;
    let officer = service
        .get_detail(
            &permissions(organization_id, MembershipRole::ComplianceOfficer),
            system_event_id,
        )
        .await;

    assert!(matches!(member, Err(AppError::NotFound(_))));
    let officer = officer.unwrap_or_else(|_| unreachable!());
    assert_eq!(officer.entry.payload["api_key"], "sk-live-123");
    assert_eq!(officer.user_agent.as_deref(), Some(REDACTION_PLACEHOLDER));
}

#[tokio::test]
async fn page_metadata_reflects_totals() {
    let organization_id = OrganizationId::new();
    let actor = Some(UserId::new());
    let events = (0..5)
        .map(|minute| event_at(organization_id, actor, "report.viewed", minute))
        .collect();
    let service = AuditQueryService::new(Arc::new(FakeEventStore::with_events(events)));
    let owner = permissions(organization_id, MembershipRole::Owner);

    let last = service
        .search(&owner, AuditLogFilter::default().with_page(2, 2))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(last.total_pages, 3);
    assert_eq!(last.entries.len(), 1);
    assert!(last.is_last);
    assert!(!last.is_first);
}

#[tokio::test]
async fn rows_leaking_from_the_store_fail_closed() {
    let organization_a = OrganizationId::new();
    let store = FakeEventStore::with_events(vec![event_at(
        OrganizationId::new(),
        Some(UserId::new()),
        "user.login",
        1,
    )]);
    store.leak_foreign_rows();
    let service = AuditQueryService::new(Arc::new(store));

    let result = service
        .search(
            &permissions(organization_a, MembershipRole::Owner),
            AuditLogFilter::default(),
        )
        .await;

    assert!(matches!(result, Err(AppError::Internal(_))));
}

#[tokio::test]
async fn export_collection_batches_and_respects_cutoff() {
    let organization_id = OrganizationId::new();
    let actor = Some(UserId::new());
    let events = (0..8)
        .map(|minute| event_at(organization_id, actor, "invoice.sent", minute))
        .collect();
    let service = AuditQueryService::new(Arc::new(FakeEventStore::with_events(events)));
    let owner = permissions(organization_id, MembershipRole::Owner);

    let collected = service
        .collect_for_export(
            &owner,
            &AuditLogFilter::default(),
            base_time() + Duration::minutes(6),
            3,
            100,
        )
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(collected.len(), 7);
    let unique: HashSet<_> = collected.iter().map(|entry| entry.id).collect();
    assert_eq!(unique.len(), 7);
}

#[tokio::test]
async fn export_collection_rejects_oversized_result_sets() {
    let organization_id = OrganizationId::new();
    let actor = Some(UserId::new());
    let events = (0..8)
        .map(|minute| event_at(organization_id, actor, "invoice.sent", minute))
        .collect();
    let service = AuditQueryService::new(Arc::new(FakeEventStore::with_events(events)));

    let result = service
        .collect_for_export(
            &permissions(organization_id, MembershipRole::Owner),
            &AuditLogFilter::default(),
            base_time() + Duration::days(1),
            3,
            5,
        )
        .await;

    assert!(matches!(result, Err(AppError::Validation(message)) if message.contains("maximum of 5")));
}

fn sort_field() -> impl Strategy<Value = SortField> {
    prop_oneof![
        Just(SortField::Timestamp),
        Just(SortField::EventType),
        Just(SortField::ResourceType),
        Just(SortField::Actor),
    ]
}

fn sort_direction() -> impl Strategy<Value = SortDirection> {
    prop_oneof![Just(SortDirection::Asc), Just(SortDirection::Desc)]
}

proptest! {
    #[test]
    fn consecutive_pages_are_disjoint_and_ordered(
        minutes in proptest::collection::vec(0_i64..4, 1..40),
        page_size in 1_u32..7,
        field in sort_field(),
        direction in sort_direction(),
    ) {
        let organization_id = OrganizationId::new();
        let actors = [None, Some(UserId::new()), Some(UserId::new())];
        let event_types = ["a.created", "b.updated", "c.deleted"];
        let events: Vec<_> = minutes
            .iter()
            .enumerate()
            .map(|(index, minute)| {
                event_at(
                    organization_id,
                    actors[index % actors.len()],
                    event_types[index % event_types.len()],
                    *minute,
                )
            })
            .collect();
        let expected_total = events.len();
        let service = AuditQueryService::new(Arc::new(FakeEventStore::with_events(events)));
        let owner = permissions(organization_id, MembershipRole::Owner);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap_or_else(|_| unreachable!());

        let mut seen = Vec::new();
        let mut page = 0_u32;
        loop {
            let filter = AuditLogFilter {
                sort_field: field,
                sort_direction: direction,
                ..AuditLogFilter::default()
            }
            .with_page(page, page_size);
            let result = runtime
                .block_on(service.search(&owner, filter))
                .unwrap_or_else(|_| unreachable!());
            seen.extend(result.entries.into_iter().map(|entry| entry.id));
            if result.is_last {
                break;
            }
            page += 1;
        }

        let unique: HashSet<_> = seen.iter().copied().collect();
        prop_assert_eq!(seen.len(), expected_total);
        prop_assert_eq!(unique.len(), expected_total);
    }
}
