use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use auditrail_application::{AuditEventSlice, AuditEventStore, ScopedAuditQuery};
use auditrail_core::{AppError, AppResult, OrganizationId, UserId};
use auditrail_domain::{AuditEvent, SENSITIVE_PAYLOAD_FIELDS, SortDirection, SortField};


/// Predicates shared by the page and count queries.
///
/// The organization predicate is always bound; every other predicate uses the
/// `($n IS NULL OR ...)` form so one statement serves every filter shape.
const SCOPED_PREDICATES: &str = r#"
    organization_id = $1
    AND ($2 OR actor_id IS NOT NULL)
    AND ($3::TIMESTAMPTZ IS NULL OR recorded_at <= $3)
    AND ($4::UUID IS NULL OR actor_id = $4)
    AND (cardinality($5::TEXT[]) = 0 OR resource_type = ANY($5))
    AND ($6::TIMESTAMPTZ IS NULL OR recorded_at >= $6)
    AND ($7::TIMESTAMPTZ IS NULL OR recorded_at <= $7)
    AND (
        $8::TEXT IS NULL
        OR event_type ILIKE $8 ESCAPE '\'
        OR resource_type ILIKE $8 ESCAPE '\'
        OR (
            CASE
                WHEN $9 THEN payload
                ELSE audit_redact_payload(payload, $10::TEXT[])
            END
        )::TEXT ILIKE $8 ESCAPE '\'
    )
"#;

/// PostgreSQL-backed read adapter over the append-only `audit_events` table.
#[derive(Clone)]
pub struct PostgresAuditEventStore {
    pool: PgPool,
}

impl PostgresAuditEventStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends one event. Used by producers and seeding; rows are never updated.
    pub async fn append(&self, event: &AuditEvent) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_events (
                id,
                organization_id,
                actor_id,
                event_type,
                resource_type,
                resource_id,
                recorded_at,
                payload,
                ip_address,
                user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id)
        .bind(event.organization_id.as_uuid())
        .bind(event.actor_id.map(|actor_id| actor_id.as_uuid()))
        .bind(event.event_type.as_str())
        .bind(event.resource_type.as_str())
        .bind(event.resource_id.as_str())
        .bind(event.timestamp)
        .bind(&event.payload)
        .bind(event.ip_address.as_deref())
        .bind(event.user_agent.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to append audit event '{}': {error}", event.id))
        })?;

        Ok(())
    }

    async fn count(&self, query: &ScopedAuditQuery) -> AppResult<u64> {
        let statement = format!("SELECT COUNT(*) FROM audit_events WHERE {SCOPED_PREDICATES}");
        let (total,) = bind_predicates(sqlx::query_as::<_, (i64,)>(statement.as_str()), query)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to count audit events: {error}"))
            })?;

        Ok(u64::try_from(total).unwrap_or(0))
    }
}

#[derive(Debug, FromRow)]
struct AuditEventRow {
    id: Uuid,
    organization_id: Uuid,
    actor_id: Option<Uuid>,
    event_type: String,
    resource_type: String,
    resource_id: String,
    recorded_at: DateTime<Utc>,
    payload: Value,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

#[derive(Debug, FromRow)]
struct CountedAuditEventRow {
    #[sqlx(flatten)]
    event: AuditEventRow,
    total_count: i64,
}

impl From<AuditEventRow> for AuditEvent {
    fn from(row: AuditEventRow) -> Self {
        Self {
            id: row.id,
            organization_id: OrganizationId::from_uuid(row.organization_id),
            actor_id: row.actor_id.map(UserId::from_uuid),
            event_type: row.event_type,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            timestamp: row.recorded_at,
            payload: row.payload,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
        }
    }
}

#[async_trait]
impl AuditEventStore for PostgresAuditEventStore {
    async fn query(&self, query: &ScopedAuditQuery) -> AppResult<AuditEventSlice> {
        let limit = i64::from(query.filter.page_size);
        let offset = i64::try_from(query.filter.offset()).map_err(|error| {
            AppError::Validation(format!("audit log page offset is too large: {error}"))
        })?;

        let statement = format!(
            r#"
            SELECT
                id,
                organization_id,
                actor_id,
                event_type,
                resource_type,
                resource_id,
                recorded_at,
                payload,
                ip_address,
                user_agent,
                COUNT(*) OVER () AS total_count
            FROM audit_events
            WHERE {SCOPED_PREDICATES}
            ORDER BY {}
            LIMIT $11
            OFFSET $12
            "#,
            order_by_clause(query.filter.sort_field, query.filter.sort_direction)
        );

        let rows = bind_predicates(
            sqlx::query_as::<_, CountedAuditEventRow>(statement.as_str()),
            query,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to query audit events for organization '{}': {error}",
                query.organization_id
            ))
        })?;

        let total = match rows.first() {
            Some(row) => u64::try_from(row.total_count).unwrap_or(0),
            None if offset > 0 => self.count(query).await?,
            None => 0,
        };

        Ok(AuditEventSlice {
            events: rows.into_iter().map(|row| row.event.into()).collect(),
            total,
        })
    }

    async fn find_by_id(
        &self,
        organization_id: OrganizationId,
        event_id: Uuid,
    ) -> AppResult<Option<AuditEvent>> {
        let row = sqlx::query_as::<_, AuditEventRow>(
            r#"
            SELECT
                id,
                organization_id,
                actor_id,
                event_type,
                resource_type,
                resource_id,
                recorded_at,
                payload,
                ip_address,
                user_agent
            FROM audit_events
            WHERE organization_id = $1
              AND id = $2
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load audit event: {error}")))?;

        Ok(row.map(AuditEvent::from))
    }
}

/// Binds `$1..$10` of [`SCOPED_PREDICATES`].
fn bind_predicates<'q, O>(
    statement: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    query: &ScopedAuditQuery,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    let filter = &query.filter;
    let resource_types: Vec<String> = filter.resource_types.iter().cloned().collect();
    let sensitive_keys: Vec<String> = SENSITIVE_PAYLOAD_FIELDS
        .iter()
        .map(|field| (*field).to_owned())
        .collect();

    statement
        .bind(query.organization_id.as_uuid())
        .bind(query.include_system_actions)
        .bind(query.recorded_before)
        .bind(filter.actor_id.map(|actor_id| actor_id.as_uuid()))
        .bind(resource_types)
        .bind(filter.date_range.as_ref().map(|range| range.from))
        .bind(filter.date_range.as_ref().map(|range| range.to))
        .bind(filter.search_text.as_deref().map(like_pattern))
        .bind(query.include_sensitive_search)
        .bind(sensitive_keys)
}

/// Whitelisted ordering: `(sort_field, recorded_at, id)` in one direction.
///
/// Text keys use the byte-order collation and absent actors sort first
/// ascending, matching the in-process comparator.
fn order_by_clause(field: SortField, direction: SortDirection) -> &'static str {
    match (field, direction) {
        (SortField::Timestamp, SortDirection::Asc) => "recorded_at ASC, id ASC",
        (SortField::Timestamp, SortDirection::Desc) => "recorded_at DESC, id DESC",
        (SortField::EventType, SortDirection::Asc) => {
            "event_type COLLATE \"C\" ASC, recorded_at ASC, id ASC"
        }
        (SortField::EventType, SortDirection::Desc) => {
            "event_type COLLATE \"C\" DESC, recorded_at DESC, id DESC"
        }
        (SortField::ResourceType, SortDirection::Asc) => {
            "resource_type COLLATE \"C\" ASC, recorded_at ASC, id ASC"
        }
        (SortField::ResourceType, SortDirection::Desc) => {
            "resource_type COLLATE \"C\" DESC, recorded_at DESC, id DESC"
        }
        (SortField::Actor, SortDirection::Asc) => {
            "actor_id ASC NULLS FIRST, recorded_at ASC, id ASC"
        }
        (SortField::Actor, SortDirection::Desc) => {
            "actor_id DESC NULLS LAST, recorded_at DESC, id DESC"
        }
    }
}

/// Escapes LIKE metacharacters and wraps the needle for a contains match.
fn like_pattern(search_text: &str) -> String {
    let mut pattern = String::with_capacity(search_text.len() + 2);
    pattern.push('%');
    for character in search_text.chars() {
        if matches!(character, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(character);
    }
    pattern.push('%');
    pattern
}
