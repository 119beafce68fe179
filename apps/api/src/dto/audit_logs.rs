use std::collections::BTreeSet;

use auditrail_application::AuditLogPage;
use auditrail_core::{AppError, AppResult, UserId};
use auditrail_domain::{
    AuditLogEntry, AuditLogEntryDetail, AuditLogFilter, DEFAULT_PAGE_SIZE, DateRange,
    SortDirection, SortField,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Query string of the audit log search endpoint.
///
/// An `organization_id` parameter is not declared and therefore ignored; the
/// organization always comes from the authenticated identity.
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogSearchParams {
    pub actor_id: Option<String>,
    /// Comma-separated resource types.
    pub resource_types: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub search: Option<String>,
    pub sort_field: Option<String>,
    pub sort_direction: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl From<AuditLogSearchParams> for AuditLogFilterRequest {
    fn from(params: AuditLogSearchParams) -> Self {
        Self {
            actor_id: params.actor_id,
            resource_types: params
                .resource_types
                .map(|value| value.split(',').map(str::to_owned).collect())
                .unwrap_or_default(),
            date_from: params.date_from,
            date_to: params.date_to,
            search: params.search,
            sort_field: params.sort_field,
            sort_direction: params.sort_direction,
            page: params.page,
            page_size: params.page_size,
        }
    }
}

/// Audit log filter as sent in JSON bodies.
#[derive(Debug, Default, Deserialize, TS)]
#[serde(default)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/audit-log-filter-request.ts"
)]
pub struct AuditLogFilterRequest {
    pub actor_id: Option<String>,
    pub resource_types: Vec<String>,
    /// RFC 3339 timestamp; must be sent together with `date_to`.
    pub date_from: Option<String>,
    /// RFC 3339 timestamp; must be sent together with `date_from`.
    pub date_to: Option<String>,
    pub search: Option<String>,
    /// `timestamp`, `event_type`, `resource_type`, or `actor_id`.
    pub sort_field: Option<String>,
    /// `asc` or `desc`.
    pub sort_direction: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl AuditLogFilterRequest {
    /// Parses the transport values into a domain filter.
    pub fn into_filter(self) -> AppResult<AuditLogFilter> {
        let actor_id = self
            .actor_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(UserId::parse)
            .transpose()?;

        let date_range = match (self.date_from.as_deref(), self.date_to.as_deref()) {
            (None, None) => None,
            (Some(from), Some(to)) => Some(DateRange::new(
                parse_timestamp("date_from", from)?,
                parse_timestamp("date_to", to)?,
            )?),
            _ => {
                return Err(AppError::Validation(
                    "date_from and date_to must be provided together".to_owned(),
                ));
            }
        };

        let sort_field = self
            .sort_field
            .as_deref()
            .map(str::parse::<SortField>)
            .transpose()?
            .unwrap_or_default();
        let sort_direction = self
            .sort_direction
            .as_deref()
            .map(str::parse::<SortDirection>)
            .transpose()?
            .unwrap_or_default();

        Ok(AuditLogFilter {
            organization_id: None,
            actor_id,
            resource_types: self.resource_types.into_iter().collect::<BTreeSet<_>>(),
            date_range,
            search_text: self.search,
            sort_field,
            sort_direction,
            page: self.page.unwrap_or(0),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        })
    }
}

fn parse_timestamp(name: &str, value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| AppError::Validation(format!("invalid {name} value '{value}': {error}")))
}

pub(crate) fn timestamp_label(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// API representation of one audit log entry.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/audit-log-entry-response.ts"
)]
pub struct AuditLogEntryResponse {
    pub id: String,
    pub actor_id: Option<String>,
    pub event_type: String,
    pub resource_type: String,
    pub resource_id: String,
    pub timestamp: String,
    #[ts(type = "unknown")]
    pub payload: Value,
    pub ip_address: Option<String>,
    pub redacted: bool,
}

impl From<AuditLogEntry> for AuditLogEntryResponse {
    fn from(entry: AuditLogEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            actor_id: entry.actor_id.map(|actor_id| actor_id.to_string()),
            event_type: entry.event_type,
            resource_type: entry.resource_type,
            resource_id: entry.resource_id,
            timestamp: timestamp_label(entry.timestamp),
            payload: entry.payload,
            ip_address: entry.ip_address,
            redacted: entry.redacted,
        }
    }
}

/// One page of search results.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/audit-log-page-response.ts"
)]
pub struct AuditLogPageResponse {
    pub entries: Vec<AuditLogEntryResponse>,
    pub page: u32,
    pub page_size: u32,
    #[ts(type = "number")]
    pub total_elements: u64,
    #[ts(type = "number")]
    pub total_pages: u64,
    pub is_first: bool,
    pub is_last: bool,
}

impl From<AuditLogPage> for AuditLogPageResponse {
    fn from(page: AuditLogPage) -> Self {
        Self {
            entries: page
                .entries
                .into_iter()
                .map(AuditLogEntryResponse::from)
                .collect(),
            page: page.page,
            page_size: page.page_size,
            total_elements: page.total_elements,
            total_pages: page.total_pages,
            is_first: page.is_first,
            is_last: page.is_last,
        }
    }
}

/// Entry detail with technical fields and the list of masked paths.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../../packages/api-types/src/generated/audit-log-entry-detail-response.ts"
)]
pub struct AuditLogEntryDetailResponse {
    pub entry: AuditLogEntryResponse,
    pub user_agent: Option<String>,
    pub redacted_fields: Vec<String>,
}

impl From<AuditLogEntryDetail> for AuditLogEntryDetailResponse {
    fn from(detail: AuditLogEntryDetail) -> Self {
        Self {
            entry: AuditLogEntryResponse::from(detail.entry),
            user_agent: detail.user_agent,
            redacted_fields: detail.redacted_fields,
        }
    }
}
