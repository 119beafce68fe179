use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::str::FromStr;

use auditrail_core::{AppError, AppResult, OrganizationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit_event::AuditEvent;

/// Upper bound for a single page of audit entries.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Page size used when the caller does not supply one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Maximum accepted free-text search length, in characters.
pub const MAX_SEARCH_TEXT_LENGTH: usize = 255;

/// Inclusive timestamp window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Earliest accepted timestamp.
    pub from: DateTime<Utc>,
    /// Latest accepted timestamp.
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// Creates a validated range.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> AppResult<Self> {
        let range = Self { from, to };
        range.validate()?;
        Ok(range)
    }

    fn validate(&self) -> AppResult<()> {
        if self.from > self.to {
            return Err(AppError::Validation(
                "date range start must not be after its end".to_owned(),
            ));
        }

        Ok(())
    }

    /// Returns whether the timestamp falls inside the range.
    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.from <= timestamp && timestamp <= self.to
    }
}

/// Primary sort key for audit queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Event timestamp.
    #[default]
    Timestamp,
    /// Event type label.
    EventType,
    /// Resource type label.
    ResourceType,
    /// Acting user, system events first in ascending order.
    #[serde(rename = "actor_id")]
    Actor,
}

impl SortField {
    /// Returns the transport value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::EventType => "event_type",
            Self::ResourceType => "resource_type",
            Self::Actor => "actor_id",
        }
    }
}

impl FromStr for SortField {
    type Err = AppError;

    fn from_str(value: &str) -> AppResult<Self> {
        match value.trim() {
            "timestamp" => Ok(Self::Timestamp),
            "event_type" => Ok(Self::EventType),
            "resource_type" => Ok(Self::ResourceType),
            "actor_id" | "actor" => Ok(Self::Actor),
            _ => Err(AppError::Validation(format!("unknown sort field '{value}'"))),
        }
    }
}

/// Sort direction for audit queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Smallest first.
    Asc,
    /// Largest first.
    #[default]
    Desc,
}

impl SortDirection {
    /// Returns the transport value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = AppError;

    fn from_str(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(AppError::Validation(format!(
                "unknown sort direction '{value}'"
            ))),
        }
    }
}

/// Filter, sort, and page request for audit log reads.
///
/// `organization_id` is advisory only. The query engine replaces it with the
/// caller's organization before any read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogFilter {
    /// Tenant scope, always overwritten from the caller's permissions.
    pub organization_id: Option<OrganizationId>,
    /// Exact actor filter.
    pub actor_id: Option<UserId>,
    /// Accepted resource types; empty means any.
    pub resource_types: BTreeSet<String>,
    /// Inclusive timestamp window.
    pub date_range: Option<DateRange>,
    /// Case-insensitive free text over event type, resource type, and payload.
    pub search_text: Option<String>,
    /// Primary sort key.
    pub sort_field: SortField,
    /// Sort direction applied to every key.
    pub sort_direction: SortDirection,
    /// Zero-based page number.
    pub page: u32,
    /// Entries per page.
    pub page_size: u32,
}

impl Default for AuditLogFilter {
    fn default() -> Self {
        Self {
            organization_id: None,
            actor_id: None,
            resource_types: BTreeSet::new(),
            date_range: None,
            search_text: None,
            sort_field: SortField::default(),
            sort_direction: SortDirection::default(),
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl AuditLogFilter {
    /// Trims free-form inputs and validates the result.
    pub fn normalized(mut self) -> AppResult<Self> {
        self.search_text = self
            .search_text
            .map(|text| text.trim().to_owned())
            .filter(|text| !text.is_empty());
        self.resource_types = self
            .resource_types
            .into_iter()
            .map(|resource_type| resource_type.trim().to_owned())
            .filter(|resource_type| !resource_type.is_empty())
            .collect();

        self.validate()?;
        Ok(self)
    }

    /// Checks page bounds, search length, and date range ordering.
    pub fn validate(&self) -> AppResult<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(AppError::Validation(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        if let Some(search_text) = &self.search_text
            && search_text.chars().count() > MAX_SEARCH_TEXT_LENGTH
        {
            return Err(AppError::Validation(format!(
                "search text must be at most {MAX_SEARCH_TEXT_LENGTH} characters"
            )));
        }

        if let Some(date_range) = &self.date_range {
            date_range.validate()?;
        }

        Ok(())
    }

    /// Returns a copy bound to the given organization.
    #[must_use]
    pub fn scoped_to(mut self, organization_id: OrganizationId) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    /// Returns a copy positioned at another page with another size.
    #[must_use]
    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    /// Row offset of the requested page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.page_size)
    }

    /// Evaluates the exact filters and the free-text search against one event.
    ///
    /// Tenant scope and system-action visibility are not checked here.
    #[must_use]
    pub fn matches(&self, event: &AuditEvent, include_sensitive: bool) -> bool {
        if let Some(actor_id) = self.actor_id
            && event.actor_id != Some(actor_id)
        {
            return false;
        }

        if !self.resource_types.is_empty() && !self.resource_types.contains(&event.resource_type)
        {
            return false;
        }

        if let Some(date_range) = &self.date_range
            && !date_range.contains(event.timestamp)
        {
            return false;
        }

        match &self.search_text {
            Some(search_text) => {
                event.matches_search(search_text.to_lowercase().as_str(), include_sensitive)
            }
            None => true,
        }
    }

    /// Total order over events for this filter: `(sort_field, timestamp, id)`
    /// in the requested direction.
    #[must_use]
    pub fn compare(&self, left: &AuditEvent, right: &AuditEvent) -> Ordering {
        let primary = match self.sort_field {
            SortField::Timestamp => Ordering::Equal,
            SortField::EventType => left.event_type.cmp(&right.event_type),
            SortField::ResourceType => left.resource_type.cmp(&right.resource_type),
            SortField::Actor => left.actor_id.cmp(&right.actor_id),
        };

        let ordering = primary
            .then_with(|| left.timestamp.cmp(&right.timestamp))
            .then_with(|| left.id.cmp(&right.id));

        match self.sort_direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}
