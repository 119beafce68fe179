//! Shared primitives for all Rust crates in auditrail.

#![forbid(unsafe_code)]

/// Authentication primitives shared across services.
pub mod auth;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use auth::UserIdentity;

/// Result type used across auditrail crates.
pub type AppResult<T> = Result<T, AppError>;

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID value.
            #[must_use]
            pub fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            /// Parses an identifier from its transport representation.
            pub fn parse(value: &str) -> AppResult<Self> {
                Uuid::parse_str(value.trim()).map(Self).map_err(|error| {
                    AppError::Validation(format!(
                        "invalid {} '{value}': {error}",
                        stringify!($name)
                    ))
                })
            }

            /// Returns the underlying UUID value.
            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Organization identifier used as the partition key for every audit read.
    OrganizationId
);

uuid_identifier!(
    /// Identifier of a platform user.
    UserId
);

/// Why an export submission was refused by admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitReason {
    /// Too many exports are still pending or processing.
    Concurrent,
    /// Too many exports were submitted in the trailing hour.
    Hourly,
}

impl RateLimitReason {
    /// Returns a stable transport value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concurrent => "concurrent",
            Self::Hourly => "hourly",
        }
    }
}

impl Display for RateLimitReason {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Concurrent => formatter.write_str("too many exports are already running"),
            Self::Hourly => formatter.write_str("hourly export limit reached"),
        }
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist or belongs to another organization.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller has no membership in the asserted organization.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is a member but lacks the required capability.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Admission control refused new work; retryable by the caller.
    #[error("rate limited: {reason}")]
    RateLimited {
        /// Which cap was hit.
        reason: RateLimitReason,
        /// Seconds until a retry can succeed, when derivable.
        retry_after_seconds: Option<u64>,
    },

    /// Download token is unknown, expired, or already consumed.
    #[error("download link is invalid or has expired")]
    InvalidToken,

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
