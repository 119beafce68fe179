use std::fmt::Display;
use std::str::FromStr;

use chrono::Duration;

use auditrail_core::{AppError, AppResult};
use auditrail_domain::MAX_PAGE_SIZE;

use crate::export_job_service::ExportJobSettings;
use crate::export_ports::ExportQuotaLimits;

const MAX_CONFIGURED_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Tunables of the export pipeline shared by the API and the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPipelineConfig {
    /// Maximum non-terminal exports per user.
    pub max_concurrent_per_user: u32,
    /// Maximum submissions per user in a rolling hour.
    pub max_per_hour: u32,
    /// Jobs rendered at once per worker pool.
    pub worker_concurrency: usize,
    /// Processing time after which the sweep fails a job.
    pub max_processing_seconds: u64,
    /// Delay between recovery sweeps.
    pub sweep_interval_seconds: u64,
    /// Download token lifetime.
    pub download_token_ttl_seconds: u64,
    /// Retention after token expiry or failure.
    pub retention_grace_seconds: u64,
    /// Largest result set an export may contain.
    pub max_records: u64,
    /// Page size used while collecting export rows.
    pub batch_size: u32,
    /// Idle delay between claim attempts.
    pub poll_interval_ms: u64,
}

impl Default for ExportPipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_user: 3,
            max_per_hour: 10,
            worker_concurrency: 2,
            max_processing_seconds: 900,
            sweep_interval_seconds: 60,
            download_token_ttl_seconds: 3600,
            retention_grace_seconds: 86_400,
            max_records: 10_000,
            batch_size: 500,
            poll_interval_ms: 1500,
        }
    }
}

impl ExportPipelineConfig {
    /// Reads the settings through `lookup`, falling back to defaults, and
    /// validates the result.
    ///
    /// Binaries pass `|name| std::env::var(name).ok()`.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            max_concurrent_per_user: parse_setting(
                &lookup,
                "EXPORT_MAX_CONCURRENT",
                defaults.max_concurrent_per_user,
            )?,
            max_per_hour: parse_setting(&lookup, "EXPORT_MAX_PER_HOUR", defaults.max_per_hour)?,
            worker_concurrency: parse_setting(
                &lookup,
                "EXPORT_WORKER_CONCURRENCY",
                defaults.worker_concurrency,
            )?,
            max_processing_seconds: parse_setting(
                &lookup,
                "EXPORT_MAX_PROCESSING_SECONDS",
                defaults.max_processing_seconds,
            )?,
            sweep_interval_seconds: parse_setting(
                &lookup,
                "EXPORT_SWEEP_INTERVAL_SECONDS",
                defaults.sweep_interval_seconds,
            )?,
            download_token_ttl_seconds: parse_setting(
                &lookup,
                "DOWNLOAD_TOKEN_TTL_SECONDS",
                defaults.download_token_ttl_seconds,
            )?,
            retention_grace_seconds: parse_setting(
                &lookup,
                "EXPORT_RETENTION_GRACE_SECONDS",
                defaults.retention_grace_seconds,
            )?,
            max_records: parse_setting(&lookup, "EXPORT_MAX_RECORDS", defaults.max_records)?,
            batch_size: parse_setting(&lookup, "EXPORT_BATCH_SIZE", defaults.batch_size)?,
            poll_interval_ms: parse_setting(
                &lookup,
                "WORKER_POLL_INTERVAL_MS",
                defaults.poll_interval_ms,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> AppResult<()> {
        if self.max_concurrent_per_user == 0 || self.max_per_hour == 0 {
            return Err(AppError::Validation(
                "EXPORT_MAX_CONCURRENT and EXPORT_MAX_PER_HOUR must be greater than zero"
                    .to_owned(),
            ));
        }

        let max_concurrent = usize::try_from(self.max_concurrent_per_user).unwrap_or(usize::MAX);
        if self.worker_concurrency == 0 || self.worker_concurrency >= max_concurrent {
            return Err(AppError::Validation(format!(
                "EXPORT_WORKER_CONCURRENCY must be between 1 and {}",
                max_concurrent.saturating_sub(1)
            )));
        }

        for (name, value) in [
            ("EXPORT_MAX_PROCESSING_SECONDS", self.max_processing_seconds),
            ("EXPORT_SWEEP_INTERVAL_SECONDS", self.sweep_interval_seconds),
            ("DOWNLOAD_TOKEN_TTL_SECONDS", self.download_token_ttl_seconds),
            ("EXPORT_RETENTION_GRACE_SECONDS", self.retention_grace_seconds),
        ] {
            if value == 0 || value > MAX_CONFIGURED_SECONDS {
                return Err(AppError::Validation(format!(
                    "{name} must be between 1 and {MAX_CONFIGURED_SECONDS}"
                )));
            }
        }

        if self.max_records == 0 {
            return Err(AppError::Validation(
                "EXPORT_MAX_RECORDS must be greater than zero".to_owned(),
            ));
        }

        if self.batch_size == 0 || self.batch_size > MAX_PAGE_SIZE {
            return Err(AppError::Validation(format!(
                "EXPORT_BATCH_SIZE must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        if self.poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(())
    }

    /// Per-user admission caps.
    #[must_use]
    pub fn quota_limits(&self) -> ExportQuotaLimits {
        ExportQuotaLimits {
            max_concurrent: self.max_concurrent_per_user,
            max_per_window: self.max_per_hour,
            window: Duration::hours(1),
        }
    }

    /// Job processing settings.
    #[must_use]
    pub fn job_settings(&self) -> ExportJobSettings {
        ExportJobSettings {
            max_records: self.max_records,
            batch_size: self.batch_size,
            max_processing: seconds(self.max_processing_seconds),
            retention_grace: seconds(self.retention_grace_seconds),
        }
    }

    /// Download token lifetime.
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        seconds(self.download_token_ttl_seconds)
    }

    /// Idle delay between claim attempts.
    #[must_use]
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    /// Delay between recovery sweeps.
    #[must_use]
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_seconds)
    }
}

fn parse_setting<F, T>(lookup: &F, name: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

fn seconds(value: u64) -> Duration {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}
