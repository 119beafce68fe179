use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use auditrail_application::ExportPipelineConfig;
use auditrail_core::{AppError, AppResult};
use tracing_subscriber::EnvFilter;

const MIN_GATEWAY_SECRET_LENGTH: usize = 32;

/// Where audit events, jobs, and artifacts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres { database_url: String },
    Memory,
}

/// Whether this process also runs the export worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    Embedded,
    External,
}

/// Command selected by the first CLI argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiCommand {
    Serve,
    Migrate,
    Seed,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub command: ApiCommand,
    pub storage_backend: StorageBackend,
    pub redis_url: Option<String>,
    pub api_host: String,
    pub api_port: u16,
    pub frontend_url: String,
    pub gateway_shared_secret: String,
    pub worker_mode: WorkerMode,
    pub storage_path: String,
    pub pipeline: ExportPipelineConfig,
}

impl ApiConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(env::args().nth(1).as_deref(), |name| env::var(name).ok())
    }

    pub fn from_lookup<F>(command: Option<&str>, lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let command = match command {
            None | Some("serve") => ApiCommand::Serve,
            Some("migrate") => ApiCommand::Migrate,
            Some("seed") => ApiCommand::Seed,
            Some(other) => {
                return Err(AppError::Validation(format!(
                    "unknown command '{other}', expected 'serve', 'migrate', or 'seed'"
                )));
            }
        };

        let storage_backend = match non_empty("AUDIT_STORAGE_BACKEND")
            .unwrap_or_else(|| "postgres".to_owned())
            .as_str()
        {
            "postgres" => StorageBackend::Postgres {
                database_url: non_empty("DATABASE_URL")
                    .ok_or_else(|| AppError::Validation("DATABASE_URL is required".to_owned()))?,
            },
            "memory" => StorageBackend::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "AUDIT_STORAGE_BACKEND must be either 'postgres' or 'memory', got '{other}'"
                )));
            }
        };

        let worker_mode = match non_empty("EXPORT_WORKER_MODE")
            .unwrap_or_else(|| "embedded".to_owned())
            .as_str()
        {
            "embedded" => WorkerMode::Embedded,
            "external" => WorkerMode::External,
            other => {
                return Err(AppError::Validation(format!(
                    "EXPORT_WORKER_MODE must be either 'embedded' or 'external', got '{other}'"
                )));
            }
        };

        if storage_backend == StorageBackend::Memory && worker_mode == WorkerMode::External {
            return Err(AppError::Validation(
                "EXPORT_WORKER_MODE=external requires AUDIT_STORAGE_BACKEND=postgres".to_owned(),
            ));
        }

        if storage_backend == StorageBackend::Memory && command == ApiCommand::Migrate {
            return Err(AppError::Validation(
                "the migrate command requires AUDIT_STORAGE_BACKEND=postgres".to_owned(),
            ));
        }

        let gateway_shared_secret = non_empty("GATEWAY_SHARED_SECRET")
            .ok_or_else(|| AppError::Validation("GATEWAY_SHARED_SECRET is required".to_owned()))?;
        if gateway_shared_secret.len() < MIN_GATEWAY_SECRET_LENGTH {
            return Err(AppError::Validation(format!(
                "GATEWAY_SHARED_SECRET must be at least {MIN_GATEWAY_SECRET_LENGTH} characters"
            )));
        }

        let api_port = match non_empty("API_PORT") {
            Some(value) => value.parse::<u16>().map_err(|error| {
                AppError::Validation(format!("invalid API_PORT value '{value}': {error}"))
            })?,
            None => 3001,
        };

        Ok(Self {
            command,
            storage_backend,
            redis_url: non_empty("REDIS_URL"),
            api_host: non_empty("API_HOST").unwrap_or_else(|| "127.0.0.1".to_owned()),
            api_port,
            frontend_url: non_empty("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_owned()),
            gateway_shared_secret,
            worker_mode,
            storage_path: non_empty("EXPORT_STORAGE_PATH")
                .unwrap_or_else(|| "./exports".to_owned()),
            pipeline: ExportPipelineConfig::from_lookup(&lookup)?,
        })
    }

    pub fn storage_backend_label(&self) -> &'static str {
        match self.storage_backend {
            StorageBackend::Postgres { .. } => "postgres",
            StorageBackend::Memory => "memory",
        }
    }

    pub fn socket_address(&self) -> AppResult<SocketAddr> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use auditrail_core::AppError;

    use super::{ApiCommand, ApiConfig, StorageBackend, WorkerMode};

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn load(command: Option<&str>, values: &[(&str, &str)]) -> Result<ApiConfig, AppError> {
        let values: HashMap<String, String> = values
            .iter()
            .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
            .collect();
        ApiConfig::from_lookup(command, |name| values.get(name).cloned())
    }

    #[test]
    fn postgres_backend_requires_a_database_url() {
        let result = load(None, &[("GATEWAY_SHARED_SECRET", SECRET)]);
        assert!(matches!(result, Err(AppError::Validation(message)) if message.contains("DATABASE_URL")));
    }

    #[test]
    fn memory_backend_defaults_to_an_embedded_worker() {
        let config = load(
            None,
            &[
                ("AUDIT_STORAGE_BACKEND", "memory"),
                ("GATEWAY_SHARED_SECRET", SECRET),
            ],
        )
        .unwrap_or_else(|_| unreachable!());

        assert_eq!(config.command, ApiCommand::Serve);
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.worker_mode, WorkerMode::Embedded);
        assert_eq!(config.api_port, 3001);
        assert_eq!(config.pipeline.max_per_hour, 10);
    }

    #[test]
    fn memory_backend_rejects_an_external_worker() {
        let result = load(
            None,
            &[
                ("AUDIT_STORAGE_BACKEND", "memory"),
                ("EXPORT_WORKER_MODE", "external"),
                ("GATEWAY_SHARED_SECRET", SECRET),
            ],
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn short_gateway_secret_is_rejected() {
        let result = load(
            Some("migrate"),
            &[
                ("DATABASE_URL", "postgres://localhost/auditrail"),
                ("GATEWAY_SHARED_SECRET", "short"),
            ],
        );
        assert!(matches!(result, Err(AppError::Validation(message)) if message.contains("GATEWAY_SHARED_SECRET")));
    }

    #[test]
    fn unknown_command_is_rejected() {
        let result = load(
            Some("serve-forever"),
            &[
                ("AUDIT_STORAGE_BACKEND", "memory"),
                ("GATEWAY_SHARED_SECRET", SECRET),
            ],
        );
        assert!(result.is_err());
    }
}
