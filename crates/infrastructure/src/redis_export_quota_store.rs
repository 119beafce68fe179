//! Redis-backed export quota counters.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::{AsyncCommands, Script};

use auditrail_application::{ExportQuotaLimits, ExportQuotaStore, QuotaReservation};
use auditrail_core::{AppError, AppResult, UserId};
use auditrail_domain::ExportJobId;

const RESERVED: i64 = 0;
const CONCURRENT_LIMIT_REACHED: i64 = 1;
const WINDOW_LIMIT_REACHED: i64 = 2;

const TRY_RESERVE_SCRIPT: &str = r#"
local active_key = KEYS[1]
local submissions_key = KEYS[2]
local job_id = ARGV[1]
local now_ms = tonumber(ARGV[2])
local window_ms = tonumber(ARGV[3])
local max_concurrent = tonumber(ARGV[4])
local max_per_window = tonumber(ARGV[5])

redis.call('ZREMRANGEBYSCORE', submissions_key, '-inf', now_ms - window_ms)

if redis.call('SCARD', active_key) >= max_concurrent then
  return {1, 0}
end

if redis.call('ZCARD', submissions_key) >= max_per_window then
  local oldest = redis.call('ZRANGE', submissions_key, 0, 0, 'WITHSCORES')
  return {2, tonumber(oldest[2])}
end

redis.call('SADD', active_key, job_id)
redis.call('ZADD', submissions_key, now_ms, job_id)
redis.call('PEXPIRE', submissions_key, window_ms)
return {0, 0}
"#;

const ROLLBACK_SCRIPT: &str = r#"
redis.call('SREM', KEYS[1], ARGV[1])
return redis.call('ZREM', KEYS[2], ARGV[1])
"#;

/// Redis implementation of the export quota store.
///
/// Per user, a set holds active job ids and a sorted set holds submissions
/// scored by submission time in milliseconds.
#[derive(Clone)]
pub struct RedisExportQuotaStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisExportQuotaStore {
    /// Creates a store with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn active_key(&self, user_id: UserId) -> String {
        format!("{}:{user_id}:active", self.key_prefix)
    }

    fn submissions_key(&self, user_id: UserId) -> String {
        format!("{}:{user_id}:submissions", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl ExportQuotaStore for RedisExportQuotaStore {
    async fn try_reserve(
        &self,
        user_id: UserId,
        job_id: ExportJobId,
        limits: ExportQuotaLimits,
        now: DateTime<Utc>,
    ) -> AppResult<QuotaReservation> {
        let window_ms = limits.window.num_milliseconds();
        if window_ms <= 0 {
            return Err(AppError::Validation(
                "export quota window must be greater than zero".to_owned(),
            ));
        }

        let mut connection = self.connection().await?;
        let (outcome, oldest_ms): (i64, i64) = Script::new(TRY_RESERVE_SCRIPT)
            .key(self.active_key(user_id))
            .key(self.submissions_key(user_id))
            .arg(job_id.to_string())
            .arg(now.timestamp_millis())
            .arg(window_ms)
            .arg(limits.max_concurrent)
            .arg(limits.max_per_window)
            .invoke_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to reserve redis export quota: {error}"))
            })?;

        match outcome {
            RESERVED => Ok(QuotaReservation::Reserved),
            CONCURRENT_LIMIT_REACHED => Ok(QuotaReservation::ConcurrentLimitReached),
            WINDOW_LIMIT_REACHED => {
                let oldest_submission_at =
                    Utc.timestamp_millis_opt(oldest_ms).single().ok_or_else(|| {
                        AppError::Internal(format!(
                            "invalid redis submission timestamp: {oldest_ms}"
                        ))
                    })?;
                Ok(QuotaReservation::WindowLimitReached {
                    oldest_submission_at,
                })
            }
            other => Err(AppError::Internal(format!(
                "unexpected redis quota outcome: {other}"
            ))),
        }
    }

    async fn release(&self, user_id: UserId, job_id: ExportJobId) -> AppResult<bool> {
        let mut connection = self.connection().await?;
        let removed: i64 = connection
            .srem(self.active_key(user_id), job_id.to_string())
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to release redis export quota for job '{job_id}': {error}"
                ))
            })?;

        Ok(removed > 0)
    }

    async fn rollback(&self, user_id: UserId, job_id: ExportJobId) -> AppResult<()> {
        let mut connection = self.connection().await?;
        Script::new(ROLLBACK_SCRIPT)
            .key(self.active_key(user_id))
            .key(self.submissions_key(user_id))
            .arg(job_id.to_string())
            .invoke_async::<i64>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to roll back redis export quota for job '{job_id}': {error}"
                ))
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use auditrail_application::{ExportQuotaLimits, ExportQuotaStore, QuotaReservation};
    use auditrail_core::UserId;
    use auditrail_domain::ExportJobId;

    use super::RedisExportQuotaStore;

    fn test_store() -> Option<RedisExportQuotaStore> {
        let redis_url = std::env::var("REDIS_URL").ok()?;
        match redis::Client::open(redis_url.as_str()) {
            Ok(client) => Some(RedisExportQuotaStore::new(client, "auditrail-test:quota")),
            Err(error) => panic!("invalid REDIS_URL in test: {error}"),
        }
    }

    #[tokio::test]
    async fn window_cap_reports_the_oldest_submission() {
        let Some(store) = test_store() else {
            return;
        };
        let user_id = UserId::new();
        let limits = ExportQuotaLimits {
            max_concurrent: 5,
            max_per_window: 2,
            window: Duration::hours(1),
        };
        let now = Utc::now();
        let first = now - Duration::minutes(10);

        for (job_id, at) in [(ExportJobId::new(), first), (ExportJobId::new(), now)] {
            let outcome = store.try_reserve(user_id, job_id, limits, at).await;
            assert!(outcome.is_ok_and(|outcome| outcome == QuotaReservation::Reserved));
        }

        let blocked = store
            .try_reserve(user_id, ExportJobId::new(), limits, now)
            .await
            .unwrap_or_else(|_| unreachable!());

        match blocked {
            QuotaReservation::WindowLimitReached {
                oldest_submission_at,
            } => assert_eq!(
                oldest_submission_at.timestamp_millis(),
                first.timestamp_millis()
            ),
            other => panic!("unexpected reservation outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn release_frees_a_slot_once() {
        let Some(store) = test_store() else {
            return;
        };
        let user_id = UserId::new();
        let limits = ExportQuotaLimits {
            max_concurrent: 1,
            max_per_window: 10,
            window: Duration::hours(1),
        };
        let job_id = ExportJobId::new();
        let now = Utc::now();

        assert!(store.try_reserve(user_id, job_id, limits, now).await.is_ok());
        let blocked = store
            .try_reserve(user_id, ExportJobId::new(), limits, now)
            .await;
        assert!(blocked.is_ok_and(|outcome| outcome == QuotaReservation::ConcurrentLimitReached));

        assert!(store.release(user_id, job_id).await.is_ok_and(|freed| freed));
        assert!(store.release(user_id, job_id).await.is_ok_and(|freed| !freed));
        assert!(store.rollback(user_id, job_id).await.is_ok());
    }
}
