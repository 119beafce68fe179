//! In-process fakes shared by service tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use uuid::Uuid;

use auditrail_core::{AppError, AppResult, OrganizationId, UserId};
use auditrail_domain::{
    AuditEvent, AuditLogEntry, ExportArtifactInfo, ExportFormat, ExportJob, ExportJobId,
    ExportJobStatus, MembershipRole,
};

use crate::audit_ports::{
    AuditEventSlice, AuditEventStore, Clock, MembershipRepository, ScopedAuditQuery,
};
use crate::export_ports::{
    ArtifactStore, DownloadTokenRecord, DownloadTokenRepository, ExportJobRepository,
    ExportQuotaLimits, ExportQuotaStore, ExportRenderer, QuotaReservation,
};

pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .unwrap_or_else(|| unreachable!())
}

pub(crate) fn event_at(
    organization_id: OrganizationId,
    actor_id: Option<UserId>,
    event_type: &str,
    minutes: i64,
) -> AuditEvent {
    AuditEvent {
        id: Uuid::new_v4(),
        organization_id,
        actor_id,
        event_type: event_type.to_owned(),
        resource_type: "project".to_owned(),
        resource_id: format!("project-{minutes}"),
        timestamp: base_time() + Duration::minutes(minutes),
        payload: json!({"api_key": "sk-live-123", "name": "billing"}),
        ip_address: Some("192.0.2.10".to_owned()),
        user_agent: Some("Mozilla/5.0".to_owned()),
    }
}

#[derive(Default)]
pub(crate) struct FakeMembershipRepository {
    roles: Mutex<HashMap<(UserId, OrganizationId), MembershipRole>>,
}

impl FakeMembershipRepository {
    pub(crate) async fn set_role(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
        role: MembershipRole,
    ) {
        self.roles
            .lock()
            .await
            .insert((user_id, organization_id), role);
    }

    pub(crate) async fn remove(&self, user_id: UserId, organization_id: OrganizationId) {
        self.roles.lock().await.remove(&(user_id, organization_id));
    }
}

#[async_trait]
impl MembershipRepository for FakeMembershipRepository {
    async fn find_role(
        &self,
        user_id: UserId,
        organization_id: OrganizationId,
    ) -> AppResult<Option<MembershipRole>> {
        Ok(self
            .roles
            .lock()
            .await
            .get(&(user_id, organization_id))
            .copied())
    }
}

#[derive(Default)]
pub(crate) struct FakeEventStore {
    events: Mutex<Vec<AuditEvent>>,
    leak_foreign_rows: AtomicBool,
}

impl FakeEventStore {
    pub(crate) fn with_events(events: Vec<AuditEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            leak_foreign_rows: AtomicBool::new(false),
        }
    }

    pub(crate) fn leak_foreign_rows(&self) {
        self.leak_foreign_rows.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AuditEventStore for FakeEventStore {
    async fn query(&self, query: &ScopedAuditQuery) -> AppResult<AuditEventSlice> {
        let leak = self.leak_foreign_rows.load(Ordering::SeqCst);
        let mut matching: Vec<AuditEvent> = self
            .events
            .lock()
            .await
            .iter()
            .filter(|event| leak || query.matches(event))
            .cloned()
            .collect();
        matching.sort_by(|left, right| query.filter.compare(left, right));

        let total = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(query.filter.offset()).unwrap_or(usize::MAX);
        let page_size = usize::try_from(query.filter.page_size).unwrap_or(usize::MAX);

        Ok(AuditEventSlice {
            events: matching.into_iter().skip(offset).take(page_size).collect(),
            total,
        })
    }

    async fn find_by_id(
        &self,
        organization_id: OrganizationId,
        event_id: Uuid,
    ) -> AppResult<Option<AuditEvent>> {
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .find(|event| event.id == event_id && event.organization_id == organization_id)
            .cloned())
    }
}

pub(crate) struct ManualClock {
    now: StdMutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(crate) fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: StdMutex::new(now),
        }
    }

    pub(crate) fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += duration;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
pub(crate) struct FakeArtifactStore {
    artifacts: Mutex<HashMap<String, Vec<u8>>>,
    fail_puts: AtomicBool,
}

impl FakeArtifactStore {
    pub(crate) fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub(crate) async fn len(&self) -> usize {
        self.artifacts.lock().await.len()
    }
}

#[async_trait]
impl ArtifactStore for FakeArtifactStore {
    async fn put(
        &self,
        job_id: ExportJobId,
        format: ExportFormat,
        bytes: Vec<u8>,
    ) -> AppResult<String> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(AppError::Internal("artifact volume is read-only".to_owned()));
        }

        let location = format!("memory://{job_id}{}", format.file_extension());
        self.artifacts.lock().await.insert(location.clone(), bytes);
        Ok(location)
    }

    async fn get(&self, location: &str) -> AppResult<Option<Vec<u8>>> {
        Ok(self.artifacts.lock().await.get(location).cloned())
    }

    async fn delete(&self, location: &str) -> AppResult<()> {
        self.artifacts.lock().await.remove(location);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeExportJobRepository {
    jobs: Mutex<BTreeMap<ExportJobId, ExportJob>>,
    fail_creates: AtomicBool,
}

impl FakeExportJobRepository {
    pub(crate) fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub(crate) async fn status_of(&self, job_id: ExportJobId) -> Option<ExportJobStatus> {
        self.jobs.lock().await.get(&job_id).map(|job| job.status)
    }

    pub(crate) async fn active_count(&self, user_id: UserId) -> usize {
        self.jobs
            .lock()
            .await
            .values()
            .filter(|job| job.user_id == user_id && job.is_active())
            .count()
    }
}

#[async_trait]
impl ExportJobRepository for FakeExportJobRepository {
    async fn create_job(&self, job: ExportJob) -> AppResult<()> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(AppError::Internal("job table unavailable".to_owned()));
        }

        self.jobs.lock().await.insert(job.id, job);
        Ok(())
    }

    async fn find_job(&self, job_id: ExportJobId) -> AppResult<Option<ExportJob>> {
        Ok(self.jobs.lock().await.get(&job_id).cloned())
    }

    async fn list_jobs_for_user(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>> {
        let mut jobs: Vec<ExportJob> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| job.organization_id == organization_id && job.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn claim_next_pending(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ExportJob>> {
        let mut jobs = self.jobs.lock().await;
        let next = jobs
            .values_mut()
            .filter(|job| job.status == ExportJobStatus::Pending)
            .min_by_key(|job| (job.created_at, job.id));

        match next {
            Some(job) => {
                job.claim(worker_id, now)?;
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete_job(
        &self,
        job_id: ExportJobId,
        worker_id: &str,
        artifact: &ExportArtifactInfo,
        download_token: &str,
        download_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<ExportJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("export job '{job_id}' not found")))?;
        job.complete(
            worker_id,
            artifact.clone(),
            download_token.to_owned(),
            download_expires_at,
            now,
        )?;
        Ok(job.clone())
    }

    async fn fail_job(
        &self,
        job_id: ExportJobId,
        worker_id: Option<&str>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<ExportJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("export job '{job_id}' not found")))?;
        job.fail(worker_id, reason, now)?;
        Ok(job.clone())
    }

    async fn list_stalled_jobs(
        &self,
        started_before: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>> {
        Ok(self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| job.is_stalled(started_before))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_purgeable_jobs(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>> {
        Ok(self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| job.is_purgeable(cutoff))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_job(&self, job_id: ExportJobId) -> AppResult<()> {
        self.jobs.lock().await.remove(&job_id);
        Ok(())
    }
}

#[derive(Default)]
struct UserQuota {
    active: HashSet<ExportJobId>,
    submissions: Vec<(DateTime<Utc>, ExportJobId)>,
}

#[derive(Default)]
pub(crate) struct FakeQuotaStore {
    users: Mutex<HashMap<UserId, UserQuota>>,
}

#[async_trait]
impl ExportQuotaStore for FakeQuotaStore {
    async fn try_reserve(
        &self,
        user_id: UserId,
        job_id: ExportJobId,
        limits: ExportQuotaLimits,
        now: DateTime<Utc>,
    ) -> AppResult<QuotaReservation> {
        let mut users = self.users.lock().await;
        let quota = users.entry(user_id).or_default();
        quota
            .submissions
            .retain(|(submitted_at, _)| *submitted_at + limits.window > now);

        if quota.active.len() >= usize::try_from(limits.max_concurrent).unwrap_or(usize::MAX) {
            return Ok(QuotaReservation::ConcurrentLimitReached);
        }

        if quota.submissions.len() >= usize::try_from(limits.max_per_window).unwrap_or(usize::MAX)
            && let Some((oldest_submission_at, _)) = quota.submissions.first()
        {
            return Ok(QuotaReservation::WindowLimitReached {
                oldest_submission_at: *oldest_submission_at,
            });
        }

        quota.active.insert(job_id);
        quota.submissions.push((now, job_id));
        Ok(QuotaReservation::Reserved)
    }

    async fn release(&self, user_id: UserId, job_id: ExportJobId) -> AppResult<bool> {
        Ok(self
            .users
            .lock()
            .await
            .get_mut(&user_id)
            .is_some_and(|quota| quota.active.remove(&job_id)))
    }

    async fn rollback(&self, user_id: UserId, job_id: ExportJobId) -> AppResult<()> {
        if let Some(quota) = self.users.lock().await.get_mut(&user_id) {
            quota.active.remove(&job_id);
            quota
                .submissions
                .retain(|(_, submitted_job_id)| *submitted_job_id != job_id);
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeDownloadTokenRepository {
    tokens: Mutex<HashMap<String, DownloadTokenRecord>>,
}

impl FakeDownloadTokenRepository {
    pub(crate) async fn stored_hashes(&self) -> Vec<String> {
        self.tokens.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl DownloadTokenRepository for FakeDownloadTokenRepository {
    async fn create_token(&self, record: DownloadTokenRecord) -> AppResult<()> {
        self.tokens
            .lock()
            .await
            .insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn consume_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ExportJobId>> {
        let mut tokens = self.tokens.lock().await;
        let Some(record) = tokens.get_mut(token_hash) else {
            return Ok(None);
        };

        if record.consumed_at.is_some() || record.expires_at <= now {
            return Ok(None);
        }

        record.consumed_at = Some(now);
        Ok(Some(record.job_id))
    }

    async fn delete_tokens_for_job(&self, job_id: ExportJobId) -> AppResult<()> {
        self.tokens
            .lock()
            .await
            .retain(|_, record| record.job_id != job_id);
        Ok(())
    }
}

pub(crate) struct FakeRenderer {
    format: ExportFormat,
    fail: bool,
}

impl FakeRenderer {
    pub(crate) fn new(format: ExportFormat) -> Self {
        Self {
            format,
            fail: false,
        }
    }

    pub(crate) fn failing(format: ExportFormat) -> Self {
        Self { format, fail: true }
    }
}

impl ExportRenderer for FakeRenderer {
    fn format(&self) -> ExportFormat {
        self.format
    }

    fn render(&self, _job: &ExportJob, entries: &[AuditLogEntry]) -> AppResult<Vec<u8>> {
        if self.fail {
            return Err(AppError::Validation(
                "payload could not be laid out on the page".to_owned(),
            ));
        }

        let rows: Vec<Value> = entries
            .iter()
            .map(|entry| {
                json!({
                    "event_type": entry.event_type,
                    "payload": entry.payload,
                    "ip_address": entry.ip_address,
                })
            })
            .collect();
        Ok(Value::Array(rows).to_string().into_bytes())
    }
}
