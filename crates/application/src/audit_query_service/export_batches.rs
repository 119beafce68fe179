use super::*;

impl AuditQueryService {
    /// Collects every entry matching `filter` recorded at or before `as_of`,
    /// in pages of `batch_size`.
    ///
    /// Fails without returning a partial set when more than `max_records`
    /// entries match. Entries are redacted exactly as in `search`.
    pub async fn collect_for_export(
        &self,
        permissions: &UserAuditPermissions,
        filter: &AuditLogFilter,
        as_of: DateTime<Utc>,
        batch_size: u32,
        max_records: u64,
    ) -> AppResult<Vec<AuditLogEntry>> {
        require_view(permissions)?;

        let mut entries: Vec<AuditLogEntry> = Vec::new();
        let mut page = 0_u32;

        loop {
            let batch_filter = filter.clone().with_page(page, batch_size).normalized()?;
            let slice = self
                .fetch_scoped(permissions, batch_filter, Some(as_of))
                .await?;

            if slice.total > max_records {
                return Err(AppError::Validation(format!(
                    "export matches {} audit entries, more than the maximum of {max_records}",
                    slice.total
                )));
            }

            let fetched = slice.events.len();
            entries.extend(
                slice
                    .events
                    .into_iter()
                    .map(|event| event.into_entry(permissions)),
            );

            let collected = u64::try_from(entries.len()).unwrap_or(u64::MAX);
            let batch_len = usize::try_from(batch_size).unwrap_or(usize::MAX);
            if fetched < batch_len || collected >= slice.total {
                break;
            }

            page = page.checked_add(1).ok_or_else(|| {
                AppError::Internal("export pagination overflowed".to_owned())
            })?;
        }

        Ok(entries)
    }
}
