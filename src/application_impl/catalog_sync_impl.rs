use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Safety bound on pages per run, not a business rule.
    pub max_pages: u32,
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            retry: RetryPolicy::default(),
        }
    }
}

/// Map one external record onto catalog fields, filling defaults for missing optional fields.
pub fn normalize_record(
    raw: ExternalRecord,
    synced_at: DateTime<Utc>,
) -> Result<CatalogRecord, MalformedRecord> {
    let id = raw.id.ok_or(MalformedRecord::MissingId)?;
    if id <= 0 {
        return Err(MalformedRecord::InvalidId(id));
    }

    let non_blank = |s: Option<String>| s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    let title = non_blank(raw.title)
        .or_else(|| non_blank(raw.original_title))
        .unwrap_or_default();
    let content = CatalogContent {
        title,
        overview: non_blank(raw.overview).unwrap_or_default(),
        poster_path: non_blank(raw.poster_path),
        rating: raw.vote_average.filter(|r| r.is_finite()).unwrap_or(0.0),
        release_date: non_blank(raw.release_date),
    };

    Ok(CatalogRecord::new(ExternalId(id), content, synced_at))
}

pub struct RealCatalogSync {
    source: Arc<dyn CatalogSource>,
    repo: Arc<dyn CatalogRepo>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

/// Bookkeeping for one `run_full_sync` call.
struct SyncRun {
    run_id: String,
    state: SyncState,
    report: SyncReport,
    seen: HashSet<ExternalId>,
}

impl SyncRun {
    fn new() -> Self {
        Self {
            run_id: nanoid::nanoid!(10),
            state: SyncState::Idle,
            report: SyncReport::default(),
            seen: HashSet::new(),
        }
    }

    fn transition(&mut self, next: SyncState) {
        debug!(run_id = %self.run_id, from = %self.state, to = %next, "sync transition");
        self.state = next;
    }

    fn fail(mut self, reason: String) -> SyncError {
        let failed_in = self.state.clone();
        self.transition(SyncState::Failed {
            reason: reason.clone(),
        });
        error!(
            run_id = %self.run_id,
            %failed_in,
            pages_fetched = self.report.pages_fetched,
            records_upserted = self.report.records_upserted,
            "catalog sync failed: {}",
            reason
        );
        SyncError::Failed {
            failed_in,
            reason,
            report: Box::new(self.report),
        }
    }

    fn absorb(&mut self, summary: UpsertSummary) {
        self.report.records_inserted += summary.inserted;
        self.report.records_updated += summary.updated;
        self.report.records_unchanged += summary.unchanged;
        self.report.records_upserted += summary.inserted + summary.updated;
    }
}

impl RealCatalogSync {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        repo: Arc<dyn CatalogRepo>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            repo,
            clock,
            config,
        }
    }

    async fn fetch_with_retry(
        &self,
        run: &mut SyncRun,
        page: u32,
        cursor: Option<&PageToken>,
    ) -> Result<SourcePage, String> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let error = match self.source.fetch_page(cursor).await {
                Ok(fetched) => return Ok(fetched),
                Err(error) => error,
            };

            let Some(delay) = self.config.retry.next_delay(attempt, &error) else {
                return Err(format!(
                    "page {page} gave up after {attempt} attempt(s): {error}"
                ));
            };

            run.report.errors.push(match &error {
                FetchError::RateLimited { .. } => SyncIssue::RateLimited { page, attempt },
                other => SyncIssue::TransientFetchError {
                    page,
                    attempt,
                    message: other.to_string(),
                },
            });
            warn!(run_id = %run.run_id, page, attempt, ?delay, "page fetch failed, retrying: {}", error);
            tokio::time::sleep(delay).await;
        }
    }

    fn normalize_page(
        &self,
        run: &mut SyncRun,
        page: u32,
        raw_records: Vec<ExternalRecord>,
    ) -> Vec<CatalogRecord> {
        let synced_at = self.clock.now();
        let mut records = Vec::with_capacity(raw_records.len());

        for (index, raw) in raw_records.into_iter().enumerate() {
            run.report.records_seen += 1;
            match normalize_record(raw, synced_at) {
                Ok(record) => {
                    if run.seen.insert(record.external_id) {
                        records.push(record);
                    } else {
                        run.report.records_duplicate += 1;
                        debug!(run_id = %run.run_id, page, external_id = %record.external_id, "duplicate record in run");
                    }
                }
                Err(reason) => {
                    run.report.records_skipped += 1;
                    warn!(run_id = %run.run_id, page, index, "skipping malformed record: {}", reason);
                    run.report.errors.push(SyncIssue::MalformedRecord {
                        page,
                        index,
                        reason: reason.to_string(),
                    });
                }
            }
        }

        records
    }
}

#[async_trait::async_trait]
impl CatalogSync for RealCatalogSync {
    async fn run_full_sync(&self) -> Result<SyncReport, SyncError> {
        let mut run = SyncRun::new();
        let max_pages = self.config.max_pages.max(1);
        info!(run_id = %run.run_id, max_pages, "catalog sync started");

        let mut cursor: Option<PageToken> = None;
        let mut page: u32 = 0;
        loop {
            page += 1;
            run.transition(SyncState::Fetching { page });
            let fetched = match self.fetch_with_retry(&mut run, page, cursor.as_ref()).await {
                Ok(fetched) => fetched,
                Err(reason) => return Err(run.fail(reason)),
            };
            run.report.pages_fetched += 1;

            run.transition(SyncState::Normalizing { page });
            let records = self.normalize_page(&mut run, page, fetched.records);

            run.transition(SyncState::Upserting { page });
            if !records.is_empty() {
                match self.repo.upsert_batch(&records).await {
                    Ok(summary) => run.absorb(summary),
                    Err(e) => return Err(run.fail(format!("upserting page {page}: {e}"))),
                }
            }

            match fetched.next {
                None => break,
                Some(_) if page >= max_pages => {
                    run.report.reached_page_ceiling = true;
                    break;
                }
                Some(next) => cursor = Some(next),
            }
        }

        run.transition(SyncState::Completed);
        info!(
            run_id = %run.run_id,
            pages_fetched = run.report.pages_fetched,
            inserted = run.report.records_inserted,
            updated = run.report.records_updated,
            unchanged = run.report.records_unchanged,
            skipped = run.report.records_skipped,
            reached_page_ceiling = run.report.reached_page_ceiling,
            "catalog sync completed"
        );
        Ok(run.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: Option<i64>) -> ExternalRecord {
        ExternalRecord {
            id,
            title: Some("Parasite".into()),
            vote_average: Some(8.5),
            ..Default::default()
        }
    }

    #[test]
    fn missing_optional_fields_get_defaults() {
        let now = Utc::now();
        let record = normalize_record(
            ExternalRecord {
                id: Some(496243),
                title: Some("  ".into()),
                original_title: Some("기생충".into()),
                vote_average: Some(f64::NAN),
                release_date: Some(String::new()),
                ..Default::default()
            },
            now,
        )
        .unwrap();

        assert_eq!(record.external_id, ExternalId(496243));
        assert_eq!(record.content.title, "기생충");
        assert_eq!(record.content.overview, "");
        assert_eq!(record.content.poster_path, None);
        assert_eq!(record.content.rating, 0.0);
        assert_eq!(record.content.release_date, None);
        assert_eq!(record.last_synced_at, now);
    }

    #[test]
    fn records_without_a_usable_id_are_malformed() {
        let now = Utc::now();
        assert_eq!(normalize_record(raw(None), now), Err(MalformedRecord::MissingId));
        assert_eq!(
            normalize_record(raw(Some(0)), now),
            Err(MalformedRecord::InvalidId(0))
        );
        assert!(normalize_record(raw(Some(7)), now).is_ok());
    }
}
