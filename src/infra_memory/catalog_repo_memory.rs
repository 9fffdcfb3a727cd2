use crate::domain_model::*;
use crate::domain_port::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct MemoryCatalogRepo {
    records: Mutex<BTreeMap<ExternalId, CatalogRecord>>,
    writes: AtomicU64,
    fail_upserts: AtomicBool,
}

impl MemoryCatalogRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ExternalId, CatalogRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Rows inserted or updated since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following `upsert_batch` fail, as an unreachable database would.
    pub fn set_failing(&self, failing: bool) {
        self.fail_upserts.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl CatalogRepo for MemoryCatalogRepo {
    async fn upsert_batch(
        &self,
        records: &[CatalogRecord],
    ) -> Result<UpsertSummary, CatalogStoreError> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(CatalogStoreError::Store("catalog store unavailable".into()));
        }

        let mut stored = self.lock();
        let mut summary = UpsertSummary::default();
        for record in records {
            match stored.get(&record.external_id) {
                Some(existing) if existing.content_hash == record.content_hash => {
                    summary.unchanged += 1;
                    continue;
                }
                Some(_) => summary.updated += 1,
                None => summary.inserted += 1,
            }
            stored.insert(record.external_id, record.clone());
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(summary)
    }

    async fn get(
        &self,
        external_id: ExternalId,
    ) -> Result<Option<CatalogRecord>, CatalogStoreError> {
        Ok(self.lock().get(&external_id).cloned())
    }

    async fn count(&self) -> Result<u64, CatalogStoreError> {
        Ok(self.lock().len() as u64)
    }
}
