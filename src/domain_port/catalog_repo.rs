use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum CatalogStoreError {
    #[error("store error: {0}")]
    Store(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

#[async_trait::async_trait]
pub trait CatalogRepo: Send + Sync {
    /// Insert-or-update keyed on external id, one transaction per call.
    /// A record whose content hash matches the stored one is left untouched.
    async fn upsert_batch(&self, records: &[CatalogRecord])
    -> Result<UpsertSummary, CatalogStoreError>;

    async fn get(&self, external_id: ExternalId)
    -> Result<Option<CatalogRecord>, CatalogStoreError>;

    async fn count(&self) -> Result<u64, CatalogStoreError>;
}
