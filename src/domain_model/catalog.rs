use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Stable identifier assigned by the external catalog (the TMDB movie id).
#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct ExternalId(pub i64);

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The content fields of a catalog entry, i.e. everything that participates in change detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogContent {
    pub title: String,
    pub overview: String,
    pub poster_path: Option<String>,
    pub rating: f64,
    pub release_date: Option<String>,
}

impl CatalogContent {
    /// Hex SHA-256 over the canonical JSON encoding of the content fields.
    pub fn content_hash(&self) -> String {
        // Field order is fixed by the struct definition, so the encoding is canonical.
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&encoded))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogRecord {
    pub external_id: ExternalId,
    pub content: CatalogContent,
    pub content_hash: String,
    pub last_synced_at: DateTime<Utc>,
}

impl CatalogRecord {
    pub fn new(external_id: ExternalId, content: CatalogContent, synced_at: DateTime<Utc>) -> Self {
        let content_hash = content.content_hash();
        Self {
            external_id,
            content,
            content_hash,
            last_synced_at: synced_at,
        }
    }
}
