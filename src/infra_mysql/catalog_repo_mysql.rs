use super::util::is_dup_key;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlConnection, MySqlPool, Row};

/// `catalog_record` table keyed on `external_id`.
pub struct MySqlCatalogRepo {
    pool: MySqlPool,
}

fn store_err(e: impl std::fmt::Display) -> CatalogStoreError {
    CatalogStoreError::Store(e.to_string())
}

impl MySqlCatalogRepo {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: MySqlRow) -> Result<CatalogRecord, CatalogStoreError> {
        let external_id: i64 = row.try_get("external_id").map_err(store_err)?;
        let last_synced_at: DateTime<Utc> = row.try_get("last_synced_at").map_err(store_err)?;
        Ok(CatalogRecord {
            external_id: ExternalId(external_id),
            content: CatalogContent {
                title: row.try_get("title").map_err(store_err)?,
                overview: row.try_get("overview").map_err(store_err)?,
                poster_path: row.try_get("poster_path").map_err(store_err)?,
                rating: row.try_get("rating").map_err(store_err)?,
                release_date: row.try_get("release_date").map_err(store_err)?,
            },
            content_hash: row.try_get("content_hash").map_err(store_err)?,
            last_synced_at,
        })
    }

    async fn insert_in_tx(
        conn: &mut MySqlConnection,
        record: &CatalogRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
INSERT INTO catalog_record
    (external_id, title, overview, poster_path, rating, release_date, content_hash, last_synced_at)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(record.external_id.0)
        .bind(&record.content.title)
        .bind(&record.content.overview)
        .bind(&record.content.poster_path)
        .bind(record.content.rating)
        .bind(&record.content.release_date)
        .bind(&record.content_hash)
        .bind(record.last_synced_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn update_in_tx(
        conn: &mut MySqlConnection,
        record: &CatalogRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
UPDATE catalog_record
SET title = ?, overview = ?, poster_path = ?, rating = ?, release_date = ?,
    content_hash = ?, last_synced_at = ?
WHERE external_id = ?
"#,
        )
        .bind(&record.content.title)
        .bind(&record.content.overview)
        .bind(&record.content.poster_path)
        .bind(record.content.rating)
        .bind(&record.content.release_date)
        .bind(&record.content_hash)
        .bind(record.last_synced_at)
        .bind(record.external_id.0)
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogRepo for MySqlCatalogRepo {
    async fn upsert_batch(
        &self,
        records: &[CatalogRecord],
    ) -> Result<UpsertSummary, CatalogStoreError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        let mut summary = UpsertSummary::default();

        for record in records {
            let stored_hash: Option<String> = sqlx::query_scalar(
                "SELECT content_hash FROM catalog_record WHERE external_id = ? FOR UPDATE",
            )
            .bind(record.external_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_err)?;

            match stored_hash {
                Some(hash) if hash == record.content_hash => summary.unchanged += 1,
                Some(_) => {
                    Self::update_in_tx(&mut *tx, record)
                        .await
                        .map_err(store_err)?;
                    summary.updated += 1;
                }
                None => match Self::insert_in_tx(&mut *tx, record).await {
                    Ok(()) => summary.inserted += 1,
                    // A concurrent run inserted it first; the page transaction is retried by the next run.
                    Err(e) if is_dup_key(&e) => {
                        return Err(CatalogStoreError::Store(format!(
                            "external id {} inserted concurrently",
                            record.external_id
                        )));
                    }
                    Err(e) => return Err(store_err(e)),
                },
            }
        }

        tx.commit().await.map_err(store_err)?;
        Ok(summary)
    }

    async fn get(
        &self,
        external_id: ExternalId,
    ) -> Result<Option<CatalogRecord>, CatalogStoreError> {
        let row_opt = sqlx::query(
            r#"
SELECT external_id, title, overview, poster_path, rating, release_date, content_hash, last_synced_at
FROM catalog_record
WHERE external_id = ?
"#,
        )
        .bind(external_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn count(&self) -> Result<u64, CatalogStoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_record")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(count.max(0) as u64)
    }
}
