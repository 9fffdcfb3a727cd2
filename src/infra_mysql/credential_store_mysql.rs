use super::util::uuid_from_bytes;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlConnection, MySqlPool, Row};
use std::sync::Arc;

const SELECT_COLUMNS: &str = r#"
SELECT id, user_id, device_id, family_id, token_hash, issued_at, expires_at, revoked_at, predecessor
FROM refresh_token
"#;

/// `refresh_token` table. Multi-row operations run inside one transaction;
/// an uncommitted transaction is rolled back when its future is dropped.
pub struct MySqlCredentialStore {
    pool: MySqlPool,
    clock: Arc<dyn Clock>,
}

fn store_err(e: impl std::fmt::Display) -> AuthError {
    AuthError::Store(e.to_string())
}

impl MySqlCredentialStore {
    pub fn new(pool: MySqlPool, clock: Arc<dyn Clock>) -> Self {
        MySqlCredentialStore { pool, clock }
    }

    fn row_to_record(row: MySqlRow) -> Result<RefreshRecord, AuthError> {
        let id: Vec<u8> = row.try_get("id").map_err(store_err)?;
        let user_id: Vec<u8> = row.try_get("user_id").map_err(store_err)?;
        let device_id: String = row.try_get("device_id").map_err(store_err)?;
        let family_id: Vec<u8> = row.try_get("family_id").map_err(store_err)?;
        let token_hash: String = row.try_get("token_hash").map_err(store_err)?;
        let issued_at: DateTime<Utc> = row.try_get("issued_at").map_err(store_err)?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at").map_err(store_err)?;
        let revoked_at: Option<DateTime<Utc>> = row.try_get("revoked_at").map_err(store_err)?;
        let predecessor: Option<Vec<u8>> = row.try_get("predecessor").map_err(store_err)?;

        Ok(RefreshRecord {
            id: RefreshTokenId(uuid_from_bytes(&id).map_err(AuthError::Store)?),
            user_id: UserId(uuid_from_bytes(&user_id).map_err(AuthError::Store)?),
            device_id: DeviceId(device_id),
            family_id: TokenFamilyId(uuid_from_bytes(&family_id).map_err(AuthError::Store)?),
            token_hash,
            issued_at,
            expires_at,
            revoked_at,
            predecessor: predecessor
                .map(|p| uuid_from_bytes(&p).map(RefreshTokenId))
                .transpose()
                .map_err(AuthError::Store)?,
        })
    }

    async fn revoke_device_in_tx(
        conn: &mut MySqlConnection,
        user_id: UserId,
        device_id: &DeviceId,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let result = sqlx::query(
            r#"
UPDATE refresh_token SET revoked_at = ?
WHERE user_id = ? AND device_id = ? AND revoked_at IS NULL
"#,
        )
        .bind(now)
        .bind(user_id.0.as_bytes().as_slice())
        .bind(&device_id.0)
        .execute(conn)
        .await
        .map_err(store_err)?;
        Ok(result.rows_affected())
    }

    async fn insert_in_tx(
        conn: &mut MySqlConnection,
        record: &RefreshRecord,
    ) -> Result<(), AuthError> {
        sqlx::query(
            r#"
INSERT INTO refresh_token
    (id, user_id, device_id, family_id, token_hash, issued_at, expires_at, revoked_at, predecessor)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(record.id.0.as_bytes().as_slice())
        .bind(record.user_id.0.as_bytes().as_slice())
        .bind(&record.device_id.0)
        .bind(record.family_id.0.as_bytes().as_slice())
        .bind(&record.token_hash)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.revoked_at)
        .bind(record.predecessor.map(|p| p.0.as_bytes().to_vec()))
        .execute(conn)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn revoke_matching(&self, sql: &str, key: &[u8]) -> Result<u64, AuthError> {
        let result = sqlx::query(sql)
            .bind(self.clock.now())
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected())
    }
}

#[async_trait::async_trait]
impl CredentialStore for MySqlCredentialStore {
    async fn save(&self, record: &RefreshRecord) -> Result<(), AuthError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        Self::revoke_device_in_tx(&mut *tx, record.user_id, &record.device_id, self.clock.now())
            .await?;
        Self::insert_in_tx(&mut *tx, record).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn find_active(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
    ) -> Result<Option<RefreshRecord>, AuthError> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE user_id = ? AND device_id = ? AND revoked_at IS NULL AND expires_at > ? ORDER BY issued_at DESC LIMIT 1"
        );
        let row_opt = sqlx::query(&sql)
            .bind(user_id.0.as_bytes().as_slice())
            .bind(&device_id.0)
            .bind(self.clock.now())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshRecord>, AuthError> {
        let sql = format!("{SELECT_COLUMNS} WHERE token_hash = ?");
        let row_opt = sqlx::query(&sql)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn rotate(
        &self,
        predecessor: RefreshTokenId,
        successor: &RefreshRecord,
    ) -> Result<RotateOutcome, AuthError> {
        let now = self.clock.now();
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        // The row lock taken here serializes concurrent rotations of the same token.
        let claimed = sqlx::query(
            r#"
UPDATE refresh_token SET revoked_at = ?
WHERE id = ? AND revoked_at IS NULL
"#,
        )
        .bind(now)
        .bind(predecessor.0.as_bytes().as_slice())
        .execute(&mut *tx)
        .await
        .map_err(store_err)?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await.map_err(store_err)?;
            return Ok(RotateOutcome::AlreadyRevoked);
        }

        Self::revoke_device_in_tx(&mut *tx, successor.user_id, &successor.device_id, now).await?;
        Self::insert_in_tx(&mut *tx, successor).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke(&self, id: RefreshTokenId) -> Result<bool, AuthError> {
        let revoked = self
            .revoke_matching(
                "UPDATE refresh_token SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL",
                id.0.as_bytes(),
            )
            .await?;
        Ok(revoked > 0)
    }

    async fn revoke_family(&self, family_id: TokenFamilyId) -> Result<u64, AuthError> {
        self.revoke_matching(
            "UPDATE refresh_token SET revoked_at = ? WHERE family_id = ? AND revoked_at IS NULL",
            family_id.0.as_bytes(),
        )
        .await
    }

    async fn revoke_all(&self, user_id: UserId) -> Result<u64, AuthError> {
        self.revoke_matching(
            "UPDATE refresh_token SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
            user_id.0.as_bytes(),
        )
        .await
    }
}
