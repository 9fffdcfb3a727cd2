use super::util::uuid_from_bytes;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use std::sync::Arc;

/// Read-only view over the `users` table owned by user management.
pub struct MySqlUserDirectory {
    pool: MySqlPool,
    hasher: Arc<dyn CredentialHasher>,
}

impl MySqlUserDirectory {
    pub fn new(pool: MySqlPool, hasher: Arc<dyn CredentialHasher>) -> Self {
        MySqlUserDirectory { pool, hasher }
    }

    fn row_to_identity(row: &MySqlRow) -> Result<Identity, AuthError> {
        let id: Vec<u8> = row
            .try_get("id")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let credential_version: u32 = row
            .try_get("credential_version")
            .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(Identity {
            id: UserId(uuid_from_bytes(&id).map_err(AuthError::Store)?),
            role: role
                .parse::<Role>()
                .map_err(|e| AuthError::Store(e.to_string()))?,
            credential_version,
        })
    }
}

#[async_trait::async_trait]
impl UserDirectory for MySqlUserDirectory {
    async fn find_by_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>, AuthError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT id, password_hash, role, credential_version
FROM users
WHERE email = ? AND is_active = TRUE
"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        let Some(row) = row_opt else {
            return Ok(None);
        };
        let password_hash: String = row
            .try_get("password_hash")
            .map_err(|e| AuthError::Store(e.to_string()))?;

        if !self.hasher.verify_password(password, &password_hash).await? {
            return Ok(None);
        }
        Self::row_to_identity(&row).map(Some)
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<Identity>, AuthError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT id, role, credential_version
FROM users
WHERE id = ? AND is_active = TRUE
"#,
        )
        .bind(user_id.0.as_bytes().as_slice())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

        row_opt.as_ref().map(Self::row_to_identity).transpose()
    }
}
