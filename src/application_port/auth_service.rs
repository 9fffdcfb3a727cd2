use crate::domain_model::{DeviceId, Identity, Role, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("token invalid")]
    InvalidToken,
    #[error("token expired")]
    Expired,
    #[error("token revoked")]
    Revoked,
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
    pub device_id: DeviceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

/// What an access token asserts about its bearer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    pub subject: UserId,
    pub role: Role,
    pub credential_version: u32,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub jti: String,
}

impl AccessClaims {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.subject,
            role: self.role,
            credential_version: self.credential_version,
        }
    }
}

pub trait TokenCodec: Send + Sync {
    /// Sign a fresh access token for `identity`, valid for `ttl` from now.
    fn issue(
        &self,
        identity: &Identity,
        ttl: std::time::Duration,
    ) -> Result<(AccessToken, AccessClaims), AuthError>;

    /// Fails with `InvalidToken` for malformed or foreign-signed tokens and `Expired` once `now >= exp`.
    fn verify(&self, token: &AccessToken) -> Result<AccessClaims, AuthError>;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn login(&self, request: LoginInput) -> Result<AuthTokens, AuthError>;
    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError>;
    async fn logout(&self, refresh_token: &str) -> Result<(), AuthError>;
    async fn logout_all(&self, user_id: UserId) -> Result<u64, AuthError>;
    /// Resolve an access token to the current identity of its subject.
    async fn authenticate(&self, access_token: &str) -> Result<Identity, AuthError>;
}
