use super::AuthError;
use crate::domain_model::{Identity, Role};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden: {required} role required")]
    Forbidden { required: Role },
    #[error("auth backend unavailable: {0}")]
    Unavailable(String),
}

impl From<AuthError> for AccessError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::Expired
            | AuthError::Revoked => AccessError::Unauthorized,
            AuthError::Store(e) | AuthError::Internal(e) => AccessError::Unavailable(e),
        }
    }
}

#[async_trait::async_trait]
pub trait AccessGuard: Send + Sync {
    /// `token` is the bare access token, `None` when the request carried none.
    async fn authorize(&self, token: Option<&str>, required: Role)
    -> Result<Identity, AccessError>;
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
