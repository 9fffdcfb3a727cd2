use crate::application_port::*;
use crate::domain_model::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// Predecessor revoked and successor stored, as one unit.
    Rotated,
    /// Predecessor was no longer active; nothing was written.
    AlreadyRevoked,
}

/// Refresh-token state. Every method is a single storage transaction.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Store a new record, revoking any other active record for the same (user, device).
    async fn save(&self, record: &RefreshRecord) -> Result<(), AuthError>;

    async fn find_active(
        &self,
        user_id: UserId,
        device_id: &DeviceId,
    ) -> Result<Option<RefreshRecord>, AuthError>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshRecord>, AuthError>;

    /// Revoke `predecessor` only if it is still unrevoked, and store `successor` in the same transaction.
    async fn rotate(
        &self,
        predecessor: RefreshTokenId,
        successor: &RefreshRecord,
    ) -> Result<RotateOutcome, AuthError>;

    /// Returns whether the record transitioned to revoked.
    async fn revoke(&self, id: RefreshTokenId) -> Result<bool, AuthError>;

    async fn revoke_family(&self, family_id: TokenFamilyId) -> Result<u64, AuthError>;

    async fn revoke_all(&self, user_id: UserId) -> Result<u64, AuthError>;
}
