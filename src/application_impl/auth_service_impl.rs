use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

pub struct RealAuthService {
    user_directory: Arc<dyn UserDirectory>,
    credential_store: Arc<dyn CredentialStore>,
    token_codec: Arc<dyn TokenCodec>,
    clock: Arc<dyn Clock>,
    policy: AuthPolicy,
}

impl RealAuthService {
    pub fn new(
        user_directory: Arc<dyn UserDirectory>,
        credential_store: Arc<dyn CredentialStore>,
        token_codec: Arc<dyn TokenCodec>,
        clock: Arc<dyn Clock>,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            user_directory,
            credential_store,
            token_codec,
            clock,
            policy,
        }
    }

    #[inline]
    fn new_refresh_value() -> String {
        nanoid::nanoid!(48)
    }

    /// Lookup key for a presented refresh token.
    pub fn hash_refresh_token(value: &str) -> String {
        hex::encode(Sha256::digest(value.as_bytes()))
    }

    fn new_refresh_record(
        &self,
        user_id: UserId,
        device_id: DeviceId,
        family_id: TokenFamilyId,
        predecessor: Option<RefreshTokenId>,
        now: DateTime<Utc>,
    ) -> Result<(RefreshRecord, RefreshToken), AuthError> {
        let refresh_ttl = chrono::Duration::from_std(self.policy.refresh_ttl)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        let value = Self::new_refresh_value();
        let record = RefreshRecord {
            id: RefreshTokenId(Uuid::new_v4()),
            user_id,
            device_id,
            family_id,
            token_hash: Self::hash_refresh_token(&value),
            issued_at: now,
            expires_at: now + refresh_ttl,
            revoked_at: None,
            predecessor,
        };
        Ok((record, RefreshToken(value)))
    }

    fn token_pair(
        access_token: AccessToken,
        access_claims: &AccessClaims,
        refresh_token: RefreshToken,
        refresh_record: &RefreshRecord,
    ) -> AuthTokens {
        AuthTokens {
            access_token,
            refresh_token,
            access_token_expires_at: access_claims.expires_at,
            refresh_token_expires_at: refresh_record.expires_at,
        }
    }

    /// A refresh token was presented after it stopped being active: revoke its whole chain.
    async fn reject_reuse(&self, record: &RefreshRecord) -> AuthError {
        match self.credential_store.revoke_family(record.family_id).await {
            Ok(revoked) => {
                warn!(
                    user_id = %record.user_id,
                    device_id = %record.device_id,
                    family_id = %record.family_id,
                    revoked,
                    "refresh token reuse detected, token family revoked"
                );
                AuthError::Revoked
            }
            Err(e) => {
                error!(family_id = %record.family_id, "revoking reused token family: {}", e);
                e
            }
        }
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn login(&self, request: LoginInput) -> Result<AuthTokens, AuthError> {
        let LoginInput {
            email,
            password,
            device_id,
        } = request;

        let identity = self
            .user_directory
            .find_by_credentials(&email, &password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let now = self.clock.now();
        let family_id = TokenFamilyId(Uuid::new_v4());
        let (record, refresh_token) =
            self.new_refresh_record(identity.id, device_id, family_id, None, now)?;
        let (access_token, claims) = self.token_codec.issue(&identity, self.policy.access_ttl)?;

        self.credential_store.save(&record).await?;

        info!(user_id = %identity.id, device_id = %record.device_id, "login succeeded");
        Ok(Self::token_pair(access_token, &claims, refresh_token, &record))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let presented = self
            .credential_store
            .find_by_hash(&Self::hash_refresh_token(refresh_token))
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if presented.is_revoked() {
            return Err(self.reject_reuse(&presented).await);
        }

        let now = self.clock.now();
        if presented.is_expired(now) {
            return Err(AuthError::Expired);
        }

        let Some(identity) = self.user_directory.find_by_id(presented.user_id).await? else {
            let revoked = self.credential_store.revoke_all(presented.user_id).await?;
            info!(user_id = %presented.user_id, revoked, "refresh for unknown user");
            return Err(AuthError::InvalidToken);
        };

        let (successor, next_refresh_token) = self.new_refresh_record(
            identity.id,
            presented.device_id.clone(),
            presented.family_id,
            Some(presented.id),
            now,
        )?;
        let (access_token, claims) = self.token_codec.issue(&identity, self.policy.access_ttl)?;

        match self
            .credential_store
            .rotate(presented.id, &successor)
            .await?
        {
            RotateOutcome::Rotated => {}
            // Lost a concurrent rotation: the token was spent by someone else.
            RotateOutcome::AlreadyRevoked => return Err(self.reject_reuse(&presented).await),
        }

        debug!(
            user_id = %identity.id,
            device_id = %successor.device_id,
            predecessor = %presented.id,
            successor = %successor.id,
            "refresh token rotated"
        );
        Ok(Self::token_pair(
            access_token,
            &claims,
            next_refresh_token,
            &successor,
        ))
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let hash = Self::hash_refresh_token(refresh_token);
        match self.credential_store.find_by_hash(&hash).await? {
            Some(record) => {
                let transitioned = self.credential_store.revoke(record.id).await?;
                debug!(user_id = %record.user_id, transitioned, "logout");
            }
            None => debug!("logout with unknown refresh token"),
        }
        Ok(())
    }

    async fn logout_all(&self, user_id: UserId) -> Result<u64, AuthError> {
        let revoked = self.credential_store.revoke_all(user_id).await?;
        info!(%user_id, revoked, "logged out everywhere");
        Ok(revoked)
    }

    async fn authenticate(&self, access_token: &str) -> Result<Identity, AuthError> {
        let claims = self
            .token_codec
            .verify(&AccessToken(access_token.to_string()))?;

        let current = self
            .user_directory
            .find_by_id(claims.subject)
            .await?
            .ok_or(AuthError::Revoked)?;
        if current.credential_version != claims.credential_version {
            return Err(AuthError::Revoked);
        }

        Ok(claims.identity())
    }
}
