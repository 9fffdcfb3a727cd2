use crate::application_port::{AccessClaims, AccessToken, AuthError, TokenCodec};
use crate::domain_model::{Identity, Role, UserId};
use crate::domain_port::Clock;
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A versioned HMAC secret. `kid` travels in the JWT header.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    pub secret: Vec<u8>,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub current_key: SigningKey,
    /// Keys no longer used for signing whose tokens are still accepted until they expire.
    pub retired_keys: Vec<SigningKey>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    ver: u32,
    iat: i64,
    exp: i64,
    iss: String,
    aud: String,
    jti: String,
}

/// HS256 access-token codec. Keys are fixed at construction and never change afterwards.
pub struct JwtHs256Codec {
    issuer: String,
    audience: String,
    current_kid: String,
    encoding_key: EncodingKey,
    decoding_keys: HashMap<String, DecodingKey>,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig, clock: Arc<dyn Clock>) -> Self {
        let mut decoding_keys: HashMap<String, DecodingKey> = cfg
            .retired_keys
            .iter()
            .map(|k| (k.kid.clone(), DecodingKey::from_secret(&k.secret)))
            .collect();
        decoding_keys.insert(
            cfg.current_key.kid.clone(),
            DecodingKey::from_secret(&cfg.current_key.secret),
        );

        // Expiry is checked against the injected clock, without leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss", "aud"]);
        validation.set_issuer(&[cfg.issuer.clone()]);
        validation.set_audience(&[cfg.audience.clone()]);

        Self {
            issuer: cfg.issuer,
            audience: cfg.audience,
            current_kid: cfg.current_key.kid,
            encoding_key: EncodingKey::from_secret(&cfg.current_key.secret),
            decoding_keys,
            validation,
            clock,
        }
    }

    #[inline]
    fn parse_user_id(sub: &str) -> Result<UserId, AuthError> {
        sub.parse::<UserId>().map_err(|_| AuthError::InvalidToken)
    }

    #[inline]
    fn timestamp(secs: i64) -> Result<DateTime<Utc>, AuthError> {
        DateTime::from_timestamp(secs, 0).ok_or(AuthError::InvalidToken)
    }
}

impl TokenCodec for JwtHs256Codec {
    fn issue(
        &self,
        identity: &Identity,
        ttl: Duration,
    ) -> Result<(AccessToken, AccessClaims), AuthError> {
        let iat = self.clock.now().timestamp();
        let ttl_secs =
            i64::try_from(ttl.as_secs()).map_err(|e| AuthError::Internal(e.to_string()))?;
        let exp = iat.saturating_add(ttl_secs);

        let claims = Claims {
            sub: identity.id.to_string(),
            role: identity.role,
            ver: identity.credential_version,
            iat,
            exp,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.current_kid.clone());
        let token = encode(&header, &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok((
            AccessToken(token),
            AccessClaims {
                subject: identity.id,
                role: identity.role,
                credential_version: identity.credential_version,
                issued_at: Self::timestamp(iat)?,
                expires_at: Self::timestamp(exp)?,
                jti: claims.jti,
            },
        ))
    }

    fn verify(&self, token: &AccessToken) -> Result<AccessClaims, AuthError> {
        let header = decode_header(&token.0).map_err(|_| AuthError::InvalidToken)?;
        let key = header
            .kid
            .as_deref()
            .and_then(|kid| self.decoding_keys.get(kid))
            .ok_or(AuthError::InvalidToken)?;

        let claims = decode::<Claims>(&token.0, key, &self.validation)
            .map_err(|_| AuthError::InvalidToken)?
            .claims;

        if self.clock.now().timestamp() >= claims.exp {
            return Err(AuthError::Expired);
        }

        Ok(AccessClaims {
            subject: Self::parse_user_id(&claims.sub)?,
            role: claims.role,
            credential_version: claims.ver,
            issued_at: Self::timestamp(claims.iat)?,
            expires_at: Self::timestamp(claims.exp)?,
            jti: claims.jti,
        })
    }
}
