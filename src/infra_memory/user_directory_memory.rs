use crate::application_impl::Argon2PasswordHasher;
use crate::application_port::{AuthError, CredentialHasher};
use crate::domain_model::*;
use crate::domain_port::UserDirectory;
use argon2::Params;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct UserEntry {
    email: String,
    password_hash: String,
    identity: Identity,
}

pub struct MemoryUserDirectory {
    users: DashMap<UserId, UserEntry>,
    hasher: Arc<dyn CredentialHasher>,
}

impl MemoryUserDirectory {
    pub fn new(hasher: Arc<dyn CredentialHasher>) -> Self {
        Self {
            users: DashMap::new(),
            hasher,
        }
    }

    /// Argon2 with minimal cost, for tests and local development.
    pub fn with_fast_hasher() -> Self {
        let params = Params::new(8, 1, 1, None).unwrap_or_default();
        Self::new(Arc::new(Argon2PasswordHasher::with_params(params)))
    }

    pub async fn insert(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<Identity, AuthError> {
        let password_hash = self.hasher.hash_password(password).await?;
        let identity = Identity {
            id: UserId(uuid::Uuid::new_v4()),
            role,
            credential_version: 0,
        };
        self.users.insert(
            identity.id,
            UserEntry {
                email: email.to_string(),
                password_hash,
                identity,
            },
        );
        Ok(identity)
    }

    pub fn remove(&self, user_id: UserId) {
        self.users.remove(&user_id);
    }

    pub fn bump_credential_version(&self, user_id: UserId) {
        if let Some(mut entry) = self.users.get_mut(&user_id) {
            entry.identity.credential_version += 1;
        }
    }
}

#[async_trait::async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>, AuthError> {
        let found = self
            .users
            .iter()
            .find(|entry| entry.email == email)
            .map(|entry| (entry.password_hash.clone(), entry.identity));

        match found {
            Some((hash, identity)) if self.hasher.verify_password(password, &hash).await? => {
                Ok(Some(identity))
            }
            _ => Ok(None),
        }
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<Identity>, AuthError> {
        Ok(self.users.get(&user_id).map(|entry| entry.identity))
    }
}
