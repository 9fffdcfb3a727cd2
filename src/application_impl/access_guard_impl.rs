use crate::application_port::*;
use crate::domain_model::*;
use crate::logger::*;
use std::sync::Arc;
use std::time::Duration;

pub struct RealAccessGuard {
    auth_service: Arc<dyn AuthService>,
    lookup_timeout: Duration,
}

impl RealAccessGuard {
    pub fn new(auth_service: Arc<dyn AuthService>, lookup_timeout: Duration) -> Self {
        Self {
            auth_service,
            lookup_timeout,
        }
    }
}

#[async_trait::async_trait]
impl AccessGuard for RealAccessGuard {
    async fn authorize(
        &self,
        token: Option<&str>,
        required: Role,
    ) -> Result<Identity, AccessError> {
        let token = token.ok_or(AccessError::Unauthorized)?;

        let identity =
            match tokio::time::timeout(self.lookup_timeout, self.auth_service.authenticate(token))
                .await
            {
                Ok(result) => result.map_err(AccessError::from)?,
                Err(_) => {
                    warn!(timeout = ?self.lookup_timeout, "identity lookup timed out");
                    return Err(AccessError::Unavailable(
                        "identity lookup timed out".to_string(),
                    ));
                }
            };

        if !identity.role.satisfies(required) {
            debug!(user_id = %identity.id, role = %identity.role, %required, "forbidden");
            return Err(AccessError::Forbidden { required });
        }

        Ok(identity)
    }
}
