use crate::application_port::*;
use crate::domain_model::*;

/// User lookup owned by user management. The auth core only reads from it.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Identity>, AuthError>;

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<Identity>, AuthError>;
}
