use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

#[async_trait]
#[automock]
pub trait EnvironmentRepository {
    /// True when the user is a member of the organization owning the environment.
    async fn has_user_environment_access(&self, user_id: Uuid, environment_id: Uuid)
    -> Result<bool>;
}
