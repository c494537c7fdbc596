use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::organizations::OrganizationEntity,
    value_objects::billing::OrganizationBillingUpdate,
};

#[async_trait]
#[automock]
pub trait OrganizationRepository {
    async fn find_by_id(&self, organization_id: Uuid) -> Result<Option<OrganizationEntity>>;

    async fn find_by_environment_id(
        &self,
        environment_id: Uuid,
    ) -> Result<Option<OrganizationEntity>>;

    /// Merges `update` into the stored billing record under a row lock and
    /// returns the updated organization.
    async fn update_billing(
        &self,
        organization_id: Uuid,
        update: OrganizationBillingUpdate,
    ) -> Result<OrganizationEntity>;
}
