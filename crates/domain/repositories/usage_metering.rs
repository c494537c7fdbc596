use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

/// Point-in-time counters for the current UTC calendar month.
#[async_trait]
#[automock]
pub trait UsageMeteringRepository {
    async fn monthly_response_count(&self, organization_id: Uuid) -> Result<i64>;

    async fn monthly_active_people_count(&self, organization_id: Uuid) -> Result<i64>;
}
