use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use diesel::{OptionalExtension, RunQueryDsl, prelude::*, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{environments, organizations, projects},
    },
};
use domain::{
    entities::organizations::{OrganizationEntity, OrganizationRow},
    repositories::organizations::OrganizationRepository,
    value_objects::billing::OrganizationBillingUpdate,
};

pub struct OrganizationPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl OrganizationPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl OrganizationRepository for OrganizationPostgres {
    async fn find_by_id(&self, organization_id: Uuid) -> Result<Option<OrganizationEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = organizations::table
            .filter(organizations::id.eq(organization_id))
            .select(OrganizationRow::as_select())
            .first::<OrganizationRow>(&mut conn)
            .optional()?;

        row.map(OrganizationEntity::try_from).transpose()
    }

    async fn find_by_environment_id(
        &self,
        environment_id: Uuid,
    ) -> Result<Option<OrganizationEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = organizations::table
            .inner_join(projects::table.inner_join(environments::table))
            .filter(environments::id.eq(environment_id))
            .select(OrganizationRow::as_select())
            .first::<OrganizationRow>(&mut conn)
            .optional()?;

        row.map(OrganizationEntity::try_from).transpose()
    }

    async fn update_billing(
        &self,
        organization_id: Uuid,
        billing_update: OrganizationBillingUpdate,
    ) -> Result<OrganizationEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            let current = organizations::table
                .filter(organizations::id.eq(organization_id))
                .select(OrganizationRow::as_select())
                .for_update()
                .get_result::<OrganizationRow>(conn)
                .with_context(|| format!("organization {organization_id} not found"))?;

            let billing = OrganizationEntity::try_from(current)?
                .billing
                .merged(billing_update);
            let billing_json = serde_json::to_value(&billing)?;

            let updated = update(organizations::table.filter(organizations::id.eq(organization_id)))
                .set((
                    organizations::billing.eq(billing_json),
                    organizations::updated_at.eq(Utc::now()),
                ))
                .returning(OrganizationRow::as_returning())
                .get_result::<OrganizationRow>(conn)?;

            OrganizationEntity::try_from(updated)
        })
    }
}
