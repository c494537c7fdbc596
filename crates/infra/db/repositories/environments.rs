use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain::repositories::environments::EnvironmentRepository,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{environments, memberships, organizations, projects},
    },
};

pub struct EnvironmentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl EnvironmentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl EnvironmentRepository for EnvironmentPostgres {
    async fn has_user_environment_access(
        &self,
        user_id: Uuid,
        environment_id: Uuid,
    ) -> Result<bool> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let memberships_found = environments::table
            .inner_join(projects::table.inner_join(organizations::table.inner_join(memberships::table)))
            .filter(environments::id.eq(environment_id))
            .filter(memberships::user_id.eq(user_id))
            .count()
            .get_result::<i64>(&mut conn)?;

        Ok(memberships_found > 0)
    }
}
