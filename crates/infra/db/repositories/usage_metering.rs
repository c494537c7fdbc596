use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use diesel::{RunQueryDsl, dsl, prelude::*};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::{
    domain::repositories::usage_metering::UsageMeteringRepository,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{actions, environments, people, projects, responses, surveys},
    },
};

pub struct UsageMeteringPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UsageMeteringPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

/// Midnight UTC on the first day of the month containing `now`.
pub fn start_of_month(now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .context("failed to compute start of month")
}

#[async_trait]
impl UsageMeteringRepository for UsageMeteringPostgres {
    async fn monthly_response_count(&self, organization_id: Uuid) -> Result<i64> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let since = start_of_month(Utc::now())?;

        let count = responses::table
            .inner_join(surveys::table.inner_join(environments::table.inner_join(projects::table)))
            .filter(projects::organization_id.eq(organization_id))
            .filter(responses::created_at.ge(since))
            .count()
            .get_result::<i64>(&mut conn)?;

        debug!(%organization_id, %since, count, "usage_metering: monthly responses counted");
        Ok(count)
    }

    async fn monthly_active_people_count(&self, organization_id: Uuid) -> Result<i64> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let since = start_of_month(Utc::now())?;

        let count = actions::table
            .inner_join(people::table.inner_join(environments::table.inner_join(projects::table)))
            .filter(projects::organization_id.eq(organization_id))
            .filter(actions::created_at.ge(since))
            .select(dsl::count(actions::person_id).aggregate_distinct())
            .get_result::<i64>(&mut conn)?;

        debug!(%organization_id, %since, count, "usage_metering: monthly active people counted");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_of_month_truncates_to_first_day_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap();
        let start = start_of_month(now).unwrap();

        assert_eq!(start, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn start_of_month_is_idempotent() {
        let first = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(start_of_month(first).unwrap(), first);
    }
}
