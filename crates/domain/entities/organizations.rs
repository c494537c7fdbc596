use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{domain::value_objects::billing::OrganizationBilling, infra::db::postgres::schema::organizations};

#[derive(Debug, Clone, PartialEq)]
pub struct OrganizationEntity {
    pub id: Uuid,
    pub name: String,
    pub billing: OrganizationBilling,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw row used for Diesel queries. Billing stays as JSON and is parsed into OrganizationBilling.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = organizations)]
pub struct OrganizationRow {
    pub id: Uuid,
    pub name: String,
    pub billing: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrganizationRow> for OrganizationEntity {
    type Error = anyhow::Error;

    fn try_from(value: OrganizationRow) -> Result<Self> {
        // Defaulting here would wipe entitlements on the next billing write.
        let billing = serde_json::from_value(value.billing)
            .with_context(|| format!("invalid billing json for organization {}", value.id))?;

        Ok(Self {
            id: value.id,
            name: value.name,
            billing,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}
