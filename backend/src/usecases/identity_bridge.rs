use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use platform::{
    analytics::posthog_client::PosthogClient,
    domain::{
        entities::organizations::OrganizationEntity,
        value_objects::enums::{
            feature_statuses::FeatureStatus, product_feature_keys::ProductFeatureKey,
        },
    },
};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::SessionUser;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyticsCollector: Send + Sync {
    async fn identify(&self, user_id: &str, attributes: Map<String, Value>) -> AnyResult<()>;

    /// Sets the group's properties and links `user_id` to it.
    async fn group(
        &self,
        user_id: &str,
        group_type: &str,
        group_id: &str,
        attributes: Map<String, Value>,
    ) -> AnyResult<()>;
}

#[async_trait]
impl AnalyticsCollector for PosthogClient {
    async fn identify(&self, user_id: &str, attributes: Map<String, Value>) -> AnyResult<()> {
        self.identify(user_id, attributes).await
    }

    async fn group(
        &self,
        user_id: &str,
        group_type: &str,
        group_id: &str,
        attributes: Map<String, Value>,
    ) -> AnyResult<()> {
        self.group_identify(user_id, group_type, group_id, attributes)
            .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSummary {
    pub id: Uuid,
    pub name: String,
    pub in_app_survey_billing_status: FeatureStatus,
    pub link_survey_billing_status: FeatureStatus,
    pub user_targeting_billing_status: FeatureStatus,
}

impl From<&OrganizationEntity> for OrganizationSummary {
    fn from(organization: &OrganizationEntity) -> Self {
        let features = &organization.billing.features;
        Self {
            id: organization.id,
            name: organization.name.clone(),
            in_app_survey_billing_status: features.get(ProductFeatureKey::InAppSurvey).status,
            link_survey_billing_status: features.get(ProductFeatureKey::LinkSurvey).status,
            user_targeting_billing_status: features.get(ProductFeatureKey::UserTargeting).status,
        }
    }
}

/// Everything the analytics collector is told about one page view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityContext {
    pub user: Option<SessionUser>,
    pub environment_id: Option<Uuid>,
    pub organization: Option<OrganizationSummary>,
}

pub const MAX_TRACKED_USERS: usize = 10_000;

/// Last synced context per user, bounded; the oldest user is forgotten first.
struct SyncedContexts {
    by_user: HashMap<Uuid, IdentityContext>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl SyncedContexts {
    fn new(capacity: usize) -> Self {
        Self {
            by_user: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, user_id: &Uuid) -> Option<&IdentityContext> {
        self.by_user.get(user_id)
    }

    fn record(&mut self, user_id: Uuid, context: IdentityContext) {
        if self.by_user.insert(user_id, context).is_some() {
            return;
        }

        self.order.push_back(user_id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.by_user.remove(&oldest);
                debug!(user_id = %oldest, "identity_bridge: evicted synced context");
            }
        }
    }
}

pub struct IdentityBridge<A>
where
    A: AnalyticsCollector + 'static,
{
    collector: Option<Arc<A>>,
    last_synced: Mutex<SyncedContexts>,
}

impl<A> IdentityBridge<A>
where
    A: AnalyticsCollector + 'static,
{
    pub fn new(collector: Option<Arc<A>>) -> Self {
        Self::with_capacity(collector, MAX_TRACKED_USERS)
    }

    pub fn with_capacity(collector: Option<Arc<A>>, capacity: usize) -> Self {
        Self {
            collector,
            last_synced: Mutex::new(SyncedContexts::new(capacity)),
        }
    }

    /// Pushes the user, environment and organization into analytics.
    ///
    /// Returns `true` when the collector was called. Nothing is sent without
    /// a session user, and a context identical to the last one synced for
    /// the same user is skipped. Collector failures never reach the caller.
    pub async fn sync(&self, context: &IdentityContext) -> bool {
        let Some(collector) = self.collector.as_ref() else {
            return false;
        };
        let Some(user) = context.user.as_ref() else {
            debug!("identity_bridge: no session user; skipping");
            return false;
        };

        if self.last_synced.lock().await.get(&user.user_id) == Some(context) {
            debug!(user_id = %user.user_id, "identity_bridge: context unchanged");
            return false;
        }

        let mut delivered = true;
        let user_id = user.user_id.to_string();

        let user_attributes = attributes([
            ("name", optional_string(&user.name)),
            ("email", optional_string(&user.email)),
            ("role", optional_string(&user.role)),
            ("objective", optional_string(&user.objective)),
        ]);
        if let Err(err) = collector
            .identify(&user_id, user_attributes)
            .await
        {
            warn!(user_id = %user.user_id, error = %err, "identity_bridge: identify failed");
            delivered = false;
        }

        if let Some(environment_id) = context.environment_id {
            let environment_id = environment_id.to_string();
            let environment_attributes =
                attributes([("name", Value::String(environment_id.clone()))]);
            if let Err(err) = collector
                .group(&user_id, "environment", &environment_id, environment_attributes)
                .await
            {
                warn!(
                    %environment_id,
                    error = %err,
                    "identity_bridge: environment group failed"
                );
                delivered = false;
            }
        }

        if let Some(organization) = context.organization.as_ref() {
            let organization_attributes = attributes([
                ("name", Value::String(organization.name.clone())),
                (
                    "inAppSurveyBillingStatus",
                    status_value(organization.in_app_survey_billing_status),
                ),
                (
                    "linkSurveyBillingStatus",
                    status_value(organization.link_survey_billing_status),
                ),
                (
                    "userTargetingBillingStatus",
                    status_value(organization.user_targeting_billing_status),
                ),
            ]);
            if let Err(err) = collector
                .group(
                    &user_id,
                    "organization",
                    &organization.id.to_string(),
                    organization_attributes,
                )
                .await
            {
                warn!(
                    organization_id = %organization.id,
                    error = %err,
                    "identity_bridge: organization group failed"
                );
                delivered = false;
            }
        }

        // A partial failure is retried on the next page view.
        if delivered {
            self.last_synced
                .lock()
                .await
                .record(user.user_id, context.clone());
            info!(user_id = %user.user_id, "identity_bridge: context synced");
        }

        true
    }
}

fn attributes<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn optional_string(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

fn status_value(status: FeatureStatus) -> Value {
    Value::String(status.to_string())
}
