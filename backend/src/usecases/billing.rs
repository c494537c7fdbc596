use std::{collections::HashMap, sync::Arc};

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use platform::{
    domain::{
        entities::organizations::OrganizationEntity,
        repositories::{
            organizations::OrganizationRepository, usage_metering::UsageMeteringRepository,
        },
        value_objects::{
            billing::{FeatureChange, OrganizationBillingUpdate},
            enums::{product_feature_keys::ProductFeatureKey, usage_meters::UsageMeter},
            subscription_items::{BillingSubscription, SubscriptionLineItem},
        },
    },
    payments::stripe_client::{
        StripeClient, StripeCustomer, StripeCustomerUpdate, StripeEvent, StripeProduct,
        StripeSubscription,
    },
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::usage_reporting::UsageReporter;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StripeGateway: Send + Sync {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent>;

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription>;

    async fn retrieve_checkout_session_customer(
        &self,
        session_id: &str,
    ) -> AnyResult<StripeCustomer>;

    async fn retrieve_product(&self, product_id: &str) -> AnyResult<StripeProduct>;

    async fn create_usage_record(&self, subscription_item_id: &str, quantity: i64)
    -> AnyResult<()>;

    async fn update_customer(
        &self,
        customer_id: &str,
        customer_update: StripeCustomerUpdate,
    ) -> AnyResult<()>;
}

#[async_trait]
impl StripeGateway for StripeClient {
    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> AnyResult<StripeEvent> {
        self.verify_webhook_signature(payload, signature)
    }

    async fn retrieve_subscription(&self, subscription_id: &str) -> AnyResult<StripeSubscription> {
        self.retrieve_subscription(subscription_id).await
    }

    async fn retrieve_checkout_session_customer(
        &self,
        session_id: &str,
    ) -> AnyResult<StripeCustomer> {
        self.retrieve_checkout_session_customer(session_id).await
    }

    async fn retrieve_product(&self, product_id: &str) -> AnyResult<StripeProduct> {
        self.retrieve_product(product_id).await
    }

    async fn create_usage_record(
        &self,
        subscription_item_id: &str,
        quantity: i64,
    ) -> AnyResult<()> {
        self.create_usage_record(subscription_item_id, quantity).await
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        customer_update: StripeCustomerUpdate,
    ) -> AnyResult<()> {
        self.update_customer(customer_id, &customer_update).await
    }
}

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("stripe is not enabled; STRIPE_SECRET_KEY is not set")]
    NotConfigured,
    #[error("organization not found")]
    OrganizationNotFound,
    #[error("invalid webhook payload: {0}")]
    InvalidWebhook(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BillingError {
    /// Anything but a malformed delivery maps to a 5xx; Stripe redelivers those.
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            BillingError::InvalidWebhook(_) => StatusCode::BAD_REQUEST,
            BillingError::NotConfigured
            | BillingError::OrganizationNotFound
            | BillingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, BillingError>;

/// What buying one line item of a known product grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Unlimited,
    Metered(UsageMeter),
}

impl PurchaseOutcome {
    pub fn for_item(feature_key: ProductFeatureKey, lookup_key: Option<&str>) -> Self {
        if feature_key.is_unlimited_lookup_key(lookup_key) {
            PurchaseOutcome::Unlimited
        } else {
            PurchaseOutcome::Metered(feature_key.usage_meter())
        }
    }
}

/// Vendor-side collaborators. Absent when Stripe is not configured.
pub struct BillingIntegration<G, R>
where
    G: StripeGateway + 'static,
    R: UsageReporter + 'static,
{
    pub stripe: Arc<G>,
    pub usage_reporter: Arc<R>,
}

pub struct BillingUseCase<O, M, G, R>
where
    O: OrganizationRepository + Send + Sync + 'static,
    M: UsageMeteringRepository + Send + Sync + 'static,
    G: StripeGateway + 'static,
    R: UsageReporter + 'static,
{
    organization_repo: Arc<O>,
    usage_metering_repo: Arc<M>,
    integration: Option<BillingIntegration<G, R>>,
}

impl<O, M, G, R> BillingUseCase<O, M, G, R>
where
    O: OrganizationRepository + Send + Sync + 'static,
    M: UsageMeteringRepository + Send + Sync + 'static,
    G: StripeGateway + 'static,
    R: UsageReporter + 'static,
{
    pub fn new(
        organization_repo: Arc<O>,
        usage_metering_repo: Arc<M>,
        integration: Option<BillingIntegration<G, R>>,
    ) -> Self {
        Self {
            organization_repo,
            usage_metering_repo,
            integration,
        }
    }

    fn integration(&self) -> UseCaseResult<&BillingIntegration<G, R>> {
        self.integration.as_ref().ok_or_else(|| {
            error!("billing: stripe integration is not configured");
            BillingError::NotConfigured
        })
    }

    pub async fn handle_stripe_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> UseCaseResult<()> {
        let integration = self.integration()?;

        let Some(signature) = signature else {
            warn!(
                payload_len = payload.len(),
                "billing: stripe webhook without signature header"
            );
            return Err(BillingError::InvalidWebhook(
                "missing stripe-signature header".to_string(),
            ));
        };

        let event = integration
            .stripe
            .verify_webhook_signature(payload, signature)
            .map_err(|err| {
                warn!(
                    error = %err,
                    payload_len = payload.len(),
                    "billing: stripe webhook verification failed"
                );
                BillingError::InvalidWebhook("signature verification failed".into())
            })?;

        info!(
            event_id = ?event.id,
            event_type = %event.type_,
            livemode = ?event.livemode,
            "billing: stripe webhook verified"
        );

        match event.type_.as_str() {
            "checkout.session.completed" => self.handle_checkout_session_completed(&event).await,
            "customer.subscription.deleted" => self.handle_subscription_deleted(&event).await,
            _ => {
                debug!(event_type = %event.type_, "billing: unhandled stripe event type");
                Ok(())
            }
        }
    }

    /// Reconciles a completed checkout into the organization's entitlements.
    ///
    /// Entitlement changes are collected over the subscription's line items
    /// and written once at the end, so any failure before that write leaves
    /// the stored organization untouched.
    pub async fn handle_checkout_session_completed(
        &self,
        event: &StripeEvent,
    ) -> UseCaseResult<()> {
        let integration = self.integration()?;

        let session = StripeClient::extract_checkout_session(event).ok_or_else(|| {
            warn!("billing: checkout session missing in webhook");
            BillingError::InvalidWebhook("missing checkout session".to_string())
        })?;
        let subscription_id = session.subscription.clone().ok_or_else(|| {
            warn!(session_id = %session.id, "billing: checkout session has no subscription");
            BillingError::InvalidWebhook("subscription id missing on session".to_string())
        })?;

        let subscription: BillingSubscription = integration
            .stripe
            .retrieve_subscription(&subscription_id)
            .await
            .map_err(|err| {
                error!(
                    %subscription_id,
                    error = ?err,
                    "billing: failed to retrieve subscription from stripe"
                );
                BillingError::Internal(err)
            })?
            .into();

        let customer = integration
            .stripe
            .retrieve_checkout_session_customer(&session.id)
            .await
            .map_err(|err| {
                error!(
                    session_id = %session.id,
                    error = ?err,
                    "billing: failed to retrieve checkout session customer"
                );
                BillingError::Internal(err)
            })?;

        let organization = self
            .resolve_organization(subscription.organization_id.as_deref())
            .await?;

        info!(
            organization_id = %organization.id,
            %subscription_id,
            customer_id = %customer.id,
            item_count = subscription.items.len(),
            "billing: reconciling checkout"
        );

        let mut feature_changes = Vec::with_capacity(subscription.items.len());
        for item in &subscription.items {
            if let Some(change) = self
                .purchased_item_change(integration, &organization, &subscription, item)
                .await?
            {
                feature_changes.push(change);
            }
        }

        self.organization_repo
            .update_billing(
                organization.id,
                OrganizationBillingUpdate {
                    stripe_customer_id: Some(customer.id.clone()),
                    feature_changes,
                },
            )
            .await
            .map_err(|err| {
                error!(
                    organization_id = %organization.id,
                    db_error = ?err,
                    "billing: failed to persist organization billing"
                );
                BillingError::Internal(err)
            })?;

        let customer_update = StripeCustomerUpdate {
            name: organization.name.clone(),
            metadata: HashMap::from([(
                "organization".to_string(),
                organization.id.to_string(),
            )]),
            default_payment_method: subscription.default_payment_method.clone(),
        };

        integration
            .stripe
            .update_customer(&customer.id, customer_update)
            .await
            .map_err(|err| {
                error!(
                    organization_id = %organization.id,
                    customer_id = %customer.id,
                    error = ?err,
                    "billing: failed to update stripe customer"
                );
                BillingError::Internal(err)
            })?;

        info!(
            organization_id = %organization.id,
            %subscription_id,
            "billing: checkout reconciled"
        );

        Ok(())
    }

    /// Resets the products of a cancelled subscription to inactive.
    pub async fn handle_subscription_deleted(&self, event: &StripeEvent) -> UseCaseResult<()> {
        let integration = self.integration()?;

        let subscription: BillingSubscription = StripeClient::extract_subscription(event)
            .ok_or_else(|| {
                warn!("billing: invalid subscription payload in webhook");
                BillingError::InvalidWebhook("invalid subscription payload".to_string())
            })?
            .into();

        let organization = self
            .resolve_organization(subscription.organization_id.as_deref())
            .await?;

        let mut feature_changes = Vec::with_capacity(subscription.items.len());
        for item in &subscription.items {
            let product = self.retrieve_product(integration, item).await?;
            match ProductFeatureKey::from_product_name(&product.name) {
                Some(feature_key) => feature_changes.push(FeatureChange::Deactivate(feature_key)),
                None => debug!(
                    product_name = %product.name,
                    "billing: ignoring unknown product on cancelled subscription"
                ),
            }
        }

        self.organization_repo
            .update_billing(
                organization.id,
                OrganizationBillingUpdate {
                    stripe_customer_id: None,
                    feature_changes,
                },
            )
            .await
            .map_err(|err| {
                error!(
                    organization_id = %organization.id,
                    db_error = ?err,
                    "billing: failed to persist cancelled subscription"
                );
                BillingError::Internal(err)
            })?;

        info!(
            organization_id = %organization.id,
            subscription_id = %subscription.id,
            "billing: subscription cancellation reconciled"
        );

        Ok(())
    }

    async fn purchased_item_change(
        &self,
        integration: &BillingIntegration<G, R>,
        organization: &OrganizationEntity,
        subscription: &BillingSubscription,
        item: &SubscriptionLineItem,
    ) -> UseCaseResult<Option<FeatureChange>> {
        let product = self.retrieve_product(integration, item).await?;

        let Some(feature_key) = ProductFeatureKey::from_product_name(&product.name) else {
            debug!(
                organization_id = %organization.id,
                product_id = %product.id,
                product_name = %product.name,
                "billing: ignoring unknown product"
            );
            return Ok(None);
        };

        match PurchaseOutcome::for_item(feature_key, item.lookup_key.as_deref()) {
            PurchaseOutcome::Unlimited => {
                info!(
                    organization_id = %organization.id,
                    feature_key = %feature_key,
                    "billing: unlimited plan purchased"
                );
                Ok(Some(FeatureChange::Activate {
                    key: feature_key,
                    unlimited: true,
                }))
            }
            PurchaseOutcome::Metered(meter) => {
                let quantity = self.current_usage(organization.id, meter).await?;

                integration
                    .usage_reporter
                    .report_usage(&subscription.items, feature_key, quantity)
                    .await
                    .map_err(|err| {
                        error!(
                            organization_id = %organization.id,
                            feature_key = %feature_key,
                            quantity,
                            error = ?err,
                            "billing: failed to report usage"
                        );
                        BillingError::Internal(err)
                    })?;

                info!(
                    organization_id = %organization.id,
                    feature_key = %feature_key,
                    meter = %meter,
                    quantity,
                    "billing: metered plan purchased"
                );
                Ok(Some(FeatureChange::Activate {
                    key: feature_key,
                    unlimited: false,
                }))
            }
        }
    }

    async fn retrieve_product(
        &self,
        integration: &BillingIntegration<G, R>,
        item: &SubscriptionLineItem,
    ) -> UseCaseResult<StripeProduct> {
        integration
            .stripe
            .retrieve_product(&item.product_id)
            .await
            .map_err(|err| {
                error!(
                    product_id = %item.product_id,
                    subscription_item_id = %item.item_id,
                    error = ?err,
                    "billing: failed to retrieve product from stripe"
                );
                BillingError::Internal(err)
            })
    }

    async fn current_usage(&self, organization_id: Uuid, meter: UsageMeter) -> UseCaseResult<i64> {
        let count = match meter {
            UsageMeter::MonthlyResponses => {
                self.usage_metering_repo
                    .monthly_response_count(organization_id)
                    .await
            }
            UsageMeter::MonthlyActivePeople => {
                self.usage_metering_repo
                    .monthly_active_people_count(organization_id)
                    .await
            }
        };

        count.map_err(|err| {
            error!(
                %organization_id,
                meter = %meter,
                db_error = ?err,
                "billing: failed to compute usage"
            );
            BillingError::Internal(err)
        })
    }

    async fn resolve_organization(
        &self,
        raw_organization_id: Option<&str>,
    ) -> UseCaseResult<OrganizationEntity> {
        let Some(raw_organization_id) = raw_organization_id else {
            warn!("billing: subscription metadata has no organizationId");
            return Err(BillingError::OrganizationNotFound);
        };
        let Ok(organization_id) = Uuid::parse_str(raw_organization_id) else {
            warn!(
                organization_id = raw_organization_id,
                "billing: subscription metadata organizationId is not a uuid"
            );
            return Err(BillingError::OrganizationNotFound);
        };

        self.organization_repo
            .find_by_id(organization_id)
            .await
            .map_err(|err| {
                error!(
                    %organization_id,
                    db_error = ?err,
                    "billing: failed to load organization"
                );
                BillingError::Internal(err)
            })?
            .ok_or_else(|| {
                error!(%organization_id, "billing: organization not found");
                BillingError::OrganizationNotFound
            })
    }
}
