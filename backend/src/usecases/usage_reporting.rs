use std::sync::Arc;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use platform::domain::value_objects::{
    enums::product_feature_keys::ProductFeatureKey,
    subscription_items::{SubscriptionLineItem, find_item_by_lookup_key},
};
use tracing::{debug, info};

use super::billing::StripeGateway;

/// Hands a freshly computed usage counter to the vendor so overage can be billed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageReporter: Send + Sync {
    async fn report_usage(
        &self,
        items: &[SubscriptionLineItem],
        feature_key: ProductFeatureKey,
        quantity: i64,
    ) -> AnyResult<()>;
}

pub struct StripeUsageReporter<G>
where
    G: StripeGateway + 'static,
{
    stripe: Arc<G>,
}

impl<G> StripeUsageReporter<G>
where
    G: StripeGateway + 'static,
{
    pub fn new(stripe: Arc<G>) -> Self {
        Self { stripe }
    }
}

#[async_trait]
impl<G> UsageReporter for StripeUsageReporter<G>
where
    G: StripeGateway + 'static,
{
    async fn report_usage(
        &self,
        items: &[SubscriptionLineItem],
        feature_key: ProductFeatureKey,
        quantity: i64,
    ) -> AnyResult<()> {
        let lookup_key = feature_key.metered_lookup_key();
        let Some(item) = find_item_by_lookup_key(items, lookup_key) else {
            debug!(
                feature_key = %feature_key,
                lookup_key,
                "usage_reporting: subscription has no metered item; nothing to report"
            );
            return Ok(());
        };

        self.stripe.create_usage_record(&item.item_id, quantity).await?;

        info!(
            feature_key = %feature_key,
            subscription_item_id = %item.item_id,
            quantity,
            "usage_reporting: usage record set"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::billing::MockStripeGateway;
    use mockall::predicate::eq;

    fn line_item(item_id: &str, lookup_key: Option<&str>) -> SubscriptionLineItem {
        SubscriptionLineItem {
            item_id: item_id.to_string(),
            product_id: format!("prod_{item_id}"),
            lookup_key: lookup_key.map(str::to_string),
            quantity: 1,
        }
    }

    #[tokio::test]
    async fn sets_usage_on_matching_metered_item() {
        let mut stripe = MockStripeGateway::new();
        stripe
            .expect_create_usage_record()
            .with(eq("si_metered"), eq(742_i64))
            .times(1)
            .returning(|_, _| Ok(()));

        let reporter = StripeUsageReporter::new(Arc::new(stripe));
        let items = vec![
            line_item("si_flat", Some("survey-unlimited-03112023")),
            line_item("si_metered", Some("inAppSurvey")),
        ];

        reporter
            .report_usage(&items, ProductFeatureKey::InAppSurvey, 742)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn skips_when_no_metered_item_matches() {
        let mut stripe = MockStripeGateway::new();
        stripe.expect_create_usage_record().times(0);

        let reporter = StripeUsageReporter::new(Arc::new(stripe));
        let items = vec![line_item("si_metered", Some("inAppSurvey"))];

        reporter
            .report_usage(&items, ProductFeatureKey::UserTargeting, 10)
            .await
            .unwrap();
    }
}
