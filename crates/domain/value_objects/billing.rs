use serde::{Deserialize, Serialize};

use super::enums::{feature_statuses::FeatureStatus, product_feature_keys::ProductFeatureKey};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
pub struct FeatureEntitlement {
    #[serde(default)]
    pub status: FeatureStatus,
    #[serde(default)]
    pub unlimited: bool,
}

/// Per-product entitlements. Stored inside the `billing` JSONB column with
/// the camelCase keys the web app reads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationFeatures {
    #[serde(default)]
    pub in_app_survey: FeatureEntitlement,
    #[serde(default)]
    pub link_survey: FeatureEntitlement,
    #[serde(default)]
    pub user_targeting: FeatureEntitlement,
}

impl OrganizationFeatures {
    pub fn get(&self, key: ProductFeatureKey) -> &FeatureEntitlement {
        match key {
            ProductFeatureKey::InAppSurvey => &self.in_app_survey,
            ProductFeatureKey::LinkSurvey => &self.link_survey,
            ProductFeatureKey::UserTargeting => &self.user_targeting,
        }
    }

    fn get_mut(&mut self, key: ProductFeatureKey) -> &mut FeatureEntitlement {
        match key {
            ProductFeatureKey::InAppSurvey => &mut self.in_app_survey,
            ProductFeatureKey::LinkSurvey => &mut self.link_survey,
            ProductFeatureKey::UserTargeting => &mut self.user_targeting,
        }
    }

    /// Activates `key`. `unlimited` only ever raises the flag; a metered
    /// line item never clears an unlimited one seen earlier in the same fold.
    pub fn with_activated(mut self, key: ProductFeatureKey, unlimited: bool) -> Self {
        let entitlement = self.get_mut(key);
        entitlement.status = FeatureStatus::Active;
        if unlimited {
            entitlement.unlimited = true;
        }
        self
    }

    pub fn with_deactivated(mut self, key: ProductFeatureKey) -> Self {
        *self.get_mut(key) = FeatureEntitlement::default();
        self
    }

    pub fn with_change(self, change: FeatureChange) -> Self {
        match change {
            FeatureChange::Activate { key, unlimited } => self.with_activated(key, unlimited),
            FeatureChange::Deactivate(key) => self.with_deactivated(key),
        }
    }
}

/// One entitlement transition derived from a vendor event. Changes are
/// replayed onto whatever is stored at write time, never onto a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureChange {
    Activate {
        key: ProductFeatureKey,
        unlimited: bool,
    },
    Deactivate(ProductFeatureKey),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationBilling {
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub features: OrganizationFeatures,
}

/// Partial billing write. A `None` customer id keeps the stored one; feature
/// changes are applied in order on top of the stored features.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationBillingUpdate {
    pub stripe_customer_id: Option<String>,
    pub feature_changes: Vec<FeatureChange>,
}

impl OrganizationBillingUpdate {
    pub fn apply_to(&self, features: OrganizationFeatures) -> OrganizationFeatures {
        self.feature_changes
            .iter()
            .fold(features, |features, change| features.with_change(*change))
    }
}

impl OrganizationBilling {
    pub fn merged(mut self, update: OrganizationBillingUpdate) -> Self {
        self.features = update.apply_to(self.features);
        if let Some(customer_id) = update.stripe_customer_id {
            self.stripe_customer_id = Some(customer_id);
        }
        self
    }
}
