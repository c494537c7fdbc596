use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::usage_meters::UsageMeter;

/// Stripe product display names as configured in the billing catalog.
pub const IN_APP_SURVEY_PRODUCT_NAME: &str = "Formbricks In App Survey";
pub const LINK_SURVEY_PRODUCT_NAME: &str = "Formbricks Link Survey";
pub const USER_TARGETING_PRODUCT_NAME: &str = "Formbricks User Identification";

const IN_APP_SURVEY_UNLIMITED_LOOKUP_KEYS: &[&str] =
    &["survey-unlimited-03112023", "survey-unlimited-33-27022024"];
const LINK_SURVEY_UNLIMITED_LOOKUP_KEYS: &[&str] =
    &["linkSurvey-unlimited-19", "linkSurvey-unlimited-33-27022024"];
const USER_TARGETING_UNLIMITED_LOOKUP_KEYS: &[&str] = &[
    "userTargeting-unlimited-03112023",
    "userTargeting-unlimited-33-27022024",
];

/// Billable products. The set is closed: every organization carries exactly
/// one entitlement per key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ProductFeatureKey {
    InAppSurvey,
    LinkSurvey,
    UserTargeting,
}

impl Display for ProductFeatureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ProductFeatureKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductFeatureKey::InAppSurvey => "inAppSurvey",
            ProductFeatureKey::LinkSurvey => "linkSurvey",
            ProductFeatureKey::UserTargeting => "userTargeting",
        }
    }

    /// Matches a Stripe product name. Names outside the catalog yield `None`.
    pub fn from_product_name(name: &str) -> Option<Self> {
        match name {
            IN_APP_SURVEY_PRODUCT_NAME => Some(ProductFeatureKey::InAppSurvey),
            LINK_SURVEY_PRODUCT_NAME => Some(ProductFeatureKey::LinkSurvey),
            USER_TARGETING_PRODUCT_NAME => Some(ProductFeatureKey::UserTargeting),
            _ => None,
        }
    }

    pub fn is_unlimited_lookup_key(&self, lookup_key: Option<&str>) -> bool {
        let Some(lookup_key) = lookup_key else {
            return false;
        };
        let keys = match self {
            ProductFeatureKey::InAppSurvey => IN_APP_SURVEY_UNLIMITED_LOOKUP_KEYS,
            ProductFeatureKey::LinkSurvey => LINK_SURVEY_UNLIMITED_LOOKUP_KEYS,
            ProductFeatureKey::UserTargeting => USER_TARGETING_UNLIMITED_LOOKUP_KEYS,
        };
        keys.contains(&lookup_key)
    }

    /// Lookup key of the metered price that usage records are reported against.
    pub fn metered_lookup_key(&self) -> &'static str {
        self.as_str()
    }

    pub fn usage_meter(&self) -> UsageMeter {
        match self {
            ProductFeatureKey::InAppSurvey | ProductFeatureKey::LinkSurvey => {
                UsageMeter::MonthlyResponses
            }
            ProductFeatureKey::UserTargeting => UsageMeter::MonthlyActivePeople,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_catalog_product_names() {
        assert_eq!(
            ProductFeatureKey::from_product_name(IN_APP_SURVEY_PRODUCT_NAME),
            Some(ProductFeatureKey::InAppSurvey)
        );
        assert_eq!(
            ProductFeatureKey::from_product_name(USER_TARGETING_PRODUCT_NAME),
            Some(ProductFeatureKey::UserTargeting)
        );
        assert_eq!(ProductFeatureKey::from_product_name("Enterprise Add-on"), None);
    }

    #[test]
    fn unlimited_lookup_keys_are_scoped_per_product() {
        assert!(
            ProductFeatureKey::LinkSurvey.is_unlimited_lookup_key(Some("linkSurvey-unlimited-19"))
        );
        assert!(
            !ProductFeatureKey::InAppSurvey
                .is_unlimited_lookup_key(Some("linkSurvey-unlimited-19"))
        );
        assert!(!ProductFeatureKey::InAppSurvey.is_unlimited_lookup_key(Some("inAppSurvey")));
        assert!(!ProductFeatureKey::UserTargeting.is_unlimited_lookup_key(None));
    }

    #[test]
    fn user_targeting_is_metered_on_active_people() {
        assert_eq!(
            ProductFeatureKey::UserTargeting.usage_meter(),
            UsageMeter::MonthlyActivePeople
        );
        assert_eq!(
            ProductFeatureKey::InAppSurvey.usage_meter(),
            UsageMeter::MonthlyResponses
        );
    }
}
