pub mod feature_statuses;
pub mod product_feature_keys;
pub mod usage_meters;
