use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeatureStatus {
    #[default]
    Inactive,
    Active,
}

impl Display for FeatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            FeatureStatus::Inactive => "inactive",
            FeatureStatus::Active => "active",
        };
        write!(f, "{}", status)
    }
}
