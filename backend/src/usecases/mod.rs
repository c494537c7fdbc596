pub mod billing;
pub mod environment_layout;
pub mod identity_bridge;
pub mod usage_reporting;
