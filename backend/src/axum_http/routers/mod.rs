pub mod billing_webhook;
pub mod environment_layout;
