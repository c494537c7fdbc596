pub mod billing;
pub mod enums;
pub mod subscription_items;
