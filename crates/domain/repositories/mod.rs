pub mod environments;
pub mod organizations;
pub mod usage_metering;
