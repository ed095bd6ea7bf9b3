pub mod health;
pub mod resource_usage;
