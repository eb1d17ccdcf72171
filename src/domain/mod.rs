pub mod error;
pub mod gas_policy;
pub mod types;
pub mod upgrade_policy;
