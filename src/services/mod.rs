//! Services module for the supplementary billing engine.

pub mod charge_calculation;
pub mod charging_module;
pub mod database;
pub mod matching;
pub mod metrics;
pub mod period_processor;
pub mod pre_generation;
pub mod rebilling;
pub mod reissue;
pub mod reversal;
pub mod store;

#[cfg(test)]
pub(crate) mod fixtures;

pub use charge_calculation::{charge_period, ChargeCalculator};
pub use charging_module::{ChargingModuleClient, HttpChargingModuleClient};
pub use database::Database;
pub use metrics::{get_metrics, init_metrics, record_error};
pub use period_processor::SupplementaryProcessor;
pub use pre_generation::{pre_generate, PreGeneratedData};
pub use rebilling::RebillingCoordinator;
pub use reissue::ReissueService;
pub use store::BillingStore;
