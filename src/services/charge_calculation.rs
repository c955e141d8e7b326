//! Charge calculation collaborator interface and charge period derivation.

use crate::error::BillingError;
use crate::models::{BillingPeriod, ChargeElement, ChargePeriod, ChargeVersion, Transaction};

/// Computes candidate transactions for one charge element. The pricing rules
/// themselves live outside this crate.
pub trait ChargeCalculator: Send + Sync {
    fn calculate(
        &self,
        element: &ChargeElement,
        billing_period: &BillingPeriod,
        charge_period: &ChargePeriod,
        is_new_licence: bool,
        is_water_undertaker: bool,
    ) -> Result<Vec<Transaction>, BillingError>;
}

/// The slice of a charge version's effective range that falls inside the
/// billing period. A disjoint range is an error; the period processor treats
/// it as fatal to the batch.
pub fn charge_period(
    charge_version: &ChargeVersion,
    billing_period: &BillingPeriod,
) -> Result<ChargePeriod, BillingError> {
    let start_date = charge_version.start_date.max(billing_period.start_date);
    let end_date = charge_version
        .end_date
        .unwrap_or(billing_period.end_date)
        .min(billing_period.end_date);

    if start_date > end_date {
        return Err(BillingError::ChargePeriodOutOfRange {
            charge_version_id: charge_version.id,
        });
    }

    Ok(ChargePeriod {
        start_date,
        end_date,
    })
}
