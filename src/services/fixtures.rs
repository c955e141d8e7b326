//! Shared builders for unit tests.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{
    ChargeType, InvoiceLicence, Purpose, Transaction, TransactionStatus,
};

pub fn invoice_licence() -> InvoiceLicence {
    InvoiceLicence {
        id: Uuid::new_v4(),
        invoice_id: Uuid::new_v4(),
        licence_id: Uuid::new_v4(),
        licence_ref: "01/123/R01".to_string(),
    }
}

/// A debit transaction with the given charge category and billable days; all
/// other matching-key fields are defaulted so two calls with equal arguments
/// produce structurally identical keys.
pub fn transaction(charge_category_code: &str, billable_days: i32) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        invoice_licence_id: Uuid::new_v4(),
        is_credit: false,
        status: TransactionStatus::Candidate,
        charge_type: ChargeType::Standard,
        description: "Water abstraction charge".to_string(),
        charge_category_code: charge_category_code.to_string(),
        charge_category_description: None,
        start_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        billable_days,
        authorised_days: 365,
        section_126_factor: Decimal::ONE,
        section_127_agreement: false,
        section_130_agreement: false,
        aggregate_factor: Decimal::ONE,
        adjustment_factor: Decimal::ONE,
        is_winter_only: false,
        is_supported_source: false,
        supported_source_name: None,
        is_water_company_charge: false,
        is_new_licence: false,
        external_id: None,
        net_amount: None,
        purposes: vec![Purpose {
            code: "400".to_string(),
            description: "Spray irrigation".to_string(),
        }],
    }
}
