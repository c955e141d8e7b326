//! Transaction model and the matching key used for cancellation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::charge_version::Purpose;

/// Transaction lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Staged in memory, not yet confirmed or priced by the Charging Module.
    Candidate,
    /// Priced by the Charging Module; immutable once persisted.
    ChargeCreated,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Candidate => "candidate",
            TransactionStatus::ChargeCreated => "charge_created",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "charge_created" => TransactionStatus::ChargeCreated,
            _ => TransactionStatus::Candidate,
        }
    }
}

/// Charge type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeType {
    Standard,
    Compensation,
    MinimumCharge,
}

impl ChargeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeType::Standard => "standard",
            ChargeType::Compensation => "compensation",
            ChargeType::MinimumCharge => "minimum_charge",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "compensation" => ChargeType::Compensation,
            "minimum_charge" => ChargeType::MinimumCharge,
            _ => ChargeType::Standard,
        }
    }
}

/// The chargeable line item.
///
/// Monetary values assigned by the Charging Module are signed integer pence:
/// positive for debits, negative for credits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub invoice_licence_id: Uuid,
    pub is_credit: bool,
    pub status: TransactionStatus,
    pub charge_type: ChargeType,
    pub description: String,
    pub charge_category_code: String,
    pub charge_category_description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub billable_days: i32,
    pub authorised_days: i32,
    pub section_126_factor: Decimal,
    pub section_127_agreement: bool,
    pub section_130_agreement: bool,
    pub aggregate_factor: Decimal,
    pub adjustment_factor: Decimal,
    pub is_winter_only: bool,
    pub is_supported_source: bool,
    pub supported_source_name: Option<String>,
    pub is_water_company_charge: bool,
    pub is_new_licence: bool,
    /// Assigned by the Charging Module once the transaction is created there.
    pub external_id: Option<Uuid>,
    /// Signed pence; `None` until the Charging Module prices the transaction.
    pub net_amount: Option<i64>,
    pub purposes: Vec<Purpose>,
}

/// The tuple of charge-determining fields. Two transactions with an identical
/// key and opposite credit/debit sign are a cancelling pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchingKey {
    pub charge_type: ChargeType,
    pub charge_category_code: String,
    pub billable_days: i32,
    pub section_126_factor: Decimal,
    pub section_127_agreement: bool,
    pub section_130_agreement: bool,
    pub aggregate_factor: Decimal,
    pub adjustment_factor: Decimal,
    pub is_winter_only: bool,
    pub is_supported_source: bool,
    pub supported_source_name: Option<String>,
    pub is_water_company_charge: bool,
}

impl Transaction {
    pub fn matching_key(&self) -> MatchingKey {
        MatchingKey {
            charge_type: self.charge_type,
            charge_category_code: self.charge_category_code.clone(),
            billable_days: self.billable_days,
            section_126_factor: self.section_126_factor,
            section_127_agreement: self.section_127_agreement,
            section_130_agreement: self.section_130_agreement,
            aggregate_factor: self.aggregate_factor,
            adjustment_factor: self.adjustment_factor,
            is_winter_only: self.is_winter_only,
            is_supported_source: self.is_supported_source,
            supported_source_name: self.supported_source_name.clone(),
            is_water_company_charge: self.is_water_company_charge,
        }
    }
}
