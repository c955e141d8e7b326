//! Charge version models. Read-only inputs to the engine; never mutated.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Charge version status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeVersionStatus {
    Current,
    Superseded,
    Draft,
}

impl ChargeVersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeVersionStatus::Current => "current",
            ChargeVersionStatus::Superseded => "superseded",
            ChargeVersionStatus::Draft => "draft",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "current" => ChargeVersionStatus::Current,
            "superseded" => ChargeVersionStatus::Superseded,
            _ => ChargeVersionStatus::Draft,
        }
    }
}

/// The licence a charge version bills against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Licence {
    pub id: Uuid,
    pub licence_ref: String,
    pub is_water_undertaker: bool,
}

/// An invoice account, deduplicated from the charge versions of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceAccount {
    pub id: Uuid,
    pub account_number: String,
}

/// Abstraction purpose metadata carried through to transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purpose {
    pub code: String,
    pub description: String,
}

/// The per-element charging terms handed to the charge calculation
/// collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeElement {
    pub id: Uuid,
    pub description: String,
    pub charge_category_code: String,
    pub authorised_annual_quantity: Decimal,
    pub section_126_factor: Decimal,
    pub section_127_agreement: bool,
    pub section_130_agreement: bool,
    pub aggregate_factor: Decimal,
    pub adjustment_factor: Decimal,
    pub is_winter_only: bool,
    pub is_supported_source: bool,
    pub supported_source_name: Option<String>,
    pub purpose: Purpose,
}

/// A licence's effective charging terms for a period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeVersion {
    pub id: Uuid,
    pub invoice_account_id: Uuid,
    pub invoice_account_number: String,
    pub licence: Licence,
    pub status: ChargeVersionStatus,
    pub start_date: NaiveDate,
    /// Open-ended when `None`.
    pub end_date: Option<NaiveDate>,
    pub scheme: String,
    pub is_new_licence: bool,
    pub charge_elements: Vec<ChargeElement>,
}
