//! Batch and billing period models.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Batch status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Processing,
    Ready,
    Sent,
    Error,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Ready => "ready",
            BatchStatus::Sent => "sent",
            BatchStatus::Error => "error",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "ready" => BatchStatus::Ready,
            "sent" => BatchStatus::Sent,
            "error" => BatchStatus::Error,
            _ => BatchStatus::Processing,
        }
    }
}

/// A supplementary billing batch. The batch row itself is created by the
/// outer job runner; the engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub region_id: Uuid,
    /// Bill run id assigned by the Charging Module.
    pub external_id: Uuid,
    pub scheme: String,
    pub status: BatchStatus,
}

/// One financial year's date range being billed. Immutable value supplied by
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl BillingPeriod {
    pub fn financial_year_ending(&self) -> i32 {
        self.end_date.year()
    }
}

/// The slice of a charge version's effective range that falls inside the
/// billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargePeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}
