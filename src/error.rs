//! Error types for the supplementary billing engine.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Batch-level error codes surfaced to the outer job runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchErrorCode {
    FailedToProcessChargeVersions,
}

impl BatchErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchErrorCode::FailedToProcessChargeVersions => "failed-to-process-charge-versions",
        }
    }
}

impl fmt::Display for BatchErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum BillingError {
    /// Non-2xx response from the Charging Module. Never retried here.
    #[error("Charging Module request failed with status {status}: {body}")]
    ChargingModuleRequest { status: u16, body: String },

    #[error("Charging Module transport error: {0}")]
    ChargingModuleTransport(anyhow::Error),

    #[error("failed to reissue invoice {invoice_external_id} in bill run {batch_external_id}")]
    ReissueInvoiceFailed {
        batch_external_id: Uuid,
        invoice_external_id: Uuid,
        #[source]
        source: Box<BillingError>,
    },

    #[error("failed to fetch invoice {invoice_external_id} from bill run {batch_external_id}")]
    ViewInvoiceFailed {
        batch_external_id: Uuid,
        invoice_external_id: Uuid,
        #[source]
        source: Box<BillingError>,
    },

    #[error("failed to fetch status for bill run {batch_external_id}")]
    BillRunStatusFailed {
        batch_external_id: Uuid,
        #[source]
        source: Box<BillingError>,
    },

    #[error("bill run {batch_external_id} still pending after {attempts} status checks")]
    BillRunPollTimeout {
        batch_external_id: Uuid,
        attempts: u32,
    },

    #[error("batch {batch_id} failed with code {code}")]
    ChargeVersionProcessing {
        batch_id: Uuid,
        code: BatchErrorCode,
        #[source]
        source: Box<BillingError>,
    },

    #[error("charge version {charge_version_id} does not intersect the billing period")]
    ChargePeriodOutOfRange { charge_version_id: Uuid },

    #[error("invoice {invoice_id} has no Charging Module id")]
    MissingExternalId { invoice_id: Uuid },

    #[error("bill run invoice {invoice_external_id} carries no licence {licence_ref}")]
    CmLicenceNotFound {
        invoice_external_id: Uuid,
        licence_ref: String,
    },

    #[error("no Charging Module transaction rebills source transaction {transaction_id}")]
    CmTransactionNotFound { transaction_id: Uuid },

    #[error("Calculation error: {0}")]
    CalculationError(anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        BillingError::ChargingModuleTransport(anyhow::Error::new(err))
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::DatabaseError(anyhow::Error::new(err))
    }
}
