//! Invoice models and the staged-records accumulator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::invoice_licence::InvoiceLicence;
use super::transaction::Transaction;

/// Where an invoice sits in a rebilling chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebillingState {
    /// The cancelling invoice produced by a reissue.
    Reversal,
    /// The replacement invoice produced by a reissue.
    Rebill,
    /// A source invoice that has been reissued.
    Rebilled,
}

impl RebillingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebillingState::Reversal => "reversal",
            RebillingState::Rebill => "rebill",
            RebillingState::Rebilled => "rebilled",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "reversal" => Some(RebillingState::Reversal),
            "rebill" => Some(RebillingState::Rebill),
            "rebilled" => Some(RebillingState::Rebilled),
            _ => None,
        }
    }
}

/// An invoice for one account and financial year within a batch. Held in
/// memory until the batch persists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub invoice_account_id: Uuid,
    pub invoice_account_number: String,
    pub financial_year_ending: i32,
    pub address: serde_json::Value,
    pub is_credit: bool,
    /// Assigned only after the Charging Module confirms the invoice.
    pub external_id: Option<Uuid>,
    /// Signed pence.
    pub net_amount: Option<i64>,
    pub is_de_minimis: bool,
    pub invoice_value: Option<i64>,
    pub credit_note_value: Option<i64>,
    pub is_flagged_for_rebilling: bool,
    pub rebilling_state: Option<RebillingState>,
    /// Points at the first invoice of a rebilling chain. Set once, never
    /// overwritten once populated.
    pub original_invoice_id: Option<Uuid>,
}

/// An invoice licence loaded with its transactions, as fetched for rebilling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInvoiceLicence {
    pub invoice_licence: InvoiceLicence,
    pub transactions: Vec<Transaction>,
}

/// A previously issued invoice loaded with its licences and transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInvoice {
    pub invoice: Invoice,
    pub invoice_licences: Vec<SourceInvoiceLicence>,
}

/// The records a run stages for persistence. One named accumulator rather
/// than loosely-typed maps threaded through the loops.
#[derive(Debug, Clone, Default)]
pub struct StagedRecords {
    pub invoices: Vec<Invoice>,
    pub invoice_licences: Vec<InvoiceLicence>,
    pub transactions: Vec<Transaction>,
}

impl StagedRecords {
    pub fn is_empty(&self) -> bool {
        self.invoices.is_empty()
            && self.invoice_licences.is_empty()
            && self.transactions.is_empty()
    }

    pub fn extend(&mut self, other: StagedRecords) {
        self.invoices.extend(other.invoices);
        self.invoice_licences.extend(other.invoice_licences);
        self.transactions.extend(other.transactions);
    }
}
