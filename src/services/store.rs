//! Persistence interface consumed by the billing engine.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{Invoice, InvoiceLicence, RebillingState, SourceInvoice, Transaction};

/// Persistence collaborator. The engine only ever inserts the records it
/// constructs and patches rebilling fields on a source invoice; it never
/// deletes persisted rows.
///
/// Callers insert parents before children: invoices, then invoice licences,
/// then transactions.
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Prior debit transactions for the account/licence/year that have not
    /// been cancelled out, with purposes normalised.
    async fn fetch_previous_transactions(
        &self,
        invoice_account_number: &str,
        licence_ref: &str,
        financial_year_ending: i32,
    ) -> Result<Vec<Transaction>, BillingError>;

    /// All invoices flagged for rebilling in a region, each loaded with its
    /// invoice licences and their transactions.
    async fn find_invoices_flagged_for_rebilling(
        &self,
        region_id: Uuid,
    ) -> Result<Vec<SourceInvoice>, BillingError>;

    async fn insert_invoices(&self, invoices: &[Invoice]) -> Result<(), BillingError>;

    async fn insert_invoice_licences(
        &self,
        invoice_licences: &[InvoiceLicence],
    ) -> Result<(), BillingError>;

    async fn insert_transactions(&self, transactions: &[Transaction]) -> Result<(), BillingError>;

    /// Patch a source invoice's rebilling fields after a successful reissue.
    async fn update_invoice_rebilling(
        &self,
        invoice_id: Uuid,
        rebilling_state: RebillingState,
        original_invoice_id: Uuid,
    ) -> Result<(), BillingError>;
}
