//! Pre-generation of invoice and invoice-licence records.
//!
//! Every (account, licence) combination appearing in a batch of charge
//! versions gets its records generated up front, so the processing loop can
//! resolve foreign keys without a database round trip.

use std::collections::HashMap;

use serde_json::json;
use uuid::Uuid;

use crate::models::{BillingPeriod, ChargeVersion, Invoice, InvoiceAccount, InvoiceLicence};

/// Composite key for one invoice-licence pair within a processing pass.
pub type InvoiceLicenceKey = (Uuid, Uuid);

/// Not-yet-persisted invoice and invoice-licence records, keyed for dedup.
#[derive(Debug, Default)]
pub struct PreGeneratedData {
    /// Keyed by invoice account id.
    pub invoices: HashMap<Uuid, Invoice>,
    /// Keyed by (invoice id, licence id).
    pub invoice_licences: HashMap<InvoiceLicenceKey, InvoiceLicence>,
}

/// Generate exactly one invoice per account and one invoice licence per
/// (invoice, licence) pair. Idempotent across repeated charge versions
/// referencing the same account and licence within one call.
pub fn pre_generate(
    charge_versions: &[ChargeVersion],
    invoice_accounts: &[InvoiceAccount],
    batch_id: Uuid,
    billing_period: &BillingPeriod,
) -> PreGeneratedData {
    let mut data = PreGeneratedData::default();

    for account in invoice_accounts {
        data.invoices
            .entry(account.id)
            .or_insert_with(|| new_invoice(account, batch_id, billing_period));
    }

    for charge_version in charge_versions {
        let invoice = match data.invoices.get(&charge_version.invoice_account_id) {
            Some(invoice) => invoice,
            None => continue,
        };

        let key = (invoice.id, charge_version.licence.id);
        let invoice_id = invoice.id;
        data.invoice_licences.entry(key).or_insert_with(|| InvoiceLicence {
            id: Uuid::new_v4(),
            invoice_id,
            licence_id: charge_version.licence.id,
            licence_ref: charge_version.licence.licence_ref.clone(),
        });
    }

    data
}

/// Base invoice for a rebilling pass, derived from the source invoice rather
/// than from charge versions.
pub fn pre_generate_rebill_invoice(source: &Invoice, batch_id: Uuid) -> Invoice {
    Invoice {
        id: Uuid::new_v4(),
        batch_id,
        invoice_account_id: source.invoice_account_id,
        invoice_account_number: source.invoice_account_number.clone(),
        financial_year_ending: source.financial_year_ending,
        address: json!({}),
        is_credit: false,
        external_id: None,
        net_amount: None,
        is_de_minimis: false,
        invoice_value: None,
        credit_note_value: None,
        is_flagged_for_rebilling: false,
        rebilling_state: None,
        original_invoice_id: None,
    }
}

fn new_invoice(
    account: &InvoiceAccount,
    batch_id: Uuid,
    billing_period: &BillingPeriod,
) -> Invoice {
    Invoice {
        id: Uuid::new_v4(),
        batch_id,
        invoice_account_id: account.id,
        invoice_account_number: account.account_number.clone(),
        financial_year_ending: billing_period.financial_year_ending(),
        address: json!({}),
        is_credit: false,
        external_id: None,
        net_amount: None,
        is_de_minimis: false,
        invoice_value: None,
        credit_note_value: None,
        is_flagged_for_rebilling: false,
        rebilling_state: None,
        original_invoice_id: None,
    }
}
