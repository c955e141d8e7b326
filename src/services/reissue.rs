//! Invoice reissue - cancelling and rebilling a previously issued invoice
//! through the Charging Module.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::ChargingModuleConfig;
use crate::error::BillingError;
use crate::models::{
    Batch, InvoiceLicence, RebillingState, SourceInvoice, StagedRecords, Transaction,
    TransactionStatus,
};
use crate::services::charging_module::{
    ChargingModuleClient, CmInvoiceDetail, CmLicence, CM_BILL_RUN_STATUS_PENDING,
};
use crate::services::metrics::record_invoice_reissued;
use crate::services::pre_generation;
use crate::services::store::BillingStore;

/// Reissues one previously issued invoice at a time: Charging Module
/// round trip, bounded status polling, record reconstruction, and
/// rebilling-chain bookkeeping on the source invoice.
pub struct ReissueService {
    store: Arc<dyn BillingStore>,
    charging_module: Arc<dyn ChargingModuleClient>,
    poll_interval: Duration,
    poll_max_attempts: u32,
}

impl ReissueService {
    pub fn new(
        store: Arc<dyn BillingStore>,
        charging_module: Arc<dyn ChargingModuleClient>,
        config: &ChargingModuleConfig,
    ) -> Self {
        Self {
            store,
            charging_module,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_max_attempts: config.poll_max_attempts,
        }
    }

    /// Reissue one source invoice into the target batch. Returns the records
    /// to persist (two invoices, a mirrored pair of invoice licences and
    /// transactions for each) and patches the source invoice's rebilling
    /// fields as a side effect.
    #[instrument(skip(self, source), fields(invoice_id = %source.invoice.id, batch_id = %batch.id))]
    pub async fn reissue_invoice(
        &self,
        source: &SourceInvoice,
        batch: &Batch,
    ) -> Result<StagedRecords, BillingError> {
        let source_external_id =
            source
                .invoice
                .external_id
                .ok_or(BillingError::MissingExternalId {
                    invoice_id: source.invoice.id,
                })?;

        let reissue_response = self
            .charging_module
            .reissue_invoice(batch.external_id, source_external_id)
            .await
            .map_err(|e| BillingError::ReissueInvoiceFailed {
                batch_external_id: batch.external_id,
                invoice_external_id: source_external_id,
                source: Box::new(e),
            })?;

        self.wait_for_bill_run(batch.external_id).await?;

        let mut staged = StagedRecords::default();

        // The cancelling and reissuing invoices are processed in the order
        // the Charging Module returned them; cancel-first is not guaranteed.
        for reissued in &reissue_response.invoices {
            let detail = self
                .charging_module
                .view_invoice(batch.external_id, reissued.id)
                .await
                .map_err(|e| BillingError::ViewInvoiceFailed {
                    batch_external_id: batch.external_id,
                    invoice_external_id: reissued.id,
                    source: Box::new(e),
                })?;

            self.stage_reissued_invoice(source, batch, &detail, &mut staged)?;
        }

        // The chain always points at the earliest ancestor.
        self.store
            .update_invoice_rebilling(
                source.invoice.id,
                RebillingState::Rebilled,
                source.invoice.original_invoice_id.unwrap_or(source.invoice.id),
            )
            .await?;

        info!(
            invoices = staged.invoices.len(),
            invoice_licences = staged.invoice_licences.len(),
            transactions = staged.transactions.len(),
            "Reissued invoice"
        );

        Ok(staged)
    }

    /// Rebuild local records for one Charging Module invoice, merging its
    /// values into a freshly pre-generated base invoice and mirroring the
    /// source invoice's licences and transactions.
    fn stage_reissued_invoice(
        &self,
        source: &SourceInvoice,
        batch: &Batch,
        detail: &CmInvoiceDetail,
        staged: &mut StagedRecords,
    ) -> Result<(), BillingError> {
        let mut invoice = pre_generation::pre_generate_rebill_invoice(&source.invoice, batch.id);
        invoice.external_id = Some(detail.id);
        invoice.net_amount = Some(detail.net_total);
        invoice.is_credit = detail.net_total < 0;
        invoice.is_de_minimis = detail.deminimis_invoice;
        invoice.invoice_value = Some(detail.debit_line_value);
        invoice.credit_note_value = Some(-detail.credit_line_value);
        invoice.rebilling_state = detail.rebilled_type.rebilling_state();
        invoice.original_invoice_id = Some(source.invoice.id);

        for source_licence in &source.invoice_licences {
            let invoice_licence = InvoiceLicence {
                id: Uuid::new_v4(),
                invoice_id: invoice.id,
                licence_id: source_licence.invoice_licence.licence_id,
                licence_ref: source_licence.invoice_licence.licence_ref.clone(),
            };

            let cm_licence = find_cm_licence(detail, &invoice_licence.licence_ref)?;

            for source_transaction in &source_licence.transactions {
                staged.transactions.push(rebuild_transaction(
                    source_transaction,
                    cm_licence,
                    invoice_licence.id,
                )?);
            }

            staged.invoice_licences.push(invoice_licence);
        }

        record_invoice_reissued(
            invoice
                .rebilling_state
                .map(|s| s.as_str())
                .unwrap_or("none"),
        );
        staged.invoices.push(invoice);
        Ok(())
    }

    /// Poll the bill run status until it is no longer pending. A failed
    /// status request is immediately fatal; running out of attempts is the
    /// distinguishable timeout error.
    async fn wait_for_bill_run(&self, batch_external_id: Uuid) -> Result<(), BillingError> {
        for attempt in 1..=self.poll_max_attempts {
            let bill_run_status = self
                .charging_module
                .view_bill_run_status(batch_external_id)
                .await
                .map_err(|e| BillingError::BillRunStatusFailed {
                    batch_external_id,
                    source: Box::new(e),
                })?;

            if bill_run_status.status != CM_BILL_RUN_STATUS_PENDING {
                debug!(
                    status = %bill_run_status.status,
                    attempts = attempt,
                    "Bill run ready"
                );
                return Ok(());
            }

            if attempt < self.poll_max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        Err(BillingError::BillRunPollTimeout {
            batch_external_id,
            attempts: self.poll_max_attempts,
        })
    }
}

fn find_cm_licence<'a>(
    detail: &'a CmInvoiceDetail,
    licence_ref: &str,
) -> Result<&'a CmLicence, BillingError> {
    detail
        .licences
        .iter()
        .find(|licence| licence.licence_number == licence_ref)
        .ok_or_else(|| BillingError::CmLicenceNotFound {
            invoice_external_id: detail.id,
            licence_ref: licence_ref.to_string(),
        })
}

/// Copy a source transaction onto the new invoice licence, taking identity,
/// sign and value from the Charging Module transaction that rebills it.
fn rebuild_transaction(
    source: &Transaction,
    cm_licence: &CmLicence,
    invoice_licence_id: Uuid,
) -> Result<Transaction, BillingError> {
    let cm_transaction = cm_licence
        .transactions
        .iter()
        .find(|t| source.external_id.is_some() && t.rebilled_transaction_id == source.external_id)
        .ok_or(BillingError::CmTransactionNotFound {
            transaction_id: source.id,
        })?;

    Ok(Transaction {
        id: Uuid::new_v4(),
        invoice_licence_id,
        external_id: Some(cm_transaction.id),
        is_credit: cm_transaction.credit,
        net_amount: Some(if cm_transaction.credit {
            -cm_transaction.charge_value
        } else {
            cm_transaction.charge_value
        }),
        status: TransactionStatus::ChargeCreated,
        ..source.clone()
    })
}
