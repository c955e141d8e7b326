//! Rebilling coordination - reissuing every invoice flagged for rebilling in
//! a region.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::BillingError;
use crate::models::{Batch, StagedRecords};
use crate::services::metrics::record_error;
use crate::services::reissue::ReissueService;
use crate::services::store::BillingStore;

pub struct RebillingCoordinator {
    store: Arc<dyn BillingStore>,
    reissue: ReissueService,
}

impl RebillingCoordinator {
    pub fn new(store: Arc<dyn BillingStore>, reissue: ReissueService) -> Self {
        Self { store, reissue }
    }

    /// Reissue every invoice flagged for rebilling in the batch's region.
    /// Returns whether anything was reissued. A failure to enumerate the
    /// flagged invoices is logged and treated as nothing to do: no writes
    /// have happened at that point.
    #[instrument(skip(self), fields(batch_id = %batch.id, region_id = %batch.region_id))]
    pub async fn reissue_all(&self, batch: &Batch) -> Result<bool, BillingError> {
        let sources = match self
            .store
            .find_invoices_flagged_for_rebilling(batch.region_id)
            .await
        {
            Ok(sources) => sources,
            Err(e) => {
                warn!(error = %e, "Failed to fetch invoices flagged for rebilling");
                record_error("rebilling_fetch");
                return Ok(false);
            }
        };

        if sources.is_empty() {
            return Ok(false);
        }

        let mut staged = StagedRecords::default();
        for source in &sources {
            let records = self.reissue.reissue_invoice(source, batch).await?;
            staged.extend(records);
        }

        // Parents before children, matching the period processor.
        self.store.insert_invoices(&staged.invoices).await?;
        self.store
            .insert_invoice_licences(&staged.invoice_licences)
            .await?;
        self.store.insert_transactions(&staged.transactions).await?;

        info!(
            source_invoices = sources.len(),
            invoices = staged.invoices.len(),
            transactions = staged.transactions.len(),
            "Persisted rebilling records"
        );

        Ok(true)
    }
}
