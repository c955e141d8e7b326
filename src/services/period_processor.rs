//! Billing period processing - the supplementary billing run for one
//! financial year.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::{BatchErrorCode, BillingError};
use crate::models::{
    Batch, BillingPeriod, ChargeVersion, ChargeVersionStatus, Invoice, InvoiceAccount,
    InvoiceLicence, StagedRecords, Transaction, TransactionStatus,
};
use crate::services::charge_calculation::{self, ChargeCalculator};
use crate::services::charging_module::{ChargingModuleClient, CmTransactionRequest};
use crate::services::matching;
use crate::services::metrics::record_transactions_staged;
use crate::services::pre_generation;
use crate::services::store::BillingStore;

/// Calculated transactions accumulated for one invoice licence.
struct LicenceGroup {
    invoice: Invoice,
    invoice_licence: InvoiceLicence,
    invoice_account_number: String,
    transactions: Vec<Transaction>,
}

/// Orchestrates pre-generation, charge calculation, matching and persistence
/// across the charge versions of one billing period.
pub struct SupplementaryProcessor {
    store: Arc<dyn BillingStore>,
    charging_module: Arc<dyn ChargingModuleClient>,
    calculator: Arc<dyn ChargeCalculator>,
}

impl SupplementaryProcessor {
    pub fn new(
        store: Arc<dyn BillingStore>,
        charging_module: Arc<dyn ChargingModuleClient>,
        calculator: Arc<dyn ChargeCalculator>,
    ) -> Self {
        Self {
            store,
            charging_module,
            calculator,
        }
    }

    /// Process one billing period's charge versions. Returns whether anything
    /// was billable; nothing is written when the answer is `false`.
    #[instrument(skip(self, charge_versions), fields(batch_id = %batch.id))]
    pub async fn process(
        &self,
        batch: &Batch,
        billing_period: &BillingPeriod,
        charge_versions: &[ChargeVersion],
    ) -> Result<bool, BillingError> {
        if charge_versions.is_empty() {
            return Ok(false);
        }

        let invoice_accounts = dedup_invoice_accounts(charge_versions);
        let pre_generated = pre_generation::pre_generate(
            charge_versions,
            &invoice_accounts,
            batch.id,
            billing_period,
        );

        // Group calculated transactions by invoice licence, in the order the
        // charge versions arrive (account then licence, per the upstream
        // fetch).
        let mut group_order: Vec<Uuid> = Vec::new();
        let mut groups: HashMap<Uuid, LicenceGroup> = HashMap::new();

        for charge_version in charge_versions {
            let invoice = match pre_generated.invoices.get(&charge_version.invoice_account_id) {
                Some(invoice) => invoice,
                None => continue,
            };
            let invoice_licence =
                match pre_generated.invoice_licences.get(&(invoice.id, charge_version.licence.id))
                {
                    Some(invoice_licence) => invoice_licence,
                    None => continue,
                };

            let group = groups.entry(invoice_licence.id).or_insert_with(|| {
                group_order.push(invoice_licence.id);
                LicenceGroup {
                    invoice: invoice.clone(),
                    invoice_licence: invoice_licence.clone(),
                    invoice_account_number: charge_version.invoice_account_number.clone(),
                    transactions: Vec::new(),
                }
            });

            if charge_version.status != ChargeVersionStatus::Current {
                continue;
            }

            let charge_period = charge_calculation::charge_period(charge_version, billing_period)
                .map_err(|e| batch_error(batch.id, e))?;

            for element in &charge_version.charge_elements {
                let mut calculated = self
                    .calculator
                    .calculate(
                        element,
                        billing_period,
                        &charge_period,
                        charge_version.is_new_licence,
                        charge_version.licence.is_water_undertaker,
                    )
                    .map_err(|e| batch_error(batch.id, e))?;

                for transaction in &mut calculated {
                    transaction.invoice_licence_id = group.invoice_licence.id;
                }
                group.transactions.extend(calculated);
            }
        }

        let mut staged = StagedRecords::default();
        let mut staged_invoice_ids: HashSet<Uuid> = HashSet::new();

        for invoice_licence_id in group_order {
            let group = match groups.remove(&invoice_licence_id) {
                Some(group) => group,
                None => continue,
            };

            let previous = self
                .store
                .fetch_previous_transactions(
                    &group.invoice_account_number,
                    &group.invoice_licence.licence_ref,
                    billing_period.financial_year_ending(),
                )
                .await?;

            let reconciled =
                matching::reconcile(group.transactions, &previous, &group.invoice_licence);
            if reconciled.is_empty() {
                continue;
            }

            for mut transaction in reconciled {
                let payload = CmTransactionRequest::from_transaction(
                    &transaction,
                    &group.invoice_licence.licence_ref,
                );
                let response = self
                    .charging_module
                    .create_transaction(batch.external_id, &payload)
                    .await?;

                transaction.external_id = Some(response.external_id);
                transaction.net_amount = Some(if transaction.is_credit {
                    -response.charge_value
                } else {
                    response.charge_value
                });
                transaction.status = TransactionStatus::ChargeCreated;

                record_transactions_staged(
                    if transaction.is_credit { "reversed" } else { "calculated" },
                    1,
                );
                staged.transactions.push(transaction);
            }

            staged.invoice_licences.push(group.invoice_licence);
            if staged_invoice_ids.insert(group.invoice.id) {
                staged.invoices.push(group.invoice);
            }
        }

        if staged.is_empty() {
            info!(batch_id = %batch.id, "Nothing billable for this period");
            return Ok(false);
        }

        // Parents before children so every intermediate state is
        // foreign-key consistent.
        self.store.insert_invoices(&staged.invoices).await?;
        self.store
            .insert_invoice_licences(&staged.invoice_licences)
            .await?;
        self.store.insert_transactions(&staged.transactions).await?;

        info!(
            batch_id = %batch.id,
            invoices = staged.invoices.len(),
            invoice_licences = staged.invoice_licences.len(),
            transactions = staged.transactions.len(),
            "Persisted supplementary billing records"
        );

        Ok(true)
    }
}

fn batch_error(batch_id: Uuid, source: BillingError) -> BillingError {
    BillingError::ChargeVersionProcessing {
        batch_id,
        code: BatchErrorCode::FailedToProcessChargeVersions,
        source: Box::new(source),
    }
}

/// First-seen-order deduplication of the invoice accounts referenced by a
/// set of charge versions.
fn dedup_invoice_accounts(charge_versions: &[ChargeVersion]) -> Vec<InvoiceAccount> {
    let mut seen: HashSet<Uuid> = HashSet::new();
    let mut accounts = Vec::new();

    for charge_version in charge_versions {
        if seen.insert(charge_version.invoice_account_id) {
            accounts.push(InvoiceAccount {
                id: charge_version.invoice_account_id,
                account_number: charge_version.invoice_account_number.clone(),
            });
        }
    }

    accounts
}
