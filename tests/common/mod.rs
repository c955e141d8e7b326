//! Test helpers for the supplementary billing engine integration tests.
//!
//! Provides builders for domain records and in-memory implementations of the
//! collaborator traits, so orchestration can be driven without a database or
//! a live Charging Module.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use supplementary_billing::config::ChargingModuleConfig;
use supplementary_billing::error::BillingError;
use supplementary_billing::models::{
    Batch, BatchStatus, BillingPeriod, ChargeElement, ChargePeriod, ChargeType, ChargeVersion,
    ChargeVersionStatus, Invoice, InvoiceLicence, Licence, Purpose, RebillingState, SourceInvoice,
    SourceInvoiceLicence, Transaction, TransactionStatus,
};
use supplementary_billing::services::charging_module::{
    ChargingModuleClient, CmBillRunStatus, CmCreateTransactionResponse, CmInvoiceDetail, CmLicence,
    CmRebilledType, CmReissueResponse, CmReissuedInvoice, CmTransaction, CmTransactionRequest,
};
use supplementary_billing::services::{BillingStore, ChargeCalculator};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn billing_period() -> BillingPeriod {
    BillingPeriod {
        start_date: date(2024, 4, 1),
        end_date: date(2025, 3, 31),
    }
}

pub fn batch() -> Batch {
    Batch {
        id: Uuid::new_v4(),
        region_id: Uuid::new_v4(),
        external_id: Uuid::new_v4(),
        scheme: "sroc".to_string(),
        status: BatchStatus::Processing,
    }
}

pub fn cm_config(poll_interval_ms: u64, poll_max_attempts: u32) -> ChargingModuleConfig {
    ChargingModuleConfig {
        base_url: "http://charging-module.local".to_string(),
        bearer_token: None,
        poll_interval_ms,
        poll_max_attempts,
    }
}

pub fn licence(licence_ref: &str) -> Licence {
    Licence {
        id: Uuid::new_v4(),
        licence_ref: licence_ref.to_string(),
        is_water_undertaker: false,
    }
}

pub fn charge_element(charge_category_code: &str) -> ChargeElement {
    ChargeElement {
        id: Uuid::new_v4(),
        description: "River abstraction".to_string(),
        charge_category_code: charge_category_code.to_string(),
        authorised_annual_quantity: dec!(120),
        section_126_factor: Decimal::ONE,
        section_127_agreement: false,
        section_130_agreement: false,
        aggregate_factor: Decimal::ONE,
        adjustment_factor: Decimal::ONE,
        is_winter_only: false,
        is_supported_source: false,
        supported_source_name: None,
        purpose: Purpose {
            code: "400".to_string(),
            description: "Spray irrigation".to_string(),
        },
    }
}

pub fn charge_version(
    invoice_account_id: Uuid,
    invoice_account_number: &str,
    licence: &Licence,
    elements: Vec<ChargeElement>,
) -> ChargeVersion {
    ChargeVersion {
        id: Uuid::new_v4(),
        invoice_account_id,
        invoice_account_number: invoice_account_number.to_string(),
        licence: licence.clone(),
        status: ChargeVersionStatus::Current,
        start_date: date(2022, 4, 1),
        end_date: None,
        scheme: "sroc".to_string(),
        is_new_licence: false,
        charge_elements: elements,
    }
}

/// A debit transaction with the given charge category and billable days; the
/// remaining matching-key fields are defaulted.
pub fn transaction(charge_category_code: &str, billable_days: i32) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        invoice_licence_id: Uuid::new_v4(),
        is_credit: false,
        status: TransactionStatus::Candidate,
        charge_type: ChargeType::Standard,
        description: "Water abstraction charge".to_string(),
        charge_category_code: charge_category_code.to_string(),
        charge_category_description: None,
        start_date: date(2024, 4, 1),
        end_date: date(2025, 3, 31),
        billable_days,
        authorised_days: 365,
        section_126_factor: Decimal::ONE,
        section_127_agreement: false,
        section_130_agreement: false,
        aggregate_factor: Decimal::ONE,
        adjustment_factor: Decimal::ONE,
        is_winter_only: false,
        is_supported_source: false,
        supported_source_name: None,
        is_water_company_charge: false,
        is_new_licence: false,
        external_id: None,
        net_amount: None,
        purposes: vec![Purpose {
            code: "400".to_string(),
            description: "Spray irrigation".to_string(),
        }],
    }
}

/// A previously issued invoice with the given licence refs and, per licence,
/// the given number of already-billed transactions (each with a Charging
/// Module external id).
pub fn source_invoice(batch_id: Uuid, licence_refs_and_counts: &[(&str, usize)]) -> SourceInvoice {
    let invoice = Invoice {
        id: Uuid::new_v4(),
        batch_id,
        invoice_account_id: Uuid::new_v4(),
        invoice_account_number: "A12345678A".to_string(),
        financial_year_ending: 2025,
        address: serde_json::json!({}),
        is_credit: false,
        external_id: Some(Uuid::new_v4()),
        net_amount: Some(20_00),
        is_de_minimis: false,
        invoice_value: Some(20_00),
        credit_note_value: Some(0),
        is_flagged_for_rebilling: true,
        rebilling_state: None,
        original_invoice_id: None,
    };

    let invoice_licences = licence_refs_and_counts
        .iter()
        .map(|(licence_ref, count)| {
            let invoice_licence = InvoiceLicence {
                id: Uuid::new_v4(),
                invoice_id: invoice.id,
                licence_id: Uuid::new_v4(),
                licence_ref: licence_ref.to_string(),
            };
            let transactions = (0..*count)
                .map(|_| {
                    let mut t = transaction("4.10.1", 365);
                    t.invoice_licence_id = invoice_licence.id;
                    t.status = TransactionStatus::ChargeCreated;
                    t.external_id = Some(Uuid::new_v4());
                    t.net_amount = Some(10_00);
                    t
                })
                .collect();
            SourceInvoiceLicence {
                invoice_licence,
                transactions,
            }
        })
        .collect();

    SourceInvoice {
        invoice,
        invoice_licences,
    }
}

/// Build the Charging Module's view of one reissued invoice, mirroring every
/// source transaction with the given credit flag and per-transaction charge
/// value.
pub fn cm_invoice_detail(
    source: &SourceInvoice,
    cm_invoice_id: Uuid,
    rebilled_type: CmRebilledType,
    credit: bool,
    charge_value: i64,
) -> CmInvoiceDetail {
    let licences: Vec<CmLicence> = source
        .invoice_licences
        .iter()
        .map(|source_licence| CmLicence {
            id: Uuid::new_v4(),
            licence_number: source_licence.invoice_licence.licence_ref.clone(),
            transactions: source_licence
                .transactions
                .iter()
                .map(|t| CmTransaction {
                    id: Uuid::new_v4(),
                    rebilled_transaction_id: t.external_id,
                    credit,
                    charge_value,
                })
                .collect(),
        })
        .collect();

    let transaction_count: i64 = source
        .invoice_licences
        .iter()
        .map(|l| l.transactions.len() as i64)
        .sum();
    let line_total = charge_value * transaction_count;

    CmInvoiceDetail {
        id: cm_invoice_id,
        net_total: if credit { -line_total } else { line_total },
        deminimis_invoice: false,
        debit_line_value: if credit { 0 } else { line_total },
        credit_line_value: if credit { line_total } else { 0 },
        rebilled_type,
        licences,
    }
}

// ============================================================================
// Mock collaborators
// ============================================================================

/// In-memory Charging Module double. Bill run statuses are served from a
/// queue, falling back to `default_status` once drained.
pub struct MockChargingModule {
    pub charge_value: i64,
    pub create_calls: Mutex<Vec<CmTransactionRequest>>,
    pub reissue_responses: Mutex<HashMap<Uuid, CmReissueResponse>>,
    pub invoice_details: Mutex<HashMap<Uuid, CmInvoiceDetail>>,
    pub statuses: Mutex<VecDeque<String>>,
    pub default_status: String,
    pub status_calls: AtomicU32,
    pub fail_reissue: bool,
    pub fail_status: bool,
}

impl Default for MockChargingModule {
    fn default() -> Self {
        Self {
            charge_value: 10_00,
            create_calls: Mutex::new(Vec::new()),
            reissue_responses: Mutex::new(HashMap::new()),
            invoice_details: Mutex::new(HashMap::new()),
            statuses: Mutex::new(VecDeque::new()),
            default_status: "initialised".to_string(),
            status_calls: AtomicU32::new(0),
            fail_reissue: false,
            fail_status: false,
        }
    }
}

impl MockChargingModule {
    pub fn with_charge_value(charge_value: i64) -> Self {
        Self {
            charge_value,
            ..Self::default()
        }
    }

    /// Register a reissue of `source` producing a cancelling and a reissuing
    /// invoice; returns the two Charging Module invoice ids `(c, r)`.
    pub fn register_reissue(&self, source: &SourceInvoice, charge_value: i64) -> (Uuid, Uuid) {
        let c_id = Uuid::new_v4();
        let r_id = Uuid::new_v4();

        self.reissue_responses.lock().unwrap().insert(
            source.invoice.external_id.unwrap(),
            CmReissueResponse {
                invoices: vec![
                    CmReissuedInvoice {
                        id: c_id,
                        rebilled_type: CmRebilledType::C,
                    },
                    CmReissuedInvoice {
                        id: r_id,
                        rebilled_type: CmRebilledType::R,
                    },
                ],
            },
        );

        let mut details = self.invoice_details.lock().unwrap();
        details.insert(
            c_id,
            cm_invoice_detail(source, c_id, CmRebilledType::C, true, charge_value),
        );
        details.insert(
            r_id,
            cm_invoice_detail(source, r_id, CmRebilledType::R, false, charge_value),
        );

        (c_id, r_id)
    }

    pub fn push_statuses(&self, statuses: &[&str]) {
        let mut queue = self.statuses.lock().unwrap();
        for status in statuses {
            queue.push_back(status.to_string());
        }
    }
}

#[async_trait]
impl ChargingModuleClient for MockChargingModule {
    async fn create_transaction(
        &self,
        _batch_external_id: Uuid,
        payload: &CmTransactionRequest,
    ) -> Result<CmCreateTransactionResponse, BillingError> {
        self.create_calls.lock().unwrap().push(payload.clone());
        Ok(CmCreateTransactionResponse {
            external_id: Uuid::new_v4(),
            charge_value: self.charge_value,
        })
    }

    async fn reissue_invoice(
        &self,
        _batch_external_id: Uuid,
        invoice_external_id: Uuid,
    ) -> Result<CmReissueResponse, BillingError> {
        if self.fail_reissue {
            return Err(BillingError::ChargingModuleRequest {
                status: 500,
                body: "rebill failed".to_string(),
            });
        }

        self.reissue_responses
            .lock()
            .unwrap()
            .get(&invoice_external_id)
            .cloned()
            .ok_or(BillingError::ChargingModuleRequest {
                status: 404,
                body: "unknown invoice".to_string(),
            })
    }

    async fn view_invoice(
        &self,
        _batch_external_id: Uuid,
        invoice_external_id: Uuid,
    ) -> Result<CmInvoiceDetail, BillingError> {
        self.invoice_details
            .lock()
            .unwrap()
            .get(&invoice_external_id)
            .cloned()
            .ok_or(BillingError::ChargingModuleRequest {
                status: 404,
                body: "unknown invoice".to_string(),
            })
    }

    async fn view_bill_run_status(
        &self,
        _batch_external_id: Uuid,
    ) -> Result<CmBillRunStatus, BillingError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_status {
            return Err(BillingError::ChargingModuleRequest {
                status: 500,
                body: "status unavailable".to_string(),
            });
        }

        let status = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_status.clone());
        Ok(CmBillRunStatus { status })
    }
}

/// In-memory `BillingStore` double recording everything the engine persists.
#[derive(Default)]
pub struct InMemoryStore {
    pub previous: Mutex<HashMap<(String, String, i32), Vec<Transaction>>>,
    pub flagged: Mutex<Vec<SourceInvoice>>,
    pub fail_flagged_fetch: bool,
    pub inserted_invoices: Mutex<Vec<Invoice>>,
    pub inserted_invoice_licences: Mutex<Vec<InvoiceLicence>>,
    pub inserted_transactions: Mutex<Vec<Transaction>>,
    pub rebilling_updates: Mutex<Vec<(Uuid, RebillingState, Uuid)>>,
    pub insert_log: Mutex<Vec<&'static str>>,
}

impl InMemoryStore {
    pub fn with_previous(
        invoice_account_number: &str,
        licence_ref: &str,
        financial_year_ending: i32,
        transactions: Vec<Transaction>,
    ) -> Self {
        let store = Self::default();
        store.previous.lock().unwrap().insert(
            (
                invoice_account_number.to_string(),
                licence_ref.to_string(),
                financial_year_ending,
            ),
            transactions,
        );
        store
    }

    pub fn with_flagged(flagged: Vec<SourceInvoice>) -> Self {
        let store = Self::default();
        *store.flagged.lock().unwrap() = flagged;
        store
    }
}

#[async_trait]
impl BillingStore for InMemoryStore {
    async fn fetch_previous_transactions(
        &self,
        invoice_account_number: &str,
        licence_ref: &str,
        financial_year_ending: i32,
    ) -> Result<Vec<Transaction>, BillingError> {
        Ok(self
            .previous
            .lock()
            .unwrap()
            .get(&(
                invoice_account_number.to_string(),
                licence_ref.to_string(),
                financial_year_ending,
            ))
            .cloned()
            .unwrap_or_default())
    }

    async fn find_invoices_flagged_for_rebilling(
        &self,
        _region_id: Uuid,
    ) -> Result<Vec<SourceInvoice>, BillingError> {
        if self.fail_flagged_fetch {
            return Err(BillingError::DatabaseError(anyhow::anyhow!(
                "connection reset"
            )));
        }
        Ok(self.flagged.lock().unwrap().clone())
    }

    async fn insert_invoices(&self, invoices: &[Invoice]) -> Result<(), BillingError> {
        self.insert_log.lock().unwrap().push("invoices");
        self.inserted_invoices
            .lock()
            .unwrap()
            .extend_from_slice(invoices);
        Ok(())
    }

    async fn insert_invoice_licences(
        &self,
        invoice_licences: &[InvoiceLicence],
    ) -> Result<(), BillingError> {
        self.insert_log.lock().unwrap().push("invoice_licences");
        self.inserted_invoice_licences
            .lock()
            .unwrap()
            .extend_from_slice(invoice_licences);
        Ok(())
    }

    async fn insert_transactions(&self, transactions: &[Transaction]) -> Result<(), BillingError> {
        self.insert_log.lock().unwrap().push("transactions");
        self.inserted_transactions
            .lock()
            .unwrap()
            .extend_from_slice(transactions);
        Ok(())
    }

    async fn update_invoice_rebilling(
        &self,
        invoice_id: Uuid,
        rebilling_state: RebillingState,
        original_invoice_id: Uuid,
    ) -> Result<(), BillingError> {
        self.rebilling_updates
            .lock()
            .unwrap()
            .push((invoice_id, rebilling_state, original_invoice_id));
        Ok(())
    }
}

/// Calculator double returning clones of preset transactions for every
/// charge element.
pub struct FixedCalculator {
    pub transactions: Vec<Transaction>,
}

impl ChargeCalculator for FixedCalculator {
    fn calculate(
        &self,
        _element: &ChargeElement,
        _billing_period: &BillingPeriod,
        _charge_period: &ChargePeriod,
        _is_new_licence: bool,
        _is_water_undertaker: bool,
    ) -> Result<Vec<Transaction>, BillingError> {
        Ok(self.transactions.clone())
    }
}

/// Calculator double that always fails.
pub struct FailingCalculator;

impl ChargeCalculator for FailingCalculator {
    fn calculate(
        &self,
        _element: &ChargeElement,
        _billing_period: &BillingPeriod,
        _charge_period: &ChargePeriod,
        _is_new_licence: bool,
        _is_water_undertaker: bool,
    ) -> Result<Vec<Transaction>, BillingError> {
        Err(BillingError::CalculationError(anyhow::anyhow!(
            "abstraction period could not be determined"
        )))
    }
}
