//! Charging Module client - the external system of record for charge values
//! and invoice numbering.

use std::time::Instant;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ChargingModuleConfig;
use crate::error::BillingError;
use crate::models::{ChargeType, RebillingState, Transaction};
use crate::services::metrics::record_cm_request_duration;

/// Payload for creating a transaction on a Charging Module bill run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CmTransactionRequest {
    pub client_id: Uuid,
    pub licence_number: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub credit: bool,
    pub billable_days: i32,
    pub authorised_days: i32,
    pub charge_category_code: String,
    pub charge_category_description: Option<String>,
    pub section126_factor: Decimal,
    pub section127_agreement: bool,
    pub section130_agreement: bool,
    pub aggregate_proportion: Decimal,
    pub adjustment_factor: Decimal,
    pub winter_only: bool,
    pub supported_source: bool,
    pub supported_source_name: Option<String>,
    pub water_company_charge: bool,
    pub compensation_charge: bool,
    pub new_licence: bool,
}

impl CmTransactionRequest {
    pub fn from_transaction(transaction: &Transaction, licence_ref: &str) -> Self {
        Self {
            client_id: transaction.id,
            licence_number: licence_ref.to_string(),
            period_start: transaction.start_date,
            period_end: transaction.end_date,
            credit: transaction.is_credit,
            billable_days: transaction.billable_days,
            authorised_days: transaction.authorised_days,
            charge_category_code: transaction.charge_category_code.clone(),
            charge_category_description: transaction.charge_category_description.clone(),
            section126_factor: transaction.section_126_factor,
            section127_agreement: transaction.section_127_agreement,
            section130_agreement: transaction.section_130_agreement,
            aggregate_proportion: transaction.aggregate_factor,
            adjustment_factor: transaction.adjustment_factor,
            winter_only: transaction.is_winter_only,
            supported_source: transaction.is_supported_source,
            supported_source_name: transaction.supported_source_name.clone(),
            water_company_charge: transaction.is_water_company_charge,
            compensation_charge: transaction.charge_type == ChargeType::Compensation,
            new_licence: transaction.is_new_licence,
        }
    }
}

/// Response to a transaction create request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmCreateTransactionResponse {
    pub external_id: Uuid,
    /// Unsigned pence; the caller applies the credit/debit sign.
    pub charge_value: i64,
}

/// Rebill tag the Charging Module puts on invoices and reissue results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmRebilledType {
    C,
    R,
    O,
}

impl CmRebilledType {
    pub fn rebilling_state(&self) -> Option<RebillingState> {
        match self {
            CmRebilledType::C => Some(RebillingState::Reversal),
            CmRebilledType::R => Some(RebillingState::Rebill),
            CmRebilledType::O => None,
        }
    }
}

/// One invoice id returned by a reissue request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmReissuedInvoice {
    pub id: Uuid,
    pub rebilled_type: CmRebilledType,
}

/// Response to a reissue request: exactly two invoices, one cancelling (`C`)
/// and one reissuing (`R`), in no guaranteed order.
#[derive(Debug, Clone, Deserialize)]
pub struct CmReissueResponse {
    pub invoices: Vec<CmReissuedInvoice>,
}

/// Bill run status snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct CmBillRunStatus {
    pub status: String,
}

pub const CM_BILL_RUN_STATUS_PENDING: &str = "pending";

/// A transaction on a Charging Module invoice detail.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmTransaction {
    pub id: Uuid,
    /// The engine-side external id of the transaction this one rebills.
    pub rebilled_transaction_id: Option<Uuid>,
    pub credit: bool,
    /// Unsigned pence.
    pub charge_value: i64,
}

/// A licence grouping on a Charging Module invoice detail.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmLicence {
    pub id: Uuid,
    pub licence_number: String,
    pub transactions: Vec<CmTransaction>,
}

/// Full invoice detail as held by the Charging Module.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmInvoiceDetail {
    pub id: Uuid,
    /// Signed pence.
    pub net_total: i64,
    pub deminimis_invoice: bool,
    pub debit_line_value: i64,
    pub credit_line_value: i64,
    pub rebilled_type: CmRebilledType,
    pub licences: Vec<CmLicence>,
}

/// Client interface for the Charging Module API. Non-2xx responses surface
/// as `BillingError::ChargingModuleRequest` and are never retried here.
#[async_trait]
pub trait ChargingModuleClient: Send + Sync {
    async fn create_transaction(
        &self,
        batch_external_id: Uuid,
        payload: &CmTransactionRequest,
    ) -> Result<CmCreateTransactionResponse, BillingError>;

    async fn reissue_invoice(
        &self,
        batch_external_id: Uuid,
        invoice_external_id: Uuid,
    ) -> Result<CmReissueResponse, BillingError>;

    async fn view_invoice(
        &self,
        batch_external_id: Uuid,
        invoice_external_id: Uuid,
    ) -> Result<CmInvoiceDetail, BillingError>;

    async fn view_bill_run_status(
        &self,
        batch_external_id: Uuid,
    ) -> Result<CmBillRunStatus, BillingError>;
}

/// reqwest-backed Charging Module client.
#[derive(Clone)]
pub struct HttpChargingModuleClient {
    base_url: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl HttpChargingModuleClient {
    pub fn new(config: &ChargingModuleConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.bearer_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, BillingError> {
        let start = Instant::now();
        let response = builder.send().await?;
        record_cm_request_duration(operation, start.elapsed().as_secs_f64());

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BillingError::ChargingModuleRequest {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ChargingModuleClient for HttpChargingModuleClient {
    async fn create_transaction(
        &self,
        batch_external_id: Uuid,
        payload: &CmTransactionRequest,
    ) -> Result<CmCreateTransactionResponse, BillingError> {
        #[derive(Deserialize)]
        struct Envelope {
            transaction: CmCreateTransactionResponse,
        }

        let envelope: Envelope = self
            .send(
                "create_transaction",
                self.request(
                    reqwest::Method::POST,
                    &format!("/v3/wrls/bill-runs/{}/transactions", batch_external_id),
                )
                .json(payload),
            )
            .await?;
        Ok(envelope.transaction)
    }

    async fn reissue_invoice(
        &self,
        batch_external_id: Uuid,
        invoice_external_id: Uuid,
    ) -> Result<CmReissueResponse, BillingError> {
        self.send(
            "reissue_invoice",
            self.request(
                reqwest::Method::PATCH,
                &format!(
                    "/v3/wrls/bill-runs/{}/invoices/{}/rebill",
                    batch_external_id, invoice_external_id
                ),
            ),
        )
        .await
    }

    async fn view_invoice(
        &self,
        batch_external_id: Uuid,
        invoice_external_id: Uuid,
    ) -> Result<CmInvoiceDetail, BillingError> {
        #[derive(Deserialize)]
        struct Envelope {
            invoice: CmInvoiceDetail,
        }

        let envelope: Envelope = self
            .send(
                "view_invoice",
                self.request(
                    reqwest::Method::GET,
                    &format!(
                        "/v3/wrls/bill-runs/{}/invoices/{}",
                        batch_external_id, invoice_external_id
                    ),
                ),
            )
            .await?;
        Ok(envelope.invoice)
    }

    async fn view_bill_run_status(
        &self,
        batch_external_id: Uuid,
    ) -> Result<CmBillRunStatus, BillingError> {
        self.send(
            "view_bill_run_status",
            self.request(
                reqwest::Method::GET,
                &format!("/v3/wrls/bill-runs/{}/status", batch_external_id),
            ),
        )
        .await
    }
}
