//! Database service - the sqlx/Postgres implementation of `BillingStore`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, QueryBuilder};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::{
    ChargeType, Invoice, InvoiceLicence, Purpose, RebillingState, SourceInvoice,
    SourceInvoiceLicence, Transaction, TransactionStatus,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::BillingStore;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct InvoiceRow {
    invoice_id: Uuid,
    batch_id: Uuid,
    invoice_account_id: Uuid,
    invoice_account_number: String,
    financial_year_ending: i32,
    address: serde_json::Value,
    is_credit: bool,
    external_id: Option<Uuid>,
    net_amount: Option<i64>,
    is_de_minimis: bool,
    invoice_value: Option<i64>,
    credit_note_value: Option<i64>,
    is_flagged_for_rebilling: bool,
    rebilling_state: Option<String>,
    original_invoice_id: Option<Uuid>,
}

impl From<InvoiceRow> for Invoice {
    fn from(row: InvoiceRow) -> Self {
        Invoice {
            id: row.invoice_id,
            batch_id: row.batch_id,
            invoice_account_id: row.invoice_account_id,
            invoice_account_number: row.invoice_account_number,
            financial_year_ending: row.financial_year_ending,
            address: row.address,
            is_credit: row.is_credit,
            external_id: row.external_id,
            net_amount: row.net_amount,
            is_de_minimis: row.is_de_minimis,
            invoice_value: row.invoice_value,
            credit_note_value: row.credit_note_value,
            is_flagged_for_rebilling: row.is_flagged_for_rebilling,
            rebilling_state: row
                .rebilling_state
                .as_deref()
                .and_then(RebillingState::from_string),
            original_invoice_id: row.original_invoice_id,
        }
    }
}

#[derive(Debug, FromRow)]
struct InvoiceLicenceRow {
    invoice_licence_id: Uuid,
    invoice_id: Uuid,
    licence_id: Uuid,
    licence_ref: String,
}

impl From<InvoiceLicenceRow> for InvoiceLicence {
    fn from(row: InvoiceLicenceRow) -> Self {
        InvoiceLicence {
            id: row.invoice_licence_id,
            invoice_id: row.invoice_id,
            licence_id: row.licence_id,
            licence_ref: row.licence_ref,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    transaction_id: Uuid,
    invoice_licence_id: Uuid,
    is_credit: bool,
    status: String,
    charge_type: String,
    description: String,
    charge_category_code: String,
    charge_category_description: Option<String>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    billable_days: i32,
    authorised_days: i32,
    section_126_factor: Decimal,
    section_127_agreement: bool,
    section_130_agreement: bool,
    aggregate_factor: Decimal,
    adjustment_factor: Decimal,
    is_winter_only: bool,
    is_supported_source: bool,
    supported_source_name: Option<String>,
    is_water_company_charge: bool,
    is_new_licence: bool,
    external_id: Option<Uuid>,
    net_amount: Option<i64>,
    purposes: serde_json::Value,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Transaction {
            id: row.transaction_id,
            invoice_licence_id: row.invoice_licence_id,
            is_credit: row.is_credit,
            status: TransactionStatus::from_string(&row.status),
            charge_type: ChargeType::from_string(&row.charge_type),
            description: row.description,
            charge_category_code: row.charge_category_code,
            charge_category_description: row.charge_category_description,
            start_date: row.start_date,
            end_date: row.end_date,
            billable_days: row.billable_days,
            authorised_days: row.authorised_days,
            section_126_factor: row.section_126_factor,
            section_127_agreement: row.section_127_agreement,
            section_130_agreement: row.section_130_agreement,
            aggregate_factor: row.aggregate_factor,
            adjustment_factor: row.adjustment_factor,
            is_winter_only: row.is_winter_only,
            is_supported_source: row.is_supported_source,
            supported_source_name: row.supported_source_name,
            is_water_company_charge: row.is_water_company_charge,
            is_new_licence: row.is_new_licence,
            external_id: row.external_id,
            net_amount: row.net_amount,
            purposes: normalise_purposes(row.purposes),
        }
    }
}

/// Stored purposes sometimes arrive wrapped in a single-element collection;
/// unwrap so in-memory transactions always carry the flat form.
fn normalise_purposes(value: serde_json::Value) -> Vec<Purpose> {
    let value = match value {
        serde_json::Value::Array(ref items)
            if items.len() == 1 && items[0].is_array() =>
        {
            items[0].clone()
        }
        other => other,
    };

    serde_json::from_value(value).unwrap_or_default()
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, BillingError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| BillingError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), BillingError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                BillingError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e))
            })?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), BillingError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| BillingError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl BillingStore for Database {
    #[instrument(skip(self), fields(invoice_account_number = %invoice_account_number, licence_ref = %licence_ref))]
    async fn fetch_previous_transactions(
        &self,
        invoice_account_number: &str,
        licence_ref: &str,
        financial_year_ending: i32,
    ) -> Result<Vec<Transaction>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["fetch_previous_transactions"])
            .start_timer();

        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT t.transaction_id, t.invoice_licence_id, t.is_credit, t.status,
                   t.charge_type, t.description, t.charge_category_code,
                   t.charge_category_description, t.start_date, t.end_date,
                   t.billable_days, t.authorised_days, t.section_126_factor,
                   t.section_127_agreement, t.section_130_agreement,
                   t.aggregate_factor, t.adjustment_factor, t.is_winter_only,
                   t.is_supported_source, t.supported_source_name,
                   t.is_water_company_charge, t.is_new_licence, t.external_id,
                   t.net_amount, t.purposes
            FROM billing_transactions t
            JOIN billing_invoice_licences il ON il.invoice_licence_id = t.invoice_licence_id
            JOIN billing_invoices i ON i.invoice_id = il.invoice_id
            WHERE i.invoice_account_number = $1
              AND il.licence_ref = $2
              AND i.financial_year_ending = $3
              AND t.status = 'charge_created'
              AND t.is_credit = FALSE
            ORDER BY t.transaction_id
            "#,
        )
        .bind(invoice_account_number)
        .bind(licence_ref)
        .bind(financial_year_ending)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            BillingError::DatabaseError(anyhow::anyhow!(
                "Failed to fetch previous transactions: {}",
                e
            ))
        })?;

        timer.observe_duration();
        Ok(rows.into_iter().map(Transaction::from).collect())
    }

    #[instrument(skip(self))]
    async fn find_invoices_flagged_for_rebilling(
        &self,
        region_id: Uuid,
    ) -> Result<Vec<SourceInvoice>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_invoices_flagged_for_rebilling"])
            .start_timer();

        let invoice_rows = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT i.invoice_id, i.batch_id, i.invoice_account_id,
                   i.invoice_account_number, i.financial_year_ending, i.address,
                   i.is_credit, i.external_id, i.net_amount, i.is_de_minimis,
                   i.invoice_value, i.credit_note_value, i.is_flagged_for_rebilling,
                   i.rebilling_state, i.original_invoice_id
            FROM billing_invoices i
            JOIN billing_batches b ON b.batch_id = i.batch_id
            WHERE b.region_id = $1
              AND i.is_flagged_for_rebilling = TRUE
            ORDER BY i.invoice_id
            "#,
        )
        .bind(region_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            BillingError::DatabaseError(anyhow::anyhow!("Failed to fetch flagged invoices: {}", e))
        })?;

        if invoice_rows.is_empty() {
            timer.observe_duration();
            return Ok(Vec::new());
        }

        let invoice_ids: Vec<Uuid> = invoice_rows.iter().map(|r| r.invoice_id).collect();

        let licence_rows = sqlx::query_as::<_, InvoiceLicenceRow>(
            r#"
            SELECT invoice_licence_id, invoice_id, licence_id, licence_ref
            FROM billing_invoice_licences
            WHERE invoice_id = ANY($1)
            ORDER BY invoice_licence_id
            "#,
        )
        .bind(&invoice_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            BillingError::DatabaseError(anyhow::anyhow!("Failed to fetch invoice licences: {}", e))
        })?;

        let invoice_licence_ids: Vec<Uuid> =
            licence_rows.iter().map(|r| r.invoice_licence_id).collect();

        let transaction_rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT transaction_id, invoice_licence_id, is_credit, status,
                   charge_type, description, charge_category_code,
                   charge_category_description, start_date, end_date,
                   billable_days, authorised_days, section_126_factor,
                   section_127_agreement, section_130_agreement,
                   aggregate_factor, adjustment_factor, is_winter_only,
                   is_supported_source, supported_source_name,
                   is_water_company_charge, is_new_licence, external_id,
                   net_amount, purposes
            FROM billing_transactions
            WHERE invoice_licence_id = ANY($1)
            ORDER BY transaction_id
            "#,
        )
        .bind(&invoice_licence_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            BillingError::DatabaseError(anyhow::anyhow!("Failed to fetch transactions: {}", e))
        })?;

        let mut transactions_by_licence: HashMap<Uuid, Vec<Transaction>> = HashMap::new();
        for row in transaction_rows {
            transactions_by_licence
                .entry(row.invoice_licence_id)
                .or_default()
                .push(Transaction::from(row));
        }

        let mut licences_by_invoice: HashMap<Uuid, Vec<SourceInvoiceLicence>> = HashMap::new();
        for row in licence_rows {
            let invoice_licence = InvoiceLicence::from(row);
            let transactions = transactions_by_licence
                .remove(&invoice_licence.id)
                .unwrap_or_default();
            licences_by_invoice
                .entry(invoice_licence.invoice_id)
                .or_default()
                .push(SourceInvoiceLicence {
                    invoice_licence,
                    transactions,
                });
        }

        let sources = invoice_rows
            .into_iter()
            .map(|row| {
                let invoice = Invoice::from(row);
                let invoice_licences =
                    licences_by_invoice.remove(&invoice.id).unwrap_or_default();
                SourceInvoice {
                    invoice,
                    invoice_licences,
                }
            })
            .collect();

        timer.observe_duration();
        Ok(sources)
    }

    #[instrument(skip(self, invoices), fields(count = invoices.len()))]
    async fn insert_invoices(&self, invoices: &[Invoice]) -> Result<(), BillingError> {
        if invoices.is_empty() {
            return Ok(());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoices"])
            .start_timer();

        let mut builder = QueryBuilder::new(
            "INSERT INTO billing_invoices (invoice_id, batch_id, invoice_account_id, \
             invoice_account_number, financial_year_ending, address, is_credit, external_id, \
             net_amount, is_de_minimis, invoice_value, credit_note_value, \
             is_flagged_for_rebilling, rebilling_state, original_invoice_id) ",
        );
        builder.push_values(invoices, |mut b, invoice| {
            b.push_bind(invoice.id)
                .push_bind(invoice.batch_id)
                .push_bind(invoice.invoice_account_id)
                .push_bind(&invoice.invoice_account_number)
                .push_bind(invoice.financial_year_ending)
                .push_bind(&invoice.address)
                .push_bind(invoice.is_credit)
                .push_bind(invoice.external_id)
                .push_bind(invoice.net_amount)
                .push_bind(invoice.is_de_minimis)
                .push_bind(invoice.invoice_value)
                .push_bind(invoice.credit_note_value)
                .push_bind(invoice.is_flagged_for_rebilling)
                .push_bind(invoice.rebilling_state.map(|s| s.as_str()))
                .push_bind(invoice.original_invoice_id);
        });

        builder.build().execute(&self.pool).await.map_err(|e| {
            BillingError::DatabaseError(anyhow::anyhow!("Failed to insert invoices: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, invoice_licences), fields(count = invoice_licences.len()))]
    async fn insert_invoice_licences(
        &self,
        invoice_licences: &[InvoiceLicence],
    ) -> Result<(), BillingError> {
        if invoice_licences.is_empty() {
            return Ok(());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice_licences"])
            .start_timer();

        let mut builder = QueryBuilder::new(
            "INSERT INTO billing_invoice_licences (invoice_licence_id, invoice_id, licence_id, \
             licence_ref) ",
        );
        builder.push_values(invoice_licences, |mut b, invoice_licence| {
            b.push_bind(invoice_licence.id)
                .push_bind(invoice_licence.invoice_id)
                .push_bind(invoice_licence.licence_id)
                .push_bind(&invoice_licence.licence_ref);
        });

        builder.build().execute(&self.pool).await.map_err(|e| {
            BillingError::DatabaseError(anyhow::anyhow!("Failed to insert invoice licences: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, transactions), fields(count = transactions.len()))]
    async fn insert_transactions(&self, transactions: &[Transaction]) -> Result<(), BillingError> {
        if transactions.is_empty() {
            return Ok(());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_transactions"])
            .start_timer();

        let mut builder = QueryBuilder::new(
            "INSERT INTO billing_transactions (transaction_id, invoice_licence_id, is_credit, \
             status, charge_type, description, charge_category_code, \
             charge_category_description, start_date, end_date, billable_days, authorised_days, \
             section_126_factor, section_127_agreement, section_130_agreement, aggregate_factor, \
             adjustment_factor, is_winter_only, is_supported_source, supported_source_name, \
             is_water_company_charge, is_new_licence, external_id, net_amount, purposes) ",
        );
        builder.push_values(transactions, |mut b, transaction| {
            b.push_bind(transaction.id)
                .push_bind(transaction.invoice_licence_id)
                .push_bind(transaction.is_credit)
                .push_bind(transaction.status.as_str())
                .push_bind(transaction.charge_type.as_str())
                .push_bind(&transaction.description)
                .push_bind(&transaction.charge_category_code)
                .push_bind(&transaction.charge_category_description)
                .push_bind(transaction.start_date)
                .push_bind(transaction.end_date)
                .push_bind(transaction.billable_days)
                .push_bind(transaction.authorised_days)
                .push_bind(transaction.section_126_factor)
                .push_bind(transaction.section_127_agreement)
                .push_bind(transaction.section_130_agreement)
                .push_bind(transaction.aggregate_factor)
                .push_bind(transaction.adjustment_factor)
                .push_bind(transaction.is_winter_only)
                .push_bind(transaction.is_supported_source)
                .push_bind(&transaction.supported_source_name)
                .push_bind(transaction.is_water_company_charge)
                .push_bind(transaction.is_new_licence)
                .push_bind(transaction.external_id)
                .push_bind(transaction.net_amount)
                .push_bind(serde_json::json!(transaction.purposes));
        });

        builder.build().execute(&self.pool).await.map_err(|e| {
            BillingError::DatabaseError(anyhow::anyhow!("Failed to insert transactions: {}", e))
        })?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update_invoice_rebilling(
        &self,
        invoice_id: Uuid,
        rebilling_state: RebillingState,
        original_invoice_id: Uuid,
    ) -> Result<(), BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice_rebilling"])
            .start_timer();

        // original_invoice_id is set once and never overwritten.
        sqlx::query(
            r#"
            UPDATE billing_invoices
            SET rebilling_state = $2,
                original_invoice_id = COALESCE(original_invoice_id, $3),
                is_flagged_for_rebilling = FALSE
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .bind(rebilling_state.as_str())
        .bind(original_invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            BillingError::DatabaseError(anyhow::anyhow!(
                "Failed to update invoice rebilling fields: {}",
                e
            ))
        })?;

        timer.observe_duration();
        Ok(())
    }
}
