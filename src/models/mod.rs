//! Domain models for the supplementary billing engine.

mod batch;
mod charge_version;
mod invoice;
mod invoice_licence;
mod transaction;

pub use batch::{Batch, BatchStatus, BillingPeriod, ChargePeriod};
pub use charge_version::{
    ChargeElement, ChargeVersion, ChargeVersionStatus, InvoiceAccount, Licence, Purpose,
};
pub use invoice::{Invoice, RebillingState, SourceInvoice, SourceInvoiceLicence, StagedRecords};
pub use invoice_licence::InvoiceLicence;
pub use transaction::{ChargeType, MatchingKey, Transaction, TransactionStatus};
