//! Invoice licence model - the link between one invoice and one licence.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLicence {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub licence_id: Uuid,
    pub licence_ref: String,
}
