//! Transaction matching - cancelling newly calculated transactions against
//! previously billed ones so nothing is charged twice.

use tracing::debug;

use crate::models::{InvoiceLicence, Transaction};
use crate::services::reversal;

/// Reconcile calculated transactions against previously billed ones for the
/// same invoice licence and financial year.
///
/// With no previous transactions the calculated list passes through
/// unchanged. Otherwise the previous transactions are reversed onto the
/// target invoice licence and cancelling pairs are removed: a calculated
/// transaction is paired with the first unconsumed reversal whose matching
/// key is identical (first-found, stable; one reversal cancels at most one
/// calculated transaction). Reversals left unconsumed are appended to the
/// output.
pub fn reconcile(
    calculated: Vec<Transaction>,
    previous: &[Transaction],
    target_invoice_licence: &InvoiceLicence,
) -> Vec<Transaction> {
    if previous.is_empty() {
        return calculated;
    }

    let reversed = reversal::reverse(previous, target_invoice_licence);
    let mut consumed = vec![false; reversed.len()];
    let mut output = Vec::with_capacity(calculated.len() + reversed.len());

    for transaction in calculated {
        let key = transaction.matching_key();
        let matched = reversed
            .iter()
            .enumerate()
            .position(|(index, reversal)| !consumed[index] && reversal.matching_key() == key);

        match matched {
            Some(index) => {
                consumed[index] = true;
                debug!(
                    charge_category_code = %transaction.charge_category_code,
                    billable_days = transaction.billable_days,
                    "Calculated transaction cancelled by previous billing"
                );
            }
            None => output.push(transaction),
        }
    }

    for (index, reversal) in reversed.into_iter().enumerate() {
        if !consumed[index] {
            output.push(reversal);
        }
    }

    output
}
