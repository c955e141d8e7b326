//! Transaction reversal - building credit mirrors of previously billed
//! transactions.

use uuid::Uuid;

use crate::models::{InvoiceLicence, Transaction, TransactionStatus};

/// Produce a reversing transaction for each input: fresh identity, credit
/// sign, candidate status, all charge-determining fields copied unchanged.
/// Previous transactions are always debits by construction of the fetch
/// query, so the reversal is unconditionally a credit.
///
/// Pure; neither the input slice nor its elements are touched.
pub fn reverse(
    transactions: &[Transaction],
    target_invoice_licence: &InvoiceLicence,
) -> Vec<Transaction> {
    transactions
        .iter()
        .map(|transaction| Transaction {
            id: Uuid::new_v4(),
            invoice_licence_id: target_invoice_licence.id,
            is_credit: true,
            status: TransactionStatus::Candidate,
            external_id: None,
            net_amount: None,
            ..transaction.clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::services::fixtures::{invoice_licence, transaction};

    #[test]
    fn reversed_transactions_are_candidate_credits_with_fresh_identities() {
        let mut previous = transaction("4.10.1", 365);
        previous.status = TransactionStatus::ChargeCreated;
        previous.external_id = Some(Uuid::new_v4());
        previous.net_amount = Some(12_345);

        let target = invoice_licence();
        let reversed = reverse(&[previous.clone()], &target);

        assert_eq!(reversed.len(), 1);
        let r = &reversed[0];
        assert_ne!(r.id, previous.id);
        assert_eq!(r.invoice_licence_id, target.id);
        assert!(r.is_credit);
        assert_eq!(r.status, TransactionStatus::Candidate);
        assert_eq!(r.external_id, None);
        assert_eq!(r.net_amount, None);
        assert_eq!(r.matching_key(), previous.matching_key());
        assert_eq!(r.purposes, previous.purposes);
    }

    #[test]
    fn reversal_does_not_mutate_its_input() {
        let previous = vec![transaction("4.10.1", 365), transaction("6.12.3", 100)];
        let snapshot = previous.clone();

        let _ = reverse(&previous, &invoice_licence());

        assert_eq!(previous, snapshot);
    }
}
