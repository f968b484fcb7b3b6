use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::models::new_id;
use crate::models::transaction::{Transaction, TX_STATUS_COMPLETED};
use crate::store::Store;

/// Build a completed ledger row ready for one of the store's atomic credit
/// or settle operations.
pub fn completed_transaction(
    user_id: &str,
    tx_type: &str,
    amount: BigDecimal,
    description: String,
    payment_method: &str,
    reference_id: Option<String>,
    now: DateTime<Utc>,
) -> Transaction {
    Transaction {
        id: new_id(),
        user_id: user_id.to_string(),
        tx_type: tx_type.to_string(),
        amount,
        status: TX_STATUS_COMPLETED.to_string(),
        description,
        payment_method: payment_method.to_string(),
        reference_id,
        created_at: now,
        updated_at: now,
    }
}

/// The one code path allowed to raise a balance outside reconciliation.
/// Commission and dividend settlement run the same credit inside the store's
/// per-record transaction; this front door serves admin adjustments and the
/// deposit flow.
pub struct PayoutProcessor {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl PayoutProcessor {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn credit_user(
        &self,
        user_id: &str,
        amount: BigDecimal,
        tx_type: &str,
        description: String,
        payment_method: &str,
        reference_id: Option<String>,
    ) -> Result<Transaction> {
        if amount <= BigDecimal::from(0) {
            return Err(LedgerError::Validation(
                "credit amount must be positive".to_string(),
            ));
        }
        let tx = completed_transaction(
            user_id,
            tx_type,
            amount,
            description,
            payment_method,
            reference_id,
            self.clock.now(),
        );
        self.store.credit_user(tx).await
    }
}
