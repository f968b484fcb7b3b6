use bigdecimal::BigDecimal;
use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::ledger::payout::completed_transaction;
use crate::metrics;
use crate::models::commission::PAYOUT_STATUS_PAID;
use crate::models::transaction::{PAYMENT_METHOD_BALANCE, TX_TYPE_REFERRAL_BONUS};
use crate::store::Store;
use tracing::{error, info, warn};

#[derive(Debug, Default, Serialize)]
pub struct ReconciliationReport {
    /// Users whose stored balance disagreed with the ledger and was
    /// overwritten.
    pub corrected_users: Vec<String>,
    /// Paid commissions that were missing their referral_bonus transaction.
    pub backfilled_transactions: usize,
    /// Drift that could not be repaired (surfaced to the operator, never
    /// silently dropped).
    pub unrepairable: usize,
}

/// Recomputes balances from the transaction ledger and repairs drift.
pub struct Reconciler {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The authoritative balance: the sum of the user's completed
    /// transactions.
    pub async fn recompute_balance(&self, user_id: &str) -> Result<BigDecimal> {
        self.store
            .user(user_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound("user", user_id.to_string()))?;
        let transactions = self.store.transactions_for(user_id).await?;
        Ok(transactions
            .iter()
            .filter(|t| t.is_completed())
            .fold(BigDecimal::from(0), |sum, t| sum + &t.amount))
    }

    /// Two passes over the whole ledger. First, every paid commission gets
    /// its referral_bonus transaction backfilled if missing (drift left by
    /// payouts that crashed between mark-paid and the ledger write). Then
    /// every stored balance is compared against the recomputed sum and
    /// overwritten on mismatch.
    pub async fn verify_and_repair(&self) -> Result<ReconciliationReport> {
        let now = self.clock.now();
        let mut report = ReconciliationReport::default();

        for commission in self.store.commissions().await? {
            if commission.status != PAYOUT_STATUS_PAID {
                continue;
            }
            if self.store.user(&commission.user_id).await?.is_none() {
                error!(
                    "paid commission {} references missing user {}, cannot repair",
                    commission.id, commission.user_id
                );
                report.unrepairable += 1;
                continue;
            }
            let transactions = self.store.transactions_for(&commission.user_id).await?;
            let has_bonus_tx = transactions.iter().any(|t| {
                t.tx_type == TX_TYPE_REFERRAL_BONUS
                    && t.is_completed()
                    && t.reference_id.as_deref() == Some(commission.id.as_str())
            });
            if has_bonus_tx {
                continue;
            }

            warn!(
                "backfilling missing referral_bonus transaction for paid commission {}",
                commission.id
            );
            // Ledger row only; the balance pass below folds it in.
            let tx = completed_transaction(
                &commission.user_id,
                TX_TYPE_REFERRAL_BONUS,
                commission.commission_amount.clone(),
                format!(
                    "Level {} commission - {}",
                    commission.level, commission.description
                ),
                PAYMENT_METHOD_BALANCE,
                Some(commission.id.clone()),
                commission.paid_date.unwrap_or(now),
            );
            self.store.insert_transaction(tx).await?;
            report.backfilled_transactions += 1;
        }

        for user in self.store.users().await? {
            let computed = self.recompute_balance(&user.id).await?;
            if computed != user.balance {
                warn!(
                    "balance drift for user {}: stored {}, ledger {}",
                    user.id, user.balance, computed
                );
                self.store.overwrite_balance(&user.id, computed, now).await?;
                metrics::BALANCES_REPAIRED.inc();
                report.corrected_users.push(user.id);
            }
        }

        info!(
            "reconciliation: {} balances corrected, {} transactions backfilled, {} unrepairable",
            report.corrected_users.len(),
            report.backfilled_transactions,
            report.unrepairable
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ledger::accounts::AccountService;
    use crate::models::commission::{Commission, PAYOUT_STATUS_PENDING};
    use crate::models::new_id;
    use crate::store::memory::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    fn money(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn fixture() -> (Arc<MemoryStore>, Arc<FixedClock>, AccountService, Reconciler) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let accounts = AccountService::new(store.clone(), clock.clone());
        let reconciler = Reconciler::new(store.clone(), clock.clone());
        (store, clock, accounts, reconciler)
    }

    #[tokio::test]
    async fn clean_ledger_needs_no_repair() {
        let (_store, _clock, accounts, reconciler) = fixture();
        let u = accounts.register("Alice", "a@example.com", None).await.unwrap();
        accounts.deposit(&u.id, money("250.00"), "pix").await.unwrap();

        let report = reconciler.verify_and_repair().await.unwrap();
        assert!(report.corrected_users.is_empty());
        assert_eq!(report.backfilled_transactions, 0);
        assert_eq!(reconciler.recompute_balance(&u.id).await.unwrap(), money("250.00"));
    }

    #[tokio::test]
    async fn drifted_balance_is_overwritten() {
        let (store, clock, accounts, reconciler) = fixture();
        let u = accounts.register("Alice", "a@example.com", None).await.unwrap();
        accounts.deposit(&u.id, money("250.00"), "pix").await.unwrap();

        // Simulate drift from a buggy manual edit.
        store
            .overwrite_balance(&u.id, money("999.00"), clock.now())
            .await
            .unwrap();

        let report = reconciler.verify_and_repair().await.unwrap();
        assert_eq!(report.corrected_users, vec![u.id.clone()]);
        let after = store.user(&u.id).await.unwrap().unwrap();
        assert_eq!(after.balance, money("250.00"));
    }

    #[tokio::test]
    async fn paid_commission_without_ledger_row_is_backfilled() {
        let (store, clock, accounts, reconciler) = fixture();
        let a = accounts.register("Alice", "a@example.com", None).await.unwrap();
        let b = accounts
            .register("Bob", "b@example.com", Some(&a.referral_code))
            .await
            .unwrap();
        let (tx, commissions) = accounts.deposit(&b.id, money("100.00"), "pix").await.unwrap();
        assert_eq!(commissions.len(), 1);

        // A commission marked paid with no referral_bonus transaction: the
        // drift left by the legacy non-atomic payout path.
        let now = clock.now();
        let orphaned = Commission {
            id: new_id(),
            user_id: a.id.clone(),
            referral_id: commissions[0].referral_id.clone(),
            source_user_id: b.id.clone(),
            transaction_id: format!("{}-legacy", tx.id),
            level: 1,
            rate: 17,
            base_amount: money("100.00"),
            commission_amount: money("17.00"),
            status: PAYOUT_STATUS_PAID.to_string(),
            description: "Deposit from Bob".to_string(),
            created_at: now,
            paid_date: Some(now),
        };
        store.insert_commission_if_absent(orphaned.clone()).await.unwrap().unwrap();

        let report = reconciler.verify_and_repair().await.unwrap();
        assert_eq!(report.backfilled_transactions, 1);
        // The backfilled row flows into A's balance on the same pass.
        assert_eq!(report.corrected_users, vec![a.id.clone()]);

        let a_after = store.user(&a.id).await.unwrap().unwrap();
        assert_eq!(a_after.balance, money("17.00"));

        let bonus = store
            .transactions_for(&a.id)
            .await
            .unwrap()
            .into_iter()
            .find(|t| t.reference_id.as_deref() == Some(orphaned.id.as_str()))
            .expect("backfilled transaction exists");
        assert_eq!(bonus.amount, money("17.00"));

        // Running again is stable: nothing more to repair.
        let report = reconciler.verify_and_repair().await.unwrap();
        assert_eq!(report.backfilled_transactions, 0);
        assert!(report.corrected_users.is_empty());
    }

    #[tokio::test]
    async fn pending_commissions_do_not_backfill() {
        let (store, _clock, accounts, reconciler) = fixture();
        let a = accounts.register("Alice", "a@example.com", None).await.unwrap();
        let b = accounts
            .register("Bob", "b@example.com", Some(&a.referral_code))
            .await
            .unwrap();
        accounts.deposit(&b.id, money("100.00"), "pix").await.unwrap();

        let report = reconciler.verify_and_repair().await.unwrap();
        assert_eq!(report.backfilled_transactions, 0);
        let pending: Vec<_> = store
            .commissions()
            .await
            .unwrap()
            .into_iter()
            .filter(|c| c.status == PAYOUT_STATUS_PENDING)
            .collect();
        assert_eq!(pending.len(), 1);
    }
}
