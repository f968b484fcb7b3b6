use bigdecimal::{BigDecimal, RoundingMode};
use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::ledger::{ensure_admin, payout::completed_transaction};
use crate::metrics;
use crate::models::commission::{Commission, PAYOUT_STATUS_PENDING};
use crate::models::new_id;
use crate::models::transaction::{Transaction, PAYMENT_METHOD_BALANCE, TX_TYPE_REFERRAL_BONUS};
use crate::models::user::Actor;
use crate::notify::Notifier;
use crate::store::Store;
use tracing::{debug, error, info};

/// commission = base x rate%, money-rounded.
fn commission_amount(base: &BigDecimal, rate: i32) -> BigDecimal {
    (base * BigDecimal::from(rate) / BigDecimal::from(100))
        .with_scale_round(2, RoundingMode::HalfUp)
}

#[derive(Debug, Default, Serialize)]
pub struct ReconcileSummary {
    pub transactions_processed: usize,
    pub commissions_created: usize,
    pub total_amount: BigDecimal,
}

#[derive(Debug, Default, Serialize)]
pub struct PayoutSummary {
    pub paid: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_amount: BigDecimal,
}

/// Computes and settles referral commissions for completed deposits.
pub struct CommissionEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl CommissionEngine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, clock, notifier }
    }

    /// Create the pending commissions a completed deposit earns for the
    /// depositor's ancestors. Safe to call repeatedly for the same deposit:
    /// the (transaction, referral) unique key turns re-runs into no-ops.
    pub async fn on_deposit_completed(&self, tx: &Transaction) -> Result<Vec<Commission>> {
        if !tx.is_completed_deposit() {
            return Err(LedgerError::Validation(format!(
                "transaction {} is not a completed deposit",
                tx.id
            )));
        }

        let ancestry = self.store.ancestry_of(&tx.user_id).await?;
        if ancestry.is_empty() {
            return Ok(Vec::new());
        }

        let source_name = self
            .store
            .user(&tx.user_id)
            .await?
            .map(|u| u.name)
            .unwrap_or_else(|| "user".to_string());
        let now = self.clock.now();

        let mut created = Vec::new();
        for referral in ancestry {
            let commission = Commission {
                id: new_id(),
                user_id: referral.referrer_id.clone(),
                referral_id: referral.id.clone(),
                source_user_id: tx.user_id.clone(),
                transaction_id: tx.id.clone(),
                level: referral.level,
                rate: referral.commission_rate,
                base_amount: tx.amount.clone(),
                commission_amount: commission_amount(&tx.amount, referral.commission_rate),
                status: PAYOUT_STATUS_PENDING.to_string(),
                description: format!("Deposit from {}", source_name),
                created_at: now,
                paid_date: None,
            };
            match self.store.insert_commission_if_absent(commission).await? {
                Some(row) => {
                    metrics::COMMISSIONS_CREATED.inc();
                    created.push(row);
                }
                None => {
                    debug!(
                        "commission for deposit {} via referral {} already exists, skipping",
                        tx.id, referral.id
                    );
                }
            }
        }

        if !created.is_empty() {
            info!(
                "generated {} commissions for deposit {} by {}",
                created.len(),
                tx.id,
                tx.user_id
            );
        }
        Ok(created)
    }

    /// Catch-up sweep over every completed deposit with no commissions yet.
    pub async fn reconcile_pending(&self) -> Result<ReconcileSummary> {
        let deposits = self.store.completed_deposits().await?;
        let mut summary = ReconcileSummary::default();

        for tx in deposits {
            let existing = self.store.commissions_for_transaction(&tx.id).await?;
            if !existing.is_empty() {
                continue;
            }
            summary.transactions_processed += 1;
            let created = self.on_deposit_completed(&tx).await?;
            summary.commissions_created += created.len();
            for commission in &created {
                summary.total_amount = &summary.total_amount + &commission.commission_amount;
            }
        }

        info!(
            "commission reconcile: {} deposits scanned, {} commissions created, {} total",
            summary.transactions_processed, summary.commissions_created, summary.total_amount
        );
        Ok(summary)
    }

    /// Settle a batch of commissions. Each record is an atomic
    /// (mark-paid, credit, transaction) triple in the store; the batch is
    /// best-effort and reports partial success rather than rolling back.
    pub async fn pay(&self, actor: &Actor, ids: &[String]) -> Result<PayoutSummary> {
        ensure_admin(actor)?;
        let mut summary = PayoutSummary::default();

        for id in ids {
            let commission = match self.store.commission(id).await? {
                Some(c) => c,
                None => {
                    error!("commission {} not found, skipping", id);
                    summary.failed += 1;
                    continue;
                }
            };
            if !commission.is_pending() {
                summary.skipped += 1;
                continue;
            }

            let now = self.clock.now();
            let tx = completed_transaction(
                &commission.user_id,
                TX_TYPE_REFERRAL_BONUS,
                commission.commission_amount.clone(),
                format!("Level {} commission - {}", commission.level, commission.description),
                PAYMENT_METHOD_BALANCE,
                Some(commission.id.clone()),
                now,
            );
            match self.store.settle_commission(id, tx, now).await {
                Ok(Some((settled, _tx))) => {
                    metrics::COMMISSIONS_PAID.inc();
                    summary.paid += 1;
                    summary.total_amount = &summary.total_amount + &settled.commission_amount;
                    self.notifier
                        .payout_settled(&settled.user_id, "commission", &settled.commission_amount)
                        .await;
                }
                Ok(None) => {
                    // Lost the race to another payer; the record is no
                    // longer pending.
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!("failed to settle commission {}: {}, continuing", id, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "commission payout: {} paid, {} skipped, {} failed, {} total",
            summary.paid, summary.skipped, summary.failed, summary.total_amount
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ledger::accounts::AccountService;
    use crate::notify::LogNotifier;
    use crate::store::memory::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    fn money(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn fixture() -> (Arc<MemoryStore>, AccountService, CommissionEngine) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let accounts = AccountService::new(store.clone(), clock.clone());
        let engine = CommissionEngine::new(store.clone(), clock, Arc::new(LogNotifier));
        (store, accounts, engine)
    }

    #[tokio::test]
    async fn three_level_deposit_math() {
        let (_store, accounts, _engine) = fixture();

        let a = accounts.register("Alice", "a@example.com", None).await.unwrap();
        let b = accounts
            .register("Bob", "b@example.com", Some(&a.referral_code))
            .await
            .unwrap();
        let c = accounts
            .register("Carol", "c@example.com", Some(&b.referral_code))
            .await
            .unwrap();
        let d = accounts
            .register("Dave", "d@example.com", Some(&c.referral_code))
            .await
            .unwrap();

        let (tx, commissions) = accounts.deposit(&d.id, money("1000.00"), "pix").await.unwrap();

        assert_eq!(commissions.len(), 3);
        let amounts: Vec<(i32, BigDecimal)> = commissions
            .iter()
            .map(|c| (c.level, c.commission_amount.clone()))
            .collect();
        assert_eq!(
            amounts,
            vec![
                (1, money("170.00")),
                (2, money("20.00")),
                (3, money("10.00")),
            ]
        );
        for commission in &commissions {
            assert_eq!(commission.status, PAYOUT_STATUS_PENDING);
            assert_eq!(commission.transaction_id, tx.id);
            assert_eq!(commission.base_amount, money("1000.00"));
        }
        assert_eq!(commissions[0].user_id, c.id);
        assert_eq!(commissions[1].user_id, b.id);
        assert_eq!(commissions[2].user_id, a.id);
    }

    #[tokio::test]
    async fn generation_is_idempotent() {
        let (store, accounts, engine) = fixture();

        let a = accounts.register("Alice", "a@example.com", None).await.unwrap();
        let b = accounts
            .register("Bob", "b@example.com", Some(&a.referral_code))
            .await
            .unwrap();

        let (tx, first) = accounts.deposit(&b.id, money("300.00"), "pix").await.unwrap();
        assert_eq!(first.len(), 1);

        // Re-running the trigger and the bulk sweep creates nothing new.
        let second = engine.on_deposit_completed(&tx).await.unwrap();
        assert!(second.is_empty());

        let summary = engine.reconcile_pending().await.unwrap();
        assert_eq!(summary.commissions_created, 0);

        assert_eq!(store.commissions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bulk_reconcile_picks_up_unprocessed_deposits() {
        let (store, accounts, engine) = fixture();

        let a = accounts.register("Alice", "a@example.com", None).await.unwrap();
        let b = accounts
            .register("Bob", "b@example.com", Some(&a.referral_code))
            .await
            .unwrap();

        // A completed deposit written directly to the ledger, bypassing the
        // deposit flow (e.g. imported history).
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        store
            .credit_user(completed_transaction(
                &b.id,
                crate::models::transaction::TX_TYPE_DEPOSIT,
                money("200.00"),
                "Imported deposit".to_string(),
                "pix",
                None,
                now,
            ))
            .await
            .unwrap();

        let summary = engine.reconcile_pending().await.unwrap();
        assert_eq!(summary.transactions_processed, 1);
        assert_eq!(summary.commissions_created, 1);
        assert_eq!(summary.total_amount, money("34.00"));
    }

    #[tokio::test]
    async fn payment_credits_balance_and_never_reverts() {
        let (store, accounts, engine) = fixture();

        let a = accounts.register("Alice", "a@example.com", None).await.unwrap();
        let b = accounts
            .register("Bob", "b@example.com", Some(&a.referral_code))
            .await
            .unwrap();
        let (_tx, commissions) = accounts.deposit(&b.id, money("1000.00"), "pix").await.unwrap();
        let ids: Vec<String> = commissions.iter().map(|c| c.id.clone()).collect();

        let admin = Actor::admin("admin");
        let summary = engine.pay(&admin, &ids).await.unwrap();
        assert_eq!(summary.paid, 1);
        assert_eq!(summary.total_amount, money("170.00"));

        let a_after = store.user(&a.id).await.unwrap().unwrap();
        assert_eq!(a_after.balance, money("170.00"));
        assert_eq!(a_after.total_earnings, money("170.00"));

        let paid = store.commission(&ids[0]).await.unwrap().unwrap();
        assert_eq!(paid.status, crate::models::commission::PAYOUT_STATUS_PAID);
        assert!(paid.paid_date.is_some());

        let bonus_txs: Vec<Transaction> = store
            .transactions_for(&a.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| t.tx_type == TX_TYPE_REFERRAL_BONUS)
            .collect();
        assert_eq!(bonus_txs.len(), 1);
        assert_eq!(bonus_txs[0].reference_id.as_deref(), Some(ids[0].as_str()));

        // Paying again skips the settled record and changes nothing.
        let summary = engine.pay(&admin, &ids).await.unwrap();
        assert_eq!(summary.paid, 0);
        assert_eq!(summary.skipped, 1);
        let a_after = store.user(&a.id).await.unwrap().unwrap();
        assert_eq!(a_after.balance, money("170.00"));
    }

    #[tokio::test]
    async fn payment_requires_admin() {
        let (_store, accounts, engine) = fixture();
        let u = accounts.register("Alice", "a@example.com", None).await.unwrap();
        let err = engine
            .pay(&Actor::user(u.id), &["whatever".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized));
    }
}
