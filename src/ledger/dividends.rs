use bigdecimal::BigDecimal;
use chrono::{Duration, NaiveDate, NaiveTime};
use serde::Serialize;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::Result;
use crate::ledger::{ensure_admin, payout::completed_transaction};
use crate::metrics;
use crate::models::commission::PAYOUT_STATUS_PENDING;
use crate::models::dividend::{Dividend, DIVIDEND_METHOD_AUTOMATIC};
use crate::models::new_id;
use crate::models::plan::AutoPaymentConfig;
use crate::models::transaction::{PAYMENT_METHOD_BALANCE, TX_TYPE_INVESTMENT_RETURN};
use crate::models::user::Actor;
use crate::notify::Notifier;
use crate::store::Store;
use tracing::{error, info, warn};

#[derive(Debug, Default, Serialize)]
pub struct DividendPaySummary {
    pub processed_count: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_amount: BigDecimal,
}

/// Generates one pending dividend per invested user per day and settles
/// pending dividends, manually or through the automatic sweep.
pub struct DividendEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
}

impl DividendEngine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, clock, notifier }
    }

    /// Create the day's pending dividends. The (user, date) unique key makes
    /// this idempotent, so the scheduler and an admin can both trigger it.
    pub async fn generate_daily(&self, today: NaiveDate) -> Result<usize> {
        let plans: Vec<_> = self
            .store
            .plans()
            .await?
            .into_iter()
            .filter(|p| p.is_active)
            .collect();
        let now = self.clock.now();
        let mut generated = 0;

        for user in self.store.users().await? {
            let portfolio = user.investments();
            if portfolio.is_empty() {
                continue;
            }
            // First investment backed by a live plan wins; plans are matched
            // by code, falling back to the entry amount for legacy rows.
            let matched = portfolio.iter().find_map(|inv| {
                plans
                    .iter()
                    .find(|p| p.code == inv.plan_code || p.value == inv.amount)
                    .map(|p| (p, inv))
            });
            let Some((plan, investment)) = matched else {
                continue;
            };

            let dividend = Dividend {
                id: new_id(),
                user_id: user.id.clone(),
                investment_plan_id: plan.id.clone(),
                plan_name: plan.name.clone(),
                investment_amount: investment.amount.clone(),
                dividend_amount: plan.daily_profit.clone(),
                dividend_date: today,
                status: PAYOUT_STATUS_PENDING.to_string(),
                payment_method: None,
                transaction_id: None,
                created_at: now,
                paid_date: None,
            };
            if self.store.insert_dividend_if_absent(dividend).await?.is_some() {
                metrics::DIVIDENDS_GENERATED.inc();
                generated += 1;
            }
        }

        info!("generated {} dividends for {}", generated, today);
        Ok(generated)
    }

    /// Admin-selected settlement.
    pub async fn pay(
        &self,
        actor: &Actor,
        ids: &[String],
        method: &str,
    ) -> Result<DividendPaySummary> {
        ensure_admin(actor)?;
        self.pay_batch(ids, method).await
    }

    async fn pay_batch(&self, ids: &[String], method: &str) -> Result<DividendPaySummary> {
        let mut summary = DividendPaySummary::default();

        for id in ids {
            let dividend = match self.store.dividend(id).await? {
                Some(d) => d,
                None => {
                    error!("dividend {} not found, skipping", id);
                    summary.failed += 1;
                    continue;
                }
            };
            if !dividend.is_pending() {
                summary.skipped += 1;
                continue;
            }

            let now = self.clock.now();
            let tx = completed_transaction(
                &dividend.user_id,
                TX_TYPE_INVESTMENT_RETURN,
                dividend.dividend_amount.clone(),
                format!("{} dividend for {}", dividend.plan_name, dividend.dividend_date),
                PAYMENT_METHOD_BALANCE,
                Some(dividend.id.clone()),
                now,
            );
            match self.store.settle_dividend(id, method, tx, now).await {
                Ok(Some((settled, _tx))) => {
                    metrics::DIVIDENDS_PAID.inc();
                    summary.processed_count += 1;
                    summary.total_amount = &summary.total_amount + &settled.dividend_amount;
                    self.notifier
                        .payout_settled(&settled.user_id, "dividend", &settled.dividend_amount)
                        .await;
                }
                Ok(None) => {
                    summary.skipped += 1;
                }
                Err(e) => {
                    error!("failed to settle dividend {}: {}, continuing", id, e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "dividend payout ({}): {} paid, {} skipped, {} failed, {} total",
            method, summary.processed_count, summary.skipped, summary.failed, summary.total_amount
        );
        Ok(summary)
    }

    /// Generate today's dividends, pay everything pending for today and
    /// update the auto-payment bookkeeping.
    pub async fn run_automatic_sweep(&self) -> Result<DividendPaySummary> {
        let today = self.clock.today();
        self.generate_daily(today).await?;

        let pending = self.store.pending_dividends_on(today).await?;
        let ids: Vec<String> = pending.iter().map(|d| d.id.clone()).collect();
        let summary = self.pay_batch(&ids, DIVIDEND_METHOD_AUTOMATIC).await?;

        let now = self.clock.now();
        let config = self
            .store
            .auto_payment_config()
            .await?
            .unwrap_or_else(|| AutoPaymentConfig {
                id: new_id(),
                is_active: false,
                payment_time: "09:00".to_string(),
                last_payment_date: None,
                next_payment_date: None,
                total_users_paid: 0,
                total_amount_paid: BigDecimal::from(0),
                created_at: now,
                updated_at: now,
            });
        let updated = AutoPaymentConfig {
            last_payment_date: Some(today),
            next_payment_date: Some(today + Duration::days(1)),
            total_users_paid: summary.processed_count as i32,
            total_amount_paid: summary.total_amount.clone(),
            updated_at: now,
            ..config
        };
        self.store.upsert_auto_payment_config(updated).await?;

        Ok(summary)
    }

    /// Scheduler entry point: run the sweep when auto payment is active, the
    /// configured time of day has passed and today has not been paid yet.
    pub async fn maybe_run_sweep(&self) -> Result<Option<DividendPaySummary>> {
        let Some(config) = self.store.auto_payment_config().await? else {
            return Ok(None);
        };
        if !config.is_active {
            return Ok(None);
        }

        let now = self.clock.now();
        let today = self.clock.today();
        if config.last_payment_date == Some(today) {
            return Ok(None);
        }
        let due_time = NaiveTime::parse_from_str(&config.payment_time, "%H:%M").unwrap_or_else(|_| {
            warn!(
                "invalid auto payment time {:?}, falling back to midnight",
                config.payment_time
            );
            NaiveTime::MIN
        });
        if now.time() < due_time {
            return Ok(None);
        }

        Ok(Some(self.run_automatic_sweep().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::LedgerError;
    use crate::ledger::accounts::AccountService;
    use crate::models::commission::PAYOUT_STATUS_PAID;
    use crate::models::dividend::DIVIDEND_METHOD_MANUAL;
    use crate::models::plan::InvestmentPlan;
    use crate::notify::LogNotifier;
    use crate::store::memory::MemoryStore;
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    fn money(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    async fn fixture() -> (Arc<MemoryStore>, Arc<FixedClock>, AccountService, DividendEngine) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
        ));
        let accounts = AccountService::new(store.clone(), clock.clone());
        let engine = DividendEngine::new(store.clone(), clock.clone(), Arc::new(LogNotifier));

        let now = clock.now();
        store
            .insert_plan(InvestmentPlan {
                id: "plan-basic".to_string(),
                code: "BASIC".to_string(),
                name: "Basic Plan".to_string(),
                description: String::new(),
                value: money("1000.00"),
                return_rate: money("10"),
                return_period: 30,
                daily_profit: money("3.33"),
                total_profit: money("100.00"),
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        (store, clock, accounts, engine)
    }

    async fn invested_user(
        accounts: &AccountService,
        email: &str,
    ) -> crate::models::user::User {
        let u = accounts.register("Investor", email, None).await.unwrap();
        accounts.deposit(&u.id, money("1000.00"), "pix").await.unwrap();
        accounts.purchase_plan(&u.id, "BASIC").await.unwrap();
        u
    }

    #[tokio::test]
    async fn generation_is_idempotent_per_day() {
        let (store, clock, accounts, engine) = fixture().await;
        invested_user(&accounts, "a@example.com").await;

        let today = clock.today();
        assert_eq!(engine.generate_daily(today).await.unwrap(), 1);
        assert_eq!(engine.generate_daily(today).await.unwrap(), 0);
        assert_eq!(store.dividends().await.unwrap().len(), 1);

        // The next day generates a fresh row.
        clock.advance_days(1);
        assert_eq!(engine.generate_daily(clock.today()).await.unwrap(), 1);
        assert_eq!(store.dividends().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn users_without_investments_earn_nothing() {
        let (store, clock, accounts, engine) = fixture().await;
        accounts.register("Idle", "idle@example.com", None).await.unwrap();

        assert_eq!(engine.generate_daily(clock.today()).await.unwrap(), 0);
        assert!(store.dividends().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn manual_payment_credits_balance_and_earnings() {
        let (store, clock, accounts, engine) = fixture().await;
        let u = invested_user(&accounts, "a@example.com").await;

        engine.generate_daily(clock.today()).await.unwrap();
        let ids: Vec<String> = store
            .dividends()
            .await
            .unwrap()
            .iter()
            .map(|d| d.id.clone())
            .collect();

        let admin = Actor::admin("admin");
        let summary = engine.pay(&admin, &ids, DIVIDEND_METHOD_MANUAL).await.unwrap();
        assert_eq!(summary.processed_count, 1);
        assert_eq!(summary.total_amount, money("3.33"));

        let after = store.user(&u.id).await.unwrap().unwrap();
        assert_eq!(after.balance, money("3.33"));
        assert_eq!(after.total_earnings, money("3.33"));

        let paid = store.dividend(&ids[0]).await.unwrap().unwrap();
        assert_eq!(paid.status, PAYOUT_STATUS_PAID);
        assert_eq!(paid.payment_method.as_deref(), Some(DIVIDEND_METHOD_MANUAL));
        let tx_id = paid.transaction_id.expect("settled dividend links its transaction");
        let tx = store.transaction(&tx_id).await.unwrap().unwrap();
        assert_eq!(tx.tx_type, TX_TYPE_INVESTMENT_RETURN);
        assert_eq!(tx.amount, money("3.33"));

        // Settling the same set again is a no-op.
        let summary = engine.pay(&admin, &ids, DIVIDEND_METHOD_MANUAL).await.unwrap();
        assert_eq!(summary.processed_count, 0);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn payment_requires_admin() {
        let (_store, _clock, accounts, engine) = fixture().await;
        let u = accounts.register("Alice", "a@example.com", None).await.unwrap();
        let err = engine
            .pay(&Actor::user(u.id), &[], DIVIDEND_METHOD_MANUAL)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized));
    }

    #[tokio::test]
    async fn automatic_sweep_pays_today_and_updates_bookkeeping() {
        let (store, clock, accounts, engine) = fixture().await;
        let u = invested_user(&accounts, "a@example.com").await;

        let now = clock.now();
        store
            .upsert_auto_payment_config(AutoPaymentConfig {
                id: "auto".to_string(),
                is_active: true,
                payment_time: "09:00".to_string(),
                last_payment_date: None,
                next_payment_date: None,
                total_users_paid: 0,
                total_amount_paid: BigDecimal::from(0),
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        // Clock is at 10:00, past the 09:00 payment time.
        let summary = engine.maybe_run_sweep().await.unwrap().expect("sweep due");
        assert_eq!(summary.processed_count, 1);

        let after = store.user(&u.id).await.unwrap().unwrap();
        assert_eq!(after.balance, money("3.33"));

        let config = store.auto_payment_config().await.unwrap().unwrap();
        assert_eq!(config.last_payment_date, Some(clock.today()));
        assert_eq!(config.next_payment_date, Some(clock.today() + Duration::days(1)));
        assert_eq!(config.total_users_paid, 1);
        assert_eq!(config.total_amount_paid, money("3.33"));

        // A second poll the same day does nothing.
        assert!(engine.maybe_run_sweep().await.unwrap().is_none());
    }
}
