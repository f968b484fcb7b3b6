use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Duration, Utc};
use std::str::FromStr;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::ledger::commissions::CommissionEngine;
use crate::ledger::payout::completed_transaction;
use crate::ledger::referral_graph::ReferralGraph;
use crate::models::commission::Commission;
use crate::models::new_id;
use crate::models::plan::{CONFIG_MIN_WITHDRAWAL, CONFIG_WITHDRAWAL_FEE};
use crate::models::transaction::{
    Transaction, PAYMENT_METHOD_BALANCE, PAYMENT_METHOD_PIX, TX_TYPE_DEPOSIT, TX_TYPE_INVESTMENT,
    TX_TYPE_WITHDRAWAL,
};
use crate::models::user::{investments_to_json, ActiveInvestment, User, ROLE_USER};
use crate::notify::LogNotifier;
use crate::store::Store;
use tracing::info;

/// Registration and the money-moving user operations: deposits (which feed
/// the commission engine), withdrawals and plan purchases.
pub struct AccountService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    graph: ReferralGraph,
    commissions: CommissionEngine,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let graph = ReferralGraph::new(store.clone(), clock.clone());
        let commissions =
            CommissionEngine::new(store.clone(), clock.clone(), Arc::new(LogNotifier));
        Self { store, clock, graph, commissions }
    }

    /// Referral codes are the public sponsor handle: first name plus a
    /// clock-derived suffix, retried until unique, immutable afterwards.
    async fn generate_referral_code(&self, name: &str, now: DateTime<Utc>) -> Result<String> {
        let prefix: String = name
            .split_whitespace()
            .next()
            .unwrap_or("")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_uppercase();
        let prefix = if prefix.is_empty() { "USER".to_string() } else { prefix };

        let millis = now.timestamp_millis();
        for attempt in 0..1000 {
            let code = format!("{}{:06}", prefix, (millis + attempt) % 1_000_000);
            if self.store.user_by_referral_code(&code).await?.is_none() {
                return Ok(code);
            }
        }
        Err(LedgerError::Consistency(format!(
            "unable to allocate a unique referral code for {}",
            name
        )))
    }

    /// Register a new account, optionally under a sponsor's referral code.
    /// With a sponsor, the full eligible chain is created and the direct
    /// sponsor's referral count is bumped.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        referred_by: Option<&str>,
    ) -> Result<User> {
        if name.trim().is_empty() || email.trim().is_empty() {
            return Err(LedgerError::Validation(
                "name and email are required".to_string(),
            ));
        }
        if self.store.user_by_email(email).await?.is_some() {
            return Err(LedgerError::Duplicate(format!("email {}", email)));
        }

        let sponsor = match referred_by {
            Some(code) => Some(
                self.store
                    .user_by_referral_code(code)
                    .await?
                    .ok_or_else(|| LedgerError::NotFound("sponsor", code.to_string()))?,
            ),
            None => None,
        };

        let now = self.clock.now();
        let referral_code = self.generate_referral_code(name, now).await?;
        let user = User {
            id: new_id(),
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            role: ROLE_USER.to_string(),
            balance: BigDecimal::from(0),
            total_earnings: BigDecimal::from(0),
            total_invested: BigDecimal::from(0),
            active_investments: investments_to_json(&[]),
            referral_code,
            referred_by: referred_by.map(|c| c.to_string()),
            total_referrals: 0,
            created_at: now,
            updated_at: now,
        };
        let user = self.store.insert_user(user).await?;

        if let Some(sponsor) = sponsor {
            self.graph.create_chain(&user, &sponsor).await?;
            self.store.increment_total_referrals(&sponsor.id, now).await?;
        }

        info!("registered user {} ({})", user.id, user.email);
        Ok(user)
    }

    /// Record a completed deposit, credit the balance and generate the
    /// ancestor commissions it earns.
    pub async fn deposit(
        &self,
        user_id: &str,
        amount: BigDecimal,
        payment_method: &str,
    ) -> Result<(Transaction, Vec<Commission>)> {
        if amount <= BigDecimal::from(0) {
            return Err(LedgerError::Validation(
                "deposit amount must be positive".to_string(),
            ));
        }
        self.store
            .user(user_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound("user", user_id.to_string()))?;

        let tx = completed_transaction(
            user_id,
            TX_TYPE_DEPOSIT,
            amount,
            format!("Deposit via {}", payment_method),
            payment_method,
            None,
            self.clock.now(),
        );
        let tx = self.store.credit_user(tx).await?;
        let commissions = self.commissions.on_deposit_completed(&tx).await?;
        Ok((tx, commissions))
    }

    /// Withdraw from the balance. Validates the configured minimum, records
    /// the fee in the description and rejects anything the balance cannot
    /// cover.
    pub async fn withdraw(&self, user_id: &str, amount: BigDecimal) -> Result<Transaction> {
        if amount <= BigDecimal::from(0) {
            return Err(LedgerError::Validation(
                "withdrawal amount must be positive".to_string(),
            ));
        }

        let minimum = self.decimal_config(CONFIG_MIN_WITHDRAWAL).await?;
        if let Some(minimum) = minimum {
            if amount < minimum {
                return Err(LedgerError::Validation(format!(
                    "withdrawal amount {} is below the minimum of {}",
                    amount, minimum
                )));
            }
        }
        let fee_rate = self
            .decimal_config(CONFIG_WITHDRAWAL_FEE)
            .await?
            .unwrap_or_else(|| BigDecimal::from(0));
        let fee = (&amount * &fee_rate).with_scale_round(2, RoundingMode::HalfUp);
        let net = &amount - &fee;

        let tx = completed_transaction(
            user_id,
            TX_TYPE_WITHDRAWAL,
            -amount,
            format!("Withdrawal ({} net of {} fee)", net, fee),
            PAYMENT_METHOD_PIX,
            None,
            self.clock.now(),
        );
        self.store.debit_user(tx).await
    }

    /// Buy an investment plan out of the balance. The purchase debits the
    /// ledger and appends the plan to the active portfolio in one atomic
    /// store call.
    pub async fn purchase_plan(&self, user_id: &str, plan_code: &str) -> Result<Transaction> {
        let plan = self
            .store
            .plan_by_code(plan_code)
            .await?
            .ok_or_else(|| LedgerError::NotFound("investment plan", plan_code.to_string()))?;
        if !plan.is_active {
            return Err(LedgerError::Validation(format!(
                "investment plan {} is not active",
                plan.code
            )));
        }

        let now = self.clock.now();
        let today = self.clock.today();
        let investment = ActiveInvestment {
            plan_code: plan.code.clone(),
            amount: plan.value.clone(),
            start_date: today,
            end_date: today + Duration::days(plan.return_period as i64),
            daily_return: plan.daily_profit.clone(),
        };
        let tx = completed_transaction(
            user_id,
            TX_TYPE_INVESTMENT,
            -plan.value.clone(),
            format!("Investment in {}", plan.name),
            PAYMENT_METHOD_BALANCE,
            Some(plan.id.clone()),
            now,
        );
        self.store.apply_investment_purchase(tx, investment).await
    }

    async fn decimal_config(&self, key: &str) -> Result<Option<BigDecimal>> {
        let Some(config) = self.store.system_config(key).await? else {
            return Ok(None);
        };
        BigDecimal::from_str(&config.value)
            .map(Some)
            .map_err(|_| {
                LedgerError::Consistency(format!(
                    "system config {} holds a non-decimal value: {}",
                    key, config.value
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    fn money(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn fixture() -> (Arc<MemoryStore>, AccountService) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let accounts = AccountService::new(store.clone(), clock);
        (store, accounts)
    }

    #[tokio::test]
    async fn registration_rejects_unknown_sponsor_code() {
        let (_store, accounts) = fixture();
        let err = accounts
            .register("Bob", "bob@example.com", Some("NOSUCH123"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound("sponsor", _)));
    }

    #[tokio::test]
    async fn registration_rejects_duplicate_email() {
        let (_store, accounts) = fixture();
        accounts.register("Alice", "a@example.com", None).await.unwrap();
        let err = accounts
            .register("Alice Again", "a@example.com", None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate(_)));
    }

    #[tokio::test]
    async fn sponsor_referral_count_is_bumped() {
        let (store, accounts) = fixture();
        let a = accounts.register("Alice", "a@example.com", None).await.unwrap();
        accounts
            .register("Bob", "b@example.com", Some(&a.referral_code))
            .await
            .unwrap();
        let a_after = store.user(&a.id).await.unwrap().unwrap();
        assert_eq!(a_after.total_referrals, 1);
    }

    #[tokio::test]
    async fn withdrawal_below_minimum_is_rejected() {
        let (_store, accounts) = fixture();
        let u = accounts.register("Alice", "a@example.com", None).await.unwrap();
        accounts
            .deposit(&u.id, money("500.00"), PAYMENT_METHOD_PIX)
            .await
            .unwrap();

        let err = accounts.withdraw(&u.id, money("50.00")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn withdrawal_beyond_balance_is_rejected_and_balance_unchanged() {
        let (store, accounts) = fixture();
        let u = accounts.register("Alice", "a@example.com", None).await.unwrap();
        accounts
            .deposit(&u.id, money("150.00"), PAYMENT_METHOD_PIX)
            .await
            .unwrap();

        let err = accounts.withdraw(&u.id, money("200.00")).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        let after = store.user(&u.id).await.unwrap().unwrap();
        assert_eq!(after.balance, money("150.00"));
    }

    #[tokio::test]
    async fn purchase_appends_to_portfolio_and_debits() {
        let (store, accounts) = fixture();
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        store
            .insert_plan(crate::models::plan::InvestmentPlan {
                id: new_id(),
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

        let u = accounts.register("Alice", "a@example.com", None).await.unwrap();
        accounts
            .deposit(&u.id, money("1500.00"), PAYMENT_METHOD_PIX)
            .await
            .unwrap();
        accounts.purchase_plan(&u.id, "BASIC").await.unwrap();

        let after = store.user(&u.id).await.unwrap().unwrap();
        assert_eq!(after.balance, money("500.00"));
        assert_eq!(after.total_invested, money("1000.00"));
        let portfolio = after.investments();
        assert_eq!(portfolio.len(), 1);
        assert_eq!(portfolio[0].plan_code, "BASIC");
        assert_eq!(portfolio[0].daily_return, money("3.33"));

        // A second purchase fails on funds, leaving the portfolio alone.
        let err = accounts.purchase_plan(&u.id, "BASIC").await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        let after = store.user(&u.id).await.unwrap().unwrap();
        assert_eq!(after.investments().len(), 1);
    }
}
