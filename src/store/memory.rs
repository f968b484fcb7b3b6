use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;

use crate::error::{LedgerError, Result};
use crate::models::commission::{Commission, PAYOUT_STATUS_PAID};
use crate::models::dividend::Dividend;
use crate::models::network_change::NetworkChange;
use crate::models::new_id;
use crate::models::plan::{
    AutoPaymentConfig, InvestmentPlan, SystemConfig, CONFIG_MIN_WITHDRAWAL, CONFIG_WITHDRAWAL_FEE,
};
use crate::models::referral::Referral;
use crate::models::transaction::{
    is_earnings_bearing, Transaction, TX_STATUS_COMPLETED, TX_TYPE_DEPOSIT,
};
use crate::models::user::{investments_to_json, ActiveInvestment, User, UserUpdate};
use crate::store::Store;

#[derive(Default)]
struct State {
    users: Vec<User>,
    referrals: Vec<Referral>,
    transactions: Vec<Transaction>,
    commissions: Vec<Commission>,
    dividends: Vec<Dividend>,
    plans: Vec<InvestmentPlan>,
    system_configs: Vec<SystemConfig>,
    auto_payment_configs: Vec<AutoPaymentConfig>,
    network_changes: Vec<NetworkChange>,
}

/// In-memory store. One mutex over the whole state serializes every
/// composite write, which is exactly the concurrency model of the mock
/// persistence layer this replaces. Used by tests and local tooling.
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let now = Utc::now();
        let seed = |key: &str, value: &str, description: &str| SystemConfig {
            id: new_id(),
            key: key.to_string(),
            value: value.to_string(),
            description: description.to_string(),
            created_at: now,
            updated_at: now,
        };

        let state = State {
            system_configs: vec![
                seed(CONFIG_MIN_WITHDRAWAL, "100", "Minimum withdrawal amount"),
                seed(CONFIG_WITHDRAWAL_FEE, "0.02", "Withdrawal fee rate"),
            ],
            ..State::default()
        };

        Self { state: Mutex::new(state) }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn credit_in_place(user: &mut User, tx: &Transaction) {
    user.balance = &user.balance + &tx.amount;
    if is_earnings_bearing(&tx.tx_type) {
        user.total_earnings = &user.total_earnings + &tx.amount;
    }
    user.updated_at = tx.created_at;
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<User> {
        let mut state = self.state.lock().await;
        if state.users.iter().any(|u| u.email == user.email) {
            return Err(LedgerError::Duplicate(format!("email {}", user.email)));
        }
        if state.users.iter().any(|u| u.referral_code == user.referral_code) {
            return Err(LedgerError::Duplicate(format!(
                "referral code {}",
                user.referral_code
            )));
        }
        state.users.push(user.clone());
        Ok(user)
    }

    async fn user(&self, id: &str) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn user_by_referral_code(&self, code: &str) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.iter().find(|u| u.referral_code == code).cloned())
    }

    async fn users(&self) -> Result<Vec<User>> {
        let state = self.state.lock().await;
        Ok(state.users.clone())
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<User> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| LedgerError::NotFound("user", id.to_string()))?;
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        if let Some(updated_at) = update.updated_at {
            user.updated_at = updated_at;
        }
        Ok(user.clone())
    }

    async fn increment_total_referrals(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| LedgerError::NotFound("user", id.to_string()))?;
        user.total_referrals += 1;
        user.updated_at = now;
        Ok(())
    }

    async fn overwrite_balance(
        &self,
        id: &str,
        balance: BigDecimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| LedgerError::NotFound("user", id.to_string()))?;
        user.balance = balance;
        user.updated_at = now;
        Ok(())
    }

    async fn ancestry_of(&self, referred_id: &str) -> Result<Vec<Referral>> {
        let state = self.state.lock().await;
        let mut chain: Vec<Referral> = state
            .referrals
            .iter()
            .filter(|r| r.referred_id == referred_id)
            .cloned()
            .collect();
        chain.sort_by_key(|r| r.level);
        Ok(chain)
    }

    async fn referrals_by(&self, referrer_id: &str) -> Result<Vec<Referral>> {
        let state = self.state.lock().await;
        Ok(state
            .referrals
            .iter()
            .filter(|r| r.referrer_id == referrer_id)
            .cloned()
            .collect())
    }

    async fn referrals(&self) -> Result<Vec<Referral>> {
        let state = self.state.lock().await;
        Ok(state.referrals.clone())
    }

    async fn insert_referral_chain(&self, rows: Vec<Referral>) -> Result<Vec<Referral>> {
        let mut state = self.state.lock().await;
        for row in &rows {
            if state
                .referrals
                .iter()
                .any(|r| r.referred_id == row.referred_id && r.level == row.level)
            {
                return Err(LedgerError::Duplicate(format!(
                    "referral level {} for user {}",
                    row.level, row.referred_id
                )));
            }
        }
        state.referrals.extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn replace_referral_chain(
        &self,
        user_id: &str,
        new_sponsor_code: &str,
        rows: Vec<Referral>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Referral>> {
        let mut state = self.state.lock().await;
        let user_idx = state
            .users
            .iter()
            .position(|u| u.id == user_id)
            .ok_or_else(|| LedgerError::NotFound("user", user_id.to_string()))?;
        state.referrals.retain(|r| r.referred_id != user_id);
        state.referrals.extend(rows.iter().cloned());
        let user = &mut state.users[user_idx];
        user.referred_by = Some(new_sponsor_code.to_string());
        user.updated_at = now;
        Ok(rows)
    }

    async fn insert_transaction(&self, tx: Transaction) -> Result<Transaction> {
        let mut state = self.state.lock().await;
        state.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn transaction(&self, id: &str) -> Result<Option<Transaction>> {
        let state = self.state.lock().await;
        Ok(state.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn transactions_for(&self, user_id: &str) -> Result<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn transactions(&self) -> Result<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state.transactions.clone())
    }

    async fn completed_deposits(&self) -> Result<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.tx_type == TX_TYPE_DEPOSIT && t.status == TX_STATUS_COMPLETED)
            .cloned()
            .collect())
    }

    async fn credit_user(&self, tx: Transaction) -> Result<Transaction> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == tx.user_id)
            .ok_or_else(|| LedgerError::NotFound("user", tx.user_id.clone()))?;
        credit_in_place(user, &tx);
        state.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn debit_user(&self, tx: Transaction) -> Result<Transaction> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == tx.user_id)
            .ok_or_else(|| LedgerError::NotFound("user", tx.user_id.clone()))?;
        let resulting = &user.balance + &tx.amount;
        if resulting < BigDecimal::from(0) {
            return Err(LedgerError::InsufficientFunds {
                available: user.balance.clone(),
                requested: -tx.amount.clone(),
            });
        }
        user.balance = resulting;
        user.updated_at = tx.created_at;
        state.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn apply_investment_purchase(
        &self,
        tx: Transaction,
        investment: ActiveInvestment,
    ) -> Result<Transaction> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == tx.user_id)
            .ok_or_else(|| LedgerError::NotFound("user", tx.user_id.clone()))?;
        let resulting = &user.balance + &tx.amount;
        if resulting < BigDecimal::from(0) {
            return Err(LedgerError::InsufficientFunds {
                available: user.balance.clone(),
                requested: -tx.amount.clone(),
            });
        }
        user.balance = resulting;
        user.total_invested = &user.total_invested + &investment.amount;
        let mut portfolio = user.investments();
        portfolio.push(investment);
        user.active_investments = investments_to_json(&portfolio);
        user.updated_at = tx.created_at;
        state.transactions.push(tx.clone());
        Ok(tx)
    }

    async fn insert_commission_if_absent(
        &self,
        commission: Commission,
    ) -> Result<Option<Commission>> {
        let mut state = self.state.lock().await;
        let exists = state.commissions.iter().any(|c| {
            c.transaction_id == commission.transaction_id && c.referral_id == commission.referral_id
        });
        if exists {
            return Ok(None);
        }
        state.commissions.push(commission.clone());
        Ok(Some(commission))
    }

    async fn commission(&self, id: &str) -> Result<Option<Commission>> {
        let state = self.state.lock().await;
        Ok(state.commissions.iter().find(|c| c.id == id).cloned())
    }

    async fn commissions(&self) -> Result<Vec<Commission>> {
        let state = self.state.lock().await;
        Ok(state.commissions.clone())
    }

    async fn commissions_for_transaction(&self, transaction_id: &str) -> Result<Vec<Commission>> {
        let state = self.state.lock().await;
        Ok(state
            .commissions
            .iter()
            .filter(|c| c.transaction_id == transaction_id)
            .cloned()
            .collect())
    }

    async fn settle_commission(
        &self,
        commission_id: &str,
        tx: Transaction,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<(Commission, Transaction)>> {
        let mut state = self.state.lock().await;
        let state = &mut *state;
        let commission = match state.commissions.iter_mut().find(|c| c.id == commission_id) {
            Some(c) => c,
            None => return Err(LedgerError::NotFound("commission", commission_id.to_string())),
        };
        if !commission.is_pending() {
            return Ok(None);
        }
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == commission.user_id)
            .ok_or_else(|| LedgerError::NotFound("user", commission.user_id.clone()))?;
        commission.status = PAYOUT_STATUS_PAID.to_string();
        commission.paid_date = Some(paid_at);
        credit_in_place(user, &tx);
        state.transactions.push(tx.clone());
        Ok(Some((commission.clone(), tx)))
    }

    async fn insert_dividend_if_absent(&self, dividend: Dividend) -> Result<Option<Dividend>> {
        let mut state = self.state.lock().await;
        let exists = state
            .dividends
            .iter()
            .any(|d| d.user_id == dividend.user_id && d.dividend_date == dividend.dividend_date);
        if exists {
            return Ok(None);
        }
        state.dividends.push(dividend.clone());
        Ok(Some(dividend))
    }

    async fn dividend(&self, id: &str) -> Result<Option<Dividend>> {
        let state = self.state.lock().await;
        Ok(state.dividends.iter().find(|d| d.id == id).cloned())
    }

    async fn dividends(&self) -> Result<Vec<Dividend>> {
        let state = self.state.lock().await;
        Ok(state.dividends.clone())
    }

    async fn pending_dividends_on(&self, date: NaiveDate) -> Result<Vec<Dividend>> {
        let state = self.state.lock().await;
        Ok(state
            .dividends
            .iter()
            .filter(|d| d.is_pending() && d.dividend_date == date)
            .cloned()
            .collect())
    }

    async fn settle_dividend(
        &self,
        dividend_id: &str,
        method: &str,
        tx: Transaction,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<(Dividend, Transaction)>> {
        let mut state = self.state.lock().await;
        let state = &mut *state;
        let dividend = match state.dividends.iter_mut().find(|d| d.id == dividend_id) {
            Some(d) => d,
            None => return Err(LedgerError::NotFound("dividend", dividend_id.to_string())),
        };
        if !dividend.is_pending() {
            return Ok(None);
        }
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == dividend.user_id)
            .ok_or_else(|| LedgerError::NotFound("user", dividend.user_id.clone()))?;
        dividend.status = PAYOUT_STATUS_PAID.to_string();
        dividend.paid_date = Some(paid_at);
        dividend.payment_method = Some(method.to_string());
        dividend.transaction_id = Some(tx.id.clone());
        credit_in_place(user, &tx);
        state.transactions.push(tx.clone());
        Ok(Some((dividend.clone(), tx)))
    }

    async fn insert_plan(&self, plan: InvestmentPlan) -> Result<InvestmentPlan> {
        let mut state = self.state.lock().await;
        if state.plans.iter().any(|p| p.code == plan.code) {
            return Err(LedgerError::Duplicate(format!("plan code {}", plan.code)));
        }
        state.plans.push(plan.clone());
        Ok(plan)
    }

    async fn plans(&self) -> Result<Vec<InvestmentPlan>> {
        let state = self.state.lock().await;
        Ok(state.plans.clone())
    }

    async fn plan_by_code(&self, code: &str) -> Result<Option<InvestmentPlan>> {
        let state = self.state.lock().await;
        Ok(state.plans.iter().find(|p| p.code == code).cloned())
    }

    async fn system_config(&self, key: &str) -> Result<Option<SystemConfig>> {
        let state = self.state.lock().await;
        Ok(state.system_configs.iter().find(|c| c.key == key).cloned())
    }

    async fn auto_payment_config(&self) -> Result<Option<AutoPaymentConfig>> {
        let state = self.state.lock().await;
        Ok(state.auto_payment_configs.first().cloned())
    }

    async fn upsert_auto_payment_config(
        &self,
        config: AutoPaymentConfig,
    ) -> Result<AutoPaymentConfig> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .auto_payment_configs
            .iter_mut()
            .find(|c| c.id == config.id)
        {
            *existing = config.clone();
        } else {
            state.auto_payment_configs.push(config.clone());
        }
        Ok(config)
    }

    async fn insert_network_change(&self, change: NetworkChange) -> Result<NetworkChange> {
        let mut state = self.state.lock().await;
        state.network_changes.push(change.clone());
        Ok(change)
    }

    async fn network_changes(&self) -> Result<Vec<NetworkChange>> {
        let state = self.state.lock().await;
        Ok(state.network_changes.clone())
    }
}
