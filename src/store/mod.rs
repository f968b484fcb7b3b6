pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::models::commission::Commission;
use crate::models::dividend::Dividend;
use crate::models::network_change::NetworkChange;
use crate::models::plan::{AutoPaymentConfig, InvestmentPlan, SystemConfig};
use crate::models::referral::Referral;
use crate::models::transaction::Transaction;
use crate::models::user::{ActiveInvestment, User, UserUpdate};

/// Persistence boundary for the ledger engines.
///
/// Reads are plain filters. Writes that span several rows, or that carry an
/// invariant (balance never negative, one commission per deposit edge, one
/// dividend per user per day, chains created whole), are exposed as composite
/// operations so each implementation can make them atomic: one database
/// transaction on Postgres, one mutex scope in memory.
#[async_trait]
pub trait Store: Send + Sync {
    // Users

    async fn insert_user(&self, user: User) -> Result<User>;
    async fn user(&self, id: &str) -> Result<Option<User>>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn user_by_referral_code(&self, code: &str) -> Result<Option<User>>;
    async fn users(&self) -> Result<Vec<User>>;
    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<User>;
    async fn increment_total_referrals(&self, id: &str, now: DateTime<Utc>) -> Result<()>;

    /// Reconciliation-only: overwrite a drifted balance with the recomputed
    /// sum. Every other balance change goes through the credit/debit/settle
    /// operations below.
    async fn overwrite_balance(
        &self,
        id: &str,
        balance: BigDecimal,
        now: DateTime<Utc>,
    ) -> Result<()>;

    // Referral graph

    /// The chain of ancestor edges above a user, ordered by level.
    async fn ancestry_of(&self, referred_id: &str) -> Result<Vec<Referral>>;
    /// Direct (any-level) edges where the given user is the beneficiary.
    async fn referrals_by(&self, referrer_id: &str) -> Result<Vec<Referral>>;
    async fn referrals(&self) -> Result<Vec<Referral>>;

    /// Insert a whole ancestry chain. All rows land or none do.
    async fn insert_referral_chain(&self, rows: Vec<Referral>) -> Result<Vec<Referral>>;

    /// Sponsor reassignment: delete the user's old chain, point referred_by
    /// at the new sponsor's code and insert the replacement chain, as one
    /// atomic unit so no concurrent reader sees a half-updated ancestry.
    async fn replace_referral_chain(
        &self,
        user_id: &str,
        new_sponsor_code: &str,
        rows: Vec<Referral>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Referral>>;

    // Transactions

    /// Append a ledger row without touching any balance (used for deposits
    /// arriving in non-completed states and for reconciliation backfills).
    async fn insert_transaction(&self, tx: Transaction) -> Result<Transaction>;
    async fn transaction(&self, id: &str) -> Result<Option<Transaction>>;
    async fn transactions_for(&self, user_id: &str) -> Result<Vec<Transaction>>;
    async fn transactions(&self) -> Result<Vec<Transaction>>;
    async fn completed_deposits(&self) -> Result<Vec<Transaction>>;

    /// Append a completed credit transaction and raise the user's balance
    /// (and total_earnings for earnings-bearing types) in one atomic step.
    async fn credit_user(&self, tx: Transaction) -> Result<Transaction>;

    /// Append a completed debit transaction (negative amount) and lower the
    /// balance, rejecting the write if it would go negative.
    async fn debit_user(&self, tx: Transaction) -> Result<Transaction>;

    /// Plan purchase: debit, append the investment to the portfolio and bump
    /// total_invested atomically.
    async fn apply_investment_purchase(
        &self,
        tx: Transaction,
        investment: ActiveInvestment,
    ) -> Result<Transaction>;

    // Commissions

    /// Insert-if-absent under the (transaction_id, referral_id) unique key.
    /// Returns None when the row already exists.
    async fn insert_commission_if_absent(&self, commission: Commission)
        -> Result<Option<Commission>>;
    async fn commission(&self, id: &str) -> Result<Option<Commission>>;
    async fn commissions(&self) -> Result<Vec<Commission>>;
    async fn commissions_for_transaction(&self, transaction_id: &str) -> Result<Vec<Commission>>;

    /// Atomic payout triple: move the commission pending -> paid, append the
    /// bonus transaction and credit the beneficiary. Returns None when the
    /// commission is no longer pending.
    async fn settle_commission(
        &self,
        commission_id: &str,
        tx: Transaction,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<(Commission, Transaction)>>;

    // Dividends

    /// Insert-if-absent under the (user_id, dividend_date) unique key.
    async fn insert_dividend_if_absent(&self, dividend: Dividend) -> Result<Option<Dividend>>;
    async fn dividend(&self, id: &str) -> Result<Option<Dividend>>;
    async fn dividends(&self) -> Result<Vec<Dividend>>;
    async fn pending_dividends_on(&self, date: NaiveDate) -> Result<Vec<Dividend>>;

    /// Atomic payout triple for dividends; also records the payment method
    /// and the settling transaction id on the dividend row.
    async fn settle_dividend(
        &self,
        dividend_id: &str,
        method: &str,
        tx: Transaction,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<(Dividend, Transaction)>>;

    // Plans and configuration

    async fn insert_plan(&self, plan: InvestmentPlan) -> Result<InvestmentPlan>;
    async fn plans(&self) -> Result<Vec<InvestmentPlan>>;
    async fn plan_by_code(&self, code: &str) -> Result<Option<InvestmentPlan>>;
    async fn system_config(&self, key: &str) -> Result<Option<SystemConfig>>;
    async fn auto_payment_config(&self) -> Result<Option<AutoPaymentConfig>>;
    async fn upsert_auto_payment_config(
        &self,
        config: AutoPaymentConfig,
    ) -> Result<AutoPaymentConfig>;

    // Audit

    async fn insert_network_change(&self, change: NetworkChange) -> Result<NetworkChange>;
    async fn network_changes(&self) -> Result<Vec<NetworkChange>>;
}
