use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use std::sync::Arc;

use crate::db::{Database, DbConnection};
use crate::error::{LedgerError, Result};
use crate::models::commission::{Commission, PAYOUT_STATUS_PAID, PAYOUT_STATUS_PENDING};
use crate::models::dividend::Dividend;
use crate::models::network_change::NetworkChange;
use crate::models::plan::{AutoPaymentConfig, InvestmentPlan, SystemConfig};
use crate::models::referral::Referral;
use crate::models::transaction::{
    is_earnings_bearing, Transaction, TX_STATUS_COMPLETED, TX_TYPE_DEPOSIT,
};
use crate::models::user::{investments_to_json, ActiveInvestment, User, UserUpdate};
use crate::schema;
use crate::store::Store;

/// Postgres-backed store. Composite writes run inside a database
/// transaction; the balance read-modify-write locks the user row so
/// concurrent payouts to the same user serialize instead of losing updates.
/// The idempotence guards are the unique constraints, not check-then-insert.
pub struct PgStore {
    db: Arc<Database>,
}

impl PgStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn conn(&self) -> Result<DbConnection> {
        self.db
            .get_connection()
            .await
            .map_err(|e| LedgerError::Store(format!("failed to get database connection: {}", e)))
    }
}

/// Lock a user row for the rest of the enclosing transaction.
async fn lock_user(conn: &mut AsyncPgConnection, user_id: &str) -> Result<User> {
    schema::users::table
        .find(user_id)
        .for_update()
        .first::<User>(conn)
        .await
        .optional()?
        .ok_or_else(|| LedgerError::NotFound("user", user_id.to_string()))
}

/// Insert a completed transaction and apply its amount to the locked user's
/// balance (and total_earnings when the type is earnings-bearing).
async fn apply_credit(
    conn: &mut AsyncPgConnection,
    user: &User,
    tx: &Transaction,
) -> Result<Transaction> {
    let inserted: Transaction = diesel::insert_into(schema::transactions::table)
        .values(tx)
        .get_result(conn)
        .await?;

    let new_balance = &user.balance + &tx.amount;
    let new_earnings = if is_earnings_bearing(&tx.tx_type) {
        &user.total_earnings + &tx.amount
    } else {
        user.total_earnings.clone()
    };

    diesel::update(schema::users::table.find(&user.id))
        .set((
            schema::users::balance.eq(new_balance),
            schema::users::total_earnings.eq(new_earnings),
            schema::users::updated_at.eq(tx.created_at),
        ))
        .execute(conn)
        .await?;

    Ok(inserted)
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, user: User) -> Result<User> {
        let mut conn = self.conn().await?;
        let row = diesel::insert_into(schema::users::table)
            .values(&user)
            .get_result::<User>(&mut conn)
            .await?;
        Ok(row)
    }

    async fn user(&self, id: &str) -> Result<Option<User>> {
        let mut conn = self.conn().await?;
        Ok(schema::users::table
            .find(id)
            .first::<User>(&mut conn)
            .await
            .optional()?)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let mut conn = self.conn().await?;
        Ok(schema::users::table
            .filter(schema::users::email.eq(email))
            .first::<User>(&mut conn)
            .await
            .optional()?)
    }

    async fn user_by_referral_code(&self, code: &str) -> Result<Option<User>> {
        let mut conn = self.conn().await?;
        Ok(schema::users::table
            .filter(schema::users::referral_code.eq(code))
            .first::<User>(&mut conn)
            .await
            .optional()?)
    }

    async fn users(&self) -> Result<Vec<User>> {
        let mut conn = self.conn().await?;
        Ok(schema::users::table
            .order(schema::users::created_at.asc())
            .load::<User>(&mut conn)
            .await?)
    }

    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<User> {
        let mut conn = self.conn().await?;
        let row = diesel::update(schema::users::table.find(id))
            .set(&update)
            .get_result::<User>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| LedgerError::NotFound("user", id.to_string()))?;
        Ok(row)
    }

    async fn increment_total_referrals(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(schema::users::table.find(id))
            .set((
                schema::users::total_referrals.eq(schema::users::total_referrals + 1),
                schema::users::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await?;
        if updated == 0 {
            return Err(LedgerError::NotFound("user", id.to_string()));
        }
        Ok(())
    }

    async fn overwrite_balance(
        &self,
        id: &str,
        balance: BigDecimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(schema::users::table.find(id))
            .set((
                schema::users::balance.eq(balance),
                schema::users::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await?;
        if updated == 0 {
            return Err(LedgerError::NotFound("user", id.to_string()));
        }
        Ok(())
    }

    async fn ancestry_of(&self, referred_id: &str) -> Result<Vec<Referral>> {
        let mut conn = self.conn().await?;
        Ok(schema::referrals::table
            .filter(schema::referrals::referred_id.eq(referred_id))
            .order(schema::referrals::level.asc())
            .load::<Referral>(&mut conn)
            .await?)
    }

    async fn referrals_by(&self, referrer_id: &str) -> Result<Vec<Referral>> {
        let mut conn = self.conn().await?;
        Ok(schema::referrals::table
            .filter(schema::referrals::referrer_id.eq(referrer_id))
            .load::<Referral>(&mut conn)
            .await?)
    }

    async fn referrals(&self) -> Result<Vec<Referral>> {
        let mut conn = self.conn().await?;
        Ok(schema::referrals::table.load::<Referral>(&mut conn).await?)
    }

    async fn insert_referral_chain(&self, rows: Vec<Referral>) -> Result<Vec<Referral>> {
        let mut conn = self.conn().await?;
        let inserted = conn
            .build_transaction()
            .run(|conn| {
                async move {
                    let inserted: Vec<Referral> = diesel::insert_into(schema::referrals::table)
                        .values(&rows)
                        .get_results(conn)
                        .await?;
                    Ok::<_, LedgerError>(inserted)
                }
                .scope_boxed()
            })
            .await?;
        Ok(inserted)
    }

    async fn replace_referral_chain(
        &self,
        user_id: &str,
        new_sponsor_code: &str,
        rows: Vec<Referral>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Referral>> {
        let mut conn = self.conn().await?;
        let user_id = user_id.to_string();
        let new_sponsor_code = new_sponsor_code.to_string();
        let inserted = conn
            .build_transaction()
            .run(|conn| {
                async move {
                    // Exclusive lock on the user row keeps a concurrent
                    // commission sweep from reading a half-replaced chain.
                    let _user = lock_user(conn, &user_id).await?;

                    diesel::delete(
                        schema::referrals::table
                            .filter(schema::referrals::referred_id.eq(&user_id)),
                    )
                    .execute(conn)
                    .await?;

                    diesel::update(schema::users::table.find(&user_id))
                        .set((
                            schema::users::referred_by.eq(Some(new_sponsor_code.clone())),
                            schema::users::updated_at.eq(now),
                        ))
                        .execute(conn)
                        .await?;

                    let inserted: Vec<Referral> = diesel::insert_into(schema::referrals::table)
                        .values(&rows)
                        .get_results(conn)
                        .await?;
                    Ok::<_, LedgerError>(inserted)
                }
                .scope_boxed()
            })
            .await?;
        Ok(inserted)
    }

    async fn insert_transaction(&self, tx: Transaction) -> Result<Transaction> {
        let mut conn = self.conn().await?;
        let row = diesel::insert_into(schema::transactions::table)
            .values(&tx)
            .get_result::<Transaction>(&mut conn)
            .await?;
        Ok(row)
    }

    async fn transaction(&self, id: &str) -> Result<Option<Transaction>> {
        let mut conn = self.conn().await?;
        Ok(schema::transactions::table
            .find(id)
            .first::<Transaction>(&mut conn)
            .await
            .optional()?)
    }

    async fn transactions_for(&self, user_id: &str) -> Result<Vec<Transaction>> {
        let mut conn = self.conn().await?;
        Ok(schema::transactions::table
            .filter(schema::transactions::user_id.eq(user_id))
            .order(schema::transactions::created_at.desc())
            .load::<Transaction>(&mut conn)
            .await?)
    }

    async fn transactions(&self) -> Result<Vec<Transaction>> {
        let mut conn = self.conn().await?;
        Ok(schema::transactions::table
            .order(schema::transactions::created_at.desc())
            .load::<Transaction>(&mut conn)
            .await?)
    }

    async fn completed_deposits(&self) -> Result<Vec<Transaction>> {
        let mut conn = self.conn().await?;
        Ok(schema::transactions::table
            .filter(schema::transactions::tx_type.eq(TX_TYPE_DEPOSIT))
            .filter(schema::transactions::status.eq(TX_STATUS_COMPLETED))
            .order(schema::transactions::created_at.asc())
            .load::<Transaction>(&mut conn)
            .await?)
    }

    async fn credit_user(&self, tx: Transaction) -> Result<Transaction> {
        let mut conn = self.conn().await?;
        let row = conn
            .build_transaction()
            .run(|conn| {
                async move {
                    let user = lock_user(conn, &tx.user_id).await?;
                    apply_credit(conn, &user, &tx).await
                }
                .scope_boxed()
            })
            .await?;
        Ok(row)
    }

    async fn debit_user(&self, tx: Transaction) -> Result<Transaction> {
        let mut conn = self.conn().await?;
        let row = conn
            .build_transaction()
            .run(|conn| {
                async move {
                    let user = lock_user(conn, &tx.user_id).await?;
                    let resulting = &user.balance + &tx.amount;
                    if resulting < BigDecimal::from(0) {
                        return Err(LedgerError::InsufficientFunds {
                            available: user.balance.clone(),
                            requested: -tx.amount.clone(),
                        });
                    }

                    let inserted: Transaction =
                        diesel::insert_into(schema::transactions::table)
                            .values(&tx)
                            .get_result(conn)
                            .await?;

                    diesel::update(schema::users::table.find(&user.id))
                        .set((
                            schema::users::balance.eq(resulting),
                            schema::users::updated_at.eq(tx.created_at),
                        ))
                        .execute(conn)
                        .await?;

                    Ok::<_, LedgerError>(inserted)
                }
                .scope_boxed()
            })
            .await?;
        Ok(row)
    }

    async fn apply_investment_purchase(
        &self,
        tx: Transaction,
        investment: ActiveInvestment,
    ) -> Result<Transaction> {
        let mut conn = self.conn().await?;
        let row = conn
            .build_transaction()
            .run(|conn| {
                async move {
                    let user = lock_user(conn, &tx.user_id).await?;
                    let resulting = &user.balance + &tx.amount;
                    if resulting < BigDecimal::from(0) {
                        return Err(LedgerError::InsufficientFunds {
                            available: user.balance.clone(),
                            requested: -tx.amount.clone(),
                        });
                    }

                    let inserted: Transaction =
                        diesel::insert_into(schema::transactions::table)
                            .values(&tx)
                            .get_result(conn)
                            .await?;

                    let mut portfolio = user.investments();
                    let invested = &user.total_invested + &investment.amount;
                    portfolio.push(investment);

                    diesel::update(schema::users::table.find(&user.id))
                        .set((
                            schema::users::balance.eq(resulting),
                            schema::users::total_invested.eq(invested),
                            schema::users::active_investments
                                .eq(investments_to_json(&portfolio)),
                            schema::users::updated_at.eq(tx.created_at),
                        ))
                        .execute(conn)
                        .await?;

                    Ok::<_, LedgerError>(inserted)
                }
                .scope_boxed()
            })
            .await?;
        Ok(row)
    }

    async fn insert_commission_if_absent(
        &self,
        commission: Commission,
    ) -> Result<Option<Commission>> {
        let mut conn = self.conn().await?;
        let inserted = diesel::insert_into(schema::commissions::table)
            .values(&commission)
            .on_conflict((
                schema::commissions::transaction_id,
                schema::commissions::referral_id,
            ))
            .do_nothing()
            .execute(&mut conn)
            .await?;
        if inserted == 0 {
            Ok(None)
        } else {
            Ok(Some(commission))
        }
    }

    async fn commission(&self, id: &str) -> Result<Option<Commission>> {
        let mut conn = self.conn().await?;
        Ok(schema::commissions::table
            .find(id)
            .first::<Commission>(&mut conn)
            .await
            .optional()?)
    }

    async fn commissions(&self) -> Result<Vec<Commission>> {
        let mut conn = self.conn().await?;
        Ok(schema::commissions::table
            .order(schema::commissions::created_at.desc())
            .load::<Commission>(&mut conn)
            .await?)
    }

    async fn commissions_for_transaction(&self, transaction_id: &str) -> Result<Vec<Commission>> {
        let mut conn = self.conn().await?;
        Ok(schema::commissions::table
            .filter(schema::commissions::transaction_id.eq(transaction_id))
            .load::<Commission>(&mut conn)
            .await?)
    }

    async fn settle_commission(
        &self,
        commission_id: &str,
        tx: Transaction,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<(Commission, Transaction)>> {
        let mut conn = self.conn().await?;
        let commission_id = commission_id.to_string();
        let settled = conn
            .build_transaction()
            .run(|conn| {
                async move {
                    let commission: Commission = schema::commissions::table
                        .find(&commission_id)
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| {
                            LedgerError::NotFound("commission", commission_id.clone())
                        })?;

                    if commission.status != PAYOUT_STATUS_PENDING {
                        return Ok::<_, LedgerError>(None);
                    }

                    let updated: Commission =
                        diesel::update(schema::commissions::table.find(&commission.id))
                            .set((
                                schema::commissions::status.eq(PAYOUT_STATUS_PAID),
                                schema::commissions::paid_date.eq(Some(paid_at)),
                            ))
                            .get_result(conn)
                            .await?;

                    let user = lock_user(conn, &commission.user_id).await?;
                    let inserted = apply_credit(conn, &user, &tx).await?;

                    Ok(Some((updated, inserted)))
                }
                .scope_boxed()
            })
            .await?;
        Ok(settled)
    }

    async fn insert_dividend_if_absent(&self, dividend: Dividend) -> Result<Option<Dividend>> {
        let mut conn = self.conn().await?;
        let inserted = diesel::insert_into(schema::dividends::table)
            .values(&dividend)
            .on_conflict((schema::dividends::user_id, schema::dividends::dividend_date))
            .do_nothing()
            .execute(&mut conn)
            .await?;
        if inserted == 0 {
            Ok(None)
        } else {
            Ok(Some(dividend))
        }
    }

    async fn dividend(&self, id: &str) -> Result<Option<Dividend>> {
        let mut conn = self.conn().await?;
        Ok(schema::dividends::table
            .find(id)
            .first::<Dividend>(&mut conn)
            .await
            .optional()?)
    }

    async fn dividends(&self) -> Result<Vec<Dividend>> {
        let mut conn = self.conn().await?;
        Ok(schema::dividends::table
            .order(schema::dividends::created_at.desc())
            .load::<Dividend>(&mut conn)
            .await?)
    }

    async fn pending_dividends_on(&self, date: NaiveDate) -> Result<Vec<Dividend>> {
        let mut conn = self.conn().await?;
        Ok(schema::dividends::table
            .filter(schema::dividends::status.eq(PAYOUT_STATUS_PENDING))
            .filter(schema::dividends::dividend_date.eq(date))
            .load::<Dividend>(&mut conn)
            .await?)
    }

    async fn settle_dividend(
        &self,
        dividend_id: &str,
        method: &str,
        tx: Transaction,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<(Dividend, Transaction)>> {
        let mut conn = self.conn().await?;
        let dividend_id = dividend_id.to_string();
        let method = method.to_string();
        let settled = conn
            .build_transaction()
            .run(|conn| {
                async move {
                    let dividend: Dividend = schema::dividends::table
                        .find(&dividend_id)
                        .for_update()
                        .first(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| LedgerError::NotFound("dividend", dividend_id.clone()))?;

                    if dividend.status != PAYOUT_STATUS_PENDING {
                        return Ok::<_, LedgerError>(None);
                    }

                    let updated: Dividend =
                        diesel::update(schema::dividends::table.find(&dividend.id))
                            .set((
                                schema::dividends::status.eq(PAYOUT_STATUS_PAID),
                                schema::dividends::paid_date.eq(Some(paid_at)),
                                schema::dividends::payment_method.eq(Some(method.clone())),
                                schema::dividends::transaction_id.eq(Some(tx.id.clone())),
                            ))
                            .get_result(conn)
                            .await?;

                    let user = lock_user(conn, &dividend.user_id).await?;
                    let inserted = apply_credit(conn, &user, &tx).await?;

                    Ok(Some((updated, inserted)))
                }
                .scope_boxed()
            })
            .await?;
        Ok(settled)
    }

    async fn insert_plan(&self, plan: InvestmentPlan) -> Result<InvestmentPlan> {
        let mut conn = self.conn().await?;
        let row = diesel::insert_into(schema::investment_plans::table)
            .values(&plan)
            .get_result::<InvestmentPlan>(&mut conn)
            .await?;
        Ok(row)
    }

    async fn plans(&self) -> Result<Vec<InvestmentPlan>> {
        let mut conn = self.conn().await?;
        Ok(schema::investment_plans::table
            .load::<InvestmentPlan>(&mut conn)
            .await?)
    }

    async fn plan_by_code(&self, code: &str) -> Result<Option<InvestmentPlan>> {
        let mut conn = self.conn().await?;
        Ok(schema::investment_plans::table
            .filter(schema::investment_plans::code.eq(code))
            .first::<InvestmentPlan>(&mut conn)
            .await
            .optional()?)
    }

    async fn system_config(&self, key: &str) -> Result<Option<SystemConfig>> {
        let mut conn = self.conn().await?;
        Ok(schema::system_configs::table
            .filter(schema::system_configs::key.eq(key))
            .first::<SystemConfig>(&mut conn)
            .await
            .optional()?)
    }

    async fn auto_payment_config(&self) -> Result<Option<AutoPaymentConfig>> {
        let mut conn = self.conn().await?;
        Ok(schema::auto_payment_configs::table
            .first::<AutoPaymentConfig>(&mut conn)
            .await
            .optional()?)
    }

    async fn upsert_auto_payment_config(
        &self,
        config: AutoPaymentConfig,
    ) -> Result<AutoPaymentConfig> {
        let mut conn = self.conn().await?;
        let row = diesel::insert_into(schema::auto_payment_configs::table)
            .values(&config)
            .on_conflict(schema::auto_payment_configs::id)
            .do_update()
            .set(&config)
            .get_result::<AutoPaymentConfig>(&mut conn)
            .await?;
        Ok(row)
    }

    async fn insert_network_change(&self, change: NetworkChange) -> Result<NetworkChange> {
        let mut conn = self.conn().await?;
        let row = diesel::insert_into(schema::network_changes::table)
            .values(&change)
            .get_result::<NetworkChange>(&mut conn)
            .await?;
        Ok(row)
    }

    async fn network_changes(&self) -> Result<Vec<NetworkChange>> {
        let mut conn = self.conn().await?;
        Ok(schema::network_changes::table
            .order(schema::network_changes::created_at.desc())
            .load::<NetworkChange>(&mut conn)
            .await?)
    }
}
