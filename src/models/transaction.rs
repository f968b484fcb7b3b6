use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::transactions;

pub const TX_STATUS_PENDING: &str = "pending";
pub const TX_STATUS_COMPLETED: &str = "completed";
pub const TX_STATUS_FAILED: &str = "failed";
pub const TX_STATUS_CANCELLED: &str = "cancelled";

pub const TX_TYPE_DEPOSIT: &str = "deposit";
pub const TX_TYPE_WITHDRAWAL: &str = "withdrawal";
pub const TX_TYPE_INVESTMENT: &str = "investment";
pub const TX_TYPE_INVESTMENT_RETURN: &str = "investment_return";
pub const TX_TYPE_REFERRAL_BONUS: &str = "referral_bonus";

pub const PAYMENT_METHOD_BALANCE: &str = "balance";
pub const PAYMENT_METHOD_PIX: &str = "pix";

/// The immutable ledger entry. A user's balance is always the sum of amount
/// over their completed transactions; everything else is derived state.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub tx_type: String,
    pub amount: BigDecimal,
    pub status: String,
    pub description: String,
    pub payment_method: String,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn is_completed(&self) -> bool {
        self.status == TX_STATUS_COMPLETED
    }

    pub fn is_completed_deposit(&self) -> bool {
        self.tx_type == TX_TYPE_DEPOSIT && self.is_completed()
    }
}

/// Types that count toward total_earnings when credited.
pub fn is_earnings_bearing(tx_type: &str) -> bool {
    matches!(tx_type, TX_TYPE_INVESTMENT_RETURN | TX_TYPE_REFERRAL_BONUS)
}
