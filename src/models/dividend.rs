use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::dividends;

pub const DIVIDEND_METHOD_AUTOMATIC: &str = "automatic";
pub const DIVIDEND_METHOD_MANUAL: &str = "manual";

/// One day's yield for one active investment. (user_id, dividend_date) is
/// unique: a user earns at most one dividend row per calendar day no matter
/// how often generation runs.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = dividends)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Dividend {
    pub id: String,
    pub user_id: String,
    pub investment_plan_id: String,
    pub plan_name: String,
    pub investment_amount: BigDecimal,
    pub dividend_amount: BigDecimal,
    pub dividend_date: NaiveDate,
    pub status: String,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
}

impl Dividend {
    pub fn is_pending(&self) -> bool {
        self.status == super::commission::PAYOUT_STATUS_PENDING
    }
}
