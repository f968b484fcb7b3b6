use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::commissions;

pub const PAYOUT_STATUS_PENDING: &str = "pending";
pub const PAYOUT_STATUS_PAID: &str = "paid";
pub const PAYOUT_STATUS_CANCELLED: &str = "cancelled";

/// A payable credit owed to an ancestor for one downline deposit. The
/// (transaction_id, referral_id) pair is unique so generation sweeps can
/// re-run without duplicating rows. commission_amount never changes after
/// creation; status only moves pending -> paid or pending -> cancelled.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = commissions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Commission {
    pub id: String,
    pub user_id: String,
    pub referral_id: String,
    pub source_user_id: String,
    pub transaction_id: String,
    pub level: i32,
    pub rate: i32,
    pub base_amount: BigDecimal,
    pub commission_amount: BigDecimal,
    pub status: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
}

impl Commission {
    pub fn is_pending(&self) -> bool {
        self.status == PAYOUT_STATUS_PENDING
    }
}
