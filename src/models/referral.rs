// Copyright (c) BYD Profit Team
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::referrals;

pub const REFERRAL_STATUS_ACTIVE: &str = "active";
pub const REFERRAL_STATUS_PENDING: &str = "pending";
pub const REFERRAL_STATUS_INACTIVE: &str = "inactive";

/// Commission rates per ancestry level. Level 1 is the direct sponsor.
pub const LEVEL_RATES: [(i32, i32); 3] = [(1, 17), (2, 2), (3, 1)];

/// One hop of ancestry for a downline user. A fully resolvable ancestry
/// yields three rows per user with contiguous levels starting at 1 and
/// parent_id links forming a single chain back to null.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = referrals)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Referral {
    pub id: String,
    pub referrer_id: String,
    pub referred_id: String,
    pub referred_name: String,
    pub referred_email: String,
    pub level: i32,
    pub commission_rate: i32,
    pub status: String,
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
