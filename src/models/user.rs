// Copyright (c) BYD Profit Team
// SPDX-License-Identifier: Apache-2.0

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::users;

pub const ROLE_USER: &str = "user";
pub const ROLE_ADMIN: &str = "admin";

/// One entry of a user's active investment portfolio. Persisted as a JSONB
/// array on the user row, ordered by purchase time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveInvestment {
    pub plan_code: String,
    pub amount: BigDecimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub daily_return: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub balance: BigDecimal,
    pub total_earnings: BigDecimal,
    pub total_invested: BigDecimal,
    pub active_investments: serde_json::Value,
    pub referral_code: String,
    pub referred_by: Option<String>,
    pub total_referrals: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }

    /// Decode the JSONB portfolio. Entries that fail to decode are dropped
    /// rather than poisoning the whole list.
    pub fn investments(&self) -> Vec<ActiveInvestment> {
        match &self.active_investments {
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn has_active_investments(&self) -> bool {
        matches!(&self.active_investments, serde_json::Value::Array(items) if !items.is_empty())
    }
}

pub fn investments_to_json(investments: &[ActiveInvestment]) -> serde_json::Value {
    serde_json::to_value(investments).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
}

/// Profile-level fields an admin or the owner may change. Balance and the
/// earnings counters are deliberately absent: those move only through the
/// payout and reconciliation paths.
#[derive(Debug, Default, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = users)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// The identity the caller acts as. Resolved by the API layer; the engines
/// only ever check the role.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub role: String,
}

impl Actor {
    pub fn admin(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: ROLE_ADMIN.to_string() }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self { id: id.into(), role: ROLE_USER.to_string() }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}
