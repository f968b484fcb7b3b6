// Copyright (c) BYD Profit Team
// SPDX-License-Identifier: Apache-2.0

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{auto_payment_configs, investment_plans, system_configs};

pub const CONFIG_MIN_WITHDRAWAL: &str = "min_withdrawal";
pub const CONFIG_WITHDRAWAL_FEE: &str = "withdrawal_fee";

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = investment_plans)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct InvestmentPlan {
    pub id: String,
    pub code: String,
    pub name: String,
    pub description: String,
    pub value: BigDecimal,
    pub return_rate: BigDecimal,
    pub return_period: i32,
    pub daily_profit: BigDecimal,
    pub total_profit: BigDecimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = system_configs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SystemConfig {
    pub id: String,
    pub key: String,
    pub value: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Scheduling state for the automatic dividend sweep. A single row; the
/// sweep updates the bookkeeping fields after each run.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset, Serialize, Deserialize)]
#[diesel(table_name = auto_payment_configs)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AutoPaymentConfig {
    pub id: String,
    pub is_active: bool,
    pub payment_time: String,
    pub last_payment_date: Option<NaiveDate>,
    pub next_payment_date: Option<NaiveDate>,
    pub total_users_paid: i32,
    pub total_amount_paid: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
