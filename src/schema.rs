// Copyright (c) BYD Profit Team
// SPDX-License-Identifier: Apache-2.0

// Import diesel table macros
use diesel::allow_tables_to_appear_in_same_query;
use diesel::table;

table! {
    users (id) {
        id -> Varchar,
        name -> Varchar,
        email -> Varchar,
        role -> Varchar,
        balance -> Numeric,
        total_earnings -> Numeric,
        total_invested -> Numeric,
        active_investments -> Jsonb,
        referral_code -> Varchar,
        referred_by -> Nullable<Varchar>,
        total_referrals -> Integer,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    referrals (id) {
        id -> Varchar,
        referrer_id -> Varchar,
        referred_id -> Varchar,
        referred_name -> Varchar,
        referred_email -> Varchar,
        level -> Integer,
        commission_rate -> Integer,
        status -> Varchar,
        parent_id -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    transactions (id) {
        id -> Varchar,
        user_id -> Varchar,
        tx_type -> Varchar,
        amount -> Numeric,
        status -> Varchar,
        description -> Varchar,
        payment_method -> Varchar,
        reference_id -> Nullable<Varchar>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    commissions (id) {
        id -> Varchar,
        user_id -> Varchar,
        referral_id -> Varchar,
        source_user_id -> Varchar,
        transaction_id -> Varchar,
        level -> Integer,
        rate -> Integer,
        base_amount -> Numeric,
        commission_amount -> Numeric,
        status -> Varchar,
        description -> Varchar,
        created_at -> Timestamptz,
        paid_date -> Nullable<Timestamptz>,
    }
}

table! {
    dividends (id) {
        id -> Varchar,
        user_id -> Varchar,
        investment_plan_id -> Varchar,
        plan_name -> Varchar,
        investment_amount -> Numeric,
        dividend_amount -> Numeric,
        dividend_date -> Date,
        status -> Varchar,
        payment_method -> Nullable<Varchar>,
        transaction_id -> Nullable<Varchar>,
        created_at -> Timestamptz,
        paid_date -> Nullable<Timestamptz>,
    }
}

table! {
    investment_plans (id) {
        id -> Varchar,
        code -> Varchar,
        name -> Varchar,
        description -> Varchar,
        value -> Numeric,
        return_rate -> Numeric,
        return_period -> Integer,
        daily_profit -> Numeric,
        total_profit -> Numeric,
        is_active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    network_changes (id) {
        id -> Varchar,
        user_id -> Varchar,
        old_sponsor_id -> Nullable<Varchar>,
        new_sponsor_id -> Varchar,
        admin_id -> Varchar,
        reason -> Varchar,
        old_network_path -> Varchar,
        new_network_path -> Varchar,
        created_at -> Timestamptz,
    }
}

table! {
    system_configs (id) {
        id -> Varchar,
        key -> Varchar,
        value -> Varchar,
        description -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    auto_payment_configs (id) {
        id -> Varchar,
        is_active -> Bool,
        payment_time -> Varchar,
        last_payment_date -> Nullable<Date>,
        next_payment_date -> Nullable<Date>,
        total_users_paid -> Integer,
        total_amount_paid -> Numeric,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

allow_tables_to_appear_in_same_query!(
    users,
    referrals,
    transactions,
    commissions,
    dividends,
    investment_plans,
    network_changes,
    system_configs,
    auto_payment_configs,
);
