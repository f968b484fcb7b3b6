//! End-to-end ledger scenarios on the in-memory store with a fixed clock.

use bigdecimal::BigDecimal;
use chrono::{TimeZone, Utc};
use std::str::FromStr;
use std::sync::Arc;

use referral_ledger::clock::{Clock, FixedClock};
use referral_ledger::ledger::Ledger;
use referral_ledger::models::plan::InvestmentPlan;
use referral_ledger::models::user::Actor;
use referral_ledger::notify::LogNotifier;
use referral_ledger::store::memory::MemoryStore;
use referral_ledger::store::Store;

fn money(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn fixture() -> (Arc<MemoryStore>, Arc<FixedClock>, Ledger) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
    ));
    let ledger = Ledger::new(store.clone(), clock.clone(), Arc::new(LogNotifier));
    (store, clock, ledger)
}

async fn assert_balances_match_ledger(store: &Arc<MemoryStore>, ledger: &Ledger) {
    for user in store.users().await.unwrap() {
        let computed = ledger.reconciler.recompute_balance(&user.id).await.unwrap();
        assert_eq!(
            user.balance, computed,
            "balance of {} diverged from its transactions",
            user.email
        );
    }
    let report = ledger.reconciler.verify_and_repair().await.unwrap();
    assert!(report.corrected_users.is_empty());
}

#[test_log::test(tokio::test)]
async fn end_to_end_referral_scenario() {
    let (store, _clock, ledger) = fixture();

    // X sponsors A; then A -> B -> C.
    let x = ledger.accounts.register("Xavier", "x@example.com", None).await.unwrap();
    let a = ledger
        .accounts
        .register("Alice", "a@example.com", Some(&x.referral_code))
        .await
        .unwrap();
    let b = ledger
        .accounts
        .register("Bob", "b@example.com", Some(&a.referral_code))
        .await
        .unwrap();
    let _c = ledger
        .accounts
        .register("Carol", "c@example.com", Some(&b.referral_code))
        .await
        .unwrap();

    // B deposits 500.00: A is B's direct sponsor (17% = 85.00), X sits at
    // level 2 (2% = 10.00).
    let (deposit_tx, commissions) = ledger
        .accounts
        .deposit(&b.id, money("500.00"), "pix")
        .await
        .unwrap();
    assert_eq!(commissions.len(), 2);

    let level1 = commissions.iter().find(|c| c.level == 1).unwrap();
    assert_eq!(level1.user_id, a.id);
    assert_eq!(level1.commission_amount, money("85.00"));
    assert_eq!(level1.transaction_id, deposit_tx.id);
    assert_eq!(level1.status, "pending");

    let level2 = commissions.iter().find(|c| c.level == 2).unwrap();
    assert_eq!(level2.user_id, x.id);
    assert_eq!(level2.commission_amount, money("10.00"));

    // Settle both and check the money landed.
    let ids: Vec<String> = commissions.iter().map(|c| c.id.clone()).collect();
    let summary = ledger.commissions.pay(&Actor::admin("admin"), &ids).await.unwrap();
    assert_eq!(summary.paid, 2);
    assert_eq!(summary.total_amount, money("95.00"));

    let a_after = store.user(&a.id).await.unwrap().unwrap();
    assert_eq!(a_after.balance, money("85.00"));
    let x_after = store.user(&x.id).await.unwrap().unwrap();
    assert_eq!(x_after.balance, money("10.00"));
    let b_after = store.user(&b.id).await.unwrap().unwrap();
    assert_eq!(b_after.balance, money("500.00"));

    assert_balances_match_ledger(&store, &ledger).await;
}

#[test_log::test(tokio::test)]
async fn balance_conservation_across_mixed_operations() {
    let (store, clock, ledger) = fixture();
    let admin = Actor::admin("admin");

    let now = clock.now();
    store
        .insert_plan(InvestmentPlan {
            id: "plan-basic".to_string(),
            code: "BASIC".to_string(),
            name: "Basic Plan".to_string(),
            description: String::new(),
            value: money("1000.00"),
            return_rate: money("10"),
            return_period: 30,
            daily_profit: money("3.33"),
            total_profit: money("100.00"),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    let a = ledger.accounts.register("Alice", "a@example.com", None).await.unwrap();
    let b = ledger
        .accounts
        .register("Bob", "b@example.com", Some(&a.referral_code))
        .await
        .unwrap();

    // Deposits on both sides, a commission-earning one from B.
    ledger.accounts.deposit(&a.id, money("2000.00"), "pix").await.unwrap();
    let (_tx, commissions) = ledger
        .accounts
        .deposit(&b.id, money("1000.00"), "pix")
        .await
        .unwrap();

    // A invests and withdraws.
    ledger.accounts.purchase_plan(&a.id, "BASIC").await.unwrap();
    ledger.accounts.withdraw(&a.id, money("200.00")).await.unwrap();

    // Commission payout to A (170.00 from B's 1000.00 deposit).
    let ids: Vec<String> = commissions.iter().map(|c| c.id.clone()).collect();
    ledger.commissions.pay(&admin, &ids).await.unwrap();

    // Daily dividends for A's investment across two days.
    ledger.dividends.generate_daily(clock.today()).await.unwrap();
    let div_ids: Vec<String> = store
        .dividends()
        .await
        .unwrap()
        .iter()
        .map(|d| d.id.clone())
        .collect();
    ledger.dividends.pay(&admin, &div_ids, "manual").await.unwrap();

    clock.advance_days(1);
    ledger.dividends.generate_daily(clock.today()).await.unwrap();

    // 2000 - 1000 - 200 + 170 + 3.33
    let a_after = store.user(&a.id).await.unwrap().unwrap();
    assert_eq!(a_after.balance, money("973.33"));
    assert_eq!(a_after.total_earnings, money("173.33"));
    assert_eq!(a_after.total_invested, money("1000.00"));

    let b_after = store.user(&b.id).await.unwrap().unwrap();
    assert_eq!(b_after.balance, money("1000.00"));

    assert_balances_match_ledger(&store, &ledger).await;
}

#[test_log::test(tokio::test)]
async fn rejected_operations_leave_no_trace() {
    let (store, _clock, ledger) = fixture();

    let u = ledger.accounts.register("Alice", "a@example.com", None).await.unwrap();
    ledger.accounts.deposit(&u.id, money("100.00"), "pix").await.unwrap();

    // Too-large withdrawal and negative deposit both fail cleanly.
    assert!(ledger.accounts.withdraw(&u.id, money("5000.00")).await.is_err());
    assert!(ledger.accounts.deposit(&u.id, money("-5.00"), "pix").await.is_err());

    let after = store.user(&u.id).await.unwrap().unwrap();
    assert_eq!(after.balance, money("100.00"));
    assert_eq!(store.transactions_for(&u.id).await.unwrap().len(), 1);

    assert_balances_match_ledger(&store, &ledger).await;
}
