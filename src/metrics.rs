use once_cell::sync::Lazy;
use prometheus::{IntCounter, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static COMMISSIONS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "ledger_commissions_created_total",
        "Commission rows created from completed deposits",
    )
    .expect("metric definition");
    REGISTRY.register(Box::new(counter.clone())).ok();
    counter
});

pub static COMMISSIONS_PAID: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "ledger_commissions_paid_total",
        "Commissions settled to user balances",
    )
    .expect("metric definition");
    REGISTRY.register(Box::new(counter.clone())).ok();
    counter
});

pub static DIVIDENDS_GENERATED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "ledger_dividends_generated_total",
        "Daily dividend rows generated",
    )
    .expect("metric definition");
    REGISTRY.register(Box::new(counter.clone())).ok();
    counter
});

pub static DIVIDENDS_PAID: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "ledger_dividends_paid_total",
        "Dividends settled to user balances",
    )
    .expect("metric definition");
    REGISTRY.register(Box::new(counter.clone())).ok();
    counter
});

pub static BALANCES_REPAIRED: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "ledger_balances_repaired_total",
        "User balances overwritten by reconciliation",
    )
    .expect("metric definition");
    REGISTRY.register(Box::new(counter.clone())).ok();
    counter
});

/// Render the registry in the Prometheus text exposition format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    encoder
        .encode_to_string(&REGISTRY.gather())
        .unwrap_or_default()
}
