use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::config::Config;
use crate::ledger::Ledger;

/// Periodic driver for the automatic dividend sweep. The engine itself
/// decides whether a sweep is due (active config, payment time reached,
/// today unpaid), so ticking more often than needed is harmless.
pub async fn run_auto_payment_loop(ledger: Arc<Ledger>) {
    let config = Config::get();
    let mut interval =
        tokio::time::interval(Duration::from_secs(config.scheduler.poll_interval_secs));
    info!(
        "auto payment scheduler started, polling every {}s",
        config.scheduler.poll_interval_secs
    );

    loop {
        interval.tick().await;
        match ledger.dividends.maybe_run_sweep().await {
            Ok(Some(summary)) => {
                info!(
                    "automatic dividend sweep: {} paid, {} total",
                    summary.processed_count, summary.total_amount
                );
            }
            Ok(None) => {}
            Err(e) => {
                error!("automatic dividend sweep failed: {}", e);
            }
        }
    }
}
