pub mod accounts;
pub mod commissions;
pub mod dividends;
pub mod payout;
pub mod referral_graph;
pub mod reconciliation;

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::models::user::Actor;
use crate::notify::Notifier;
use crate::store::Store;

pub(crate) fn ensure_admin(actor: &Actor) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(LedgerError::Unauthorized)
    }
}

/// All engines wired over one store, clock and notifier.
pub struct Ledger {
    pub accounts: accounts::AccountService,
    pub graph: referral_graph::ReferralGraph,
    pub commissions: commissions::CommissionEngine,
    pub dividends: dividends::DividendEngine,
    pub payouts: payout::PayoutProcessor,
    pub reconciler: reconciliation::Reconciler,
    pub clock: Arc<dyn Clock>,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clock: clock.clone(),
            accounts: accounts::AccountService::new(store.clone(), clock.clone()),
            graph: referral_graph::ReferralGraph::new(store.clone(), clock.clone()),
            commissions: commissions::CommissionEngine::new(
                store.clone(),
                clock.clone(),
                notifier.clone(),
            ),
            dividends: dividends::DividendEngine::new(store.clone(), clock.clone(), notifier),
            payouts: payout::PayoutProcessor::new(store.clone(), clock.clone()),
            reconciler: reconciliation::Reconciler::new(store, clock),
        }
    }
}
