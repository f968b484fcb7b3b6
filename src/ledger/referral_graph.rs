use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{LedgerError, Result};
use crate::ledger::ensure_admin;
use crate::models::network_change::NetworkChange;
use crate::models::new_id;
use crate::models::referral::{Referral, LEVEL_RATES, REFERRAL_STATUS_ACTIVE};
use crate::models::user::{Actor, User};
use crate::store::Store;
use tracing::info;

/// Maintains the 3-level sponsor chain per user.
pub struct ReferralGraph {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl ReferralGraph {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Resolve up to three ancestors above `sponsor` and build the chain
    /// rows for `user`. Resolution stops at the first sponsor without a
    /// resolvable `referred_by` code; no level beyond that point is built.
    async fn chain_rows(
        &self,
        user: &User,
        sponsor: &User,
        now: DateTime<Utc>,
    ) -> Result<Vec<Referral>> {
        let mut rows = Vec::new();
        let mut parent_id: Option<String> = None;
        let mut ancestor = sponsor.clone();

        for (level, rate) in LEVEL_RATES {
            let row = Referral {
                id: new_id(),
                referrer_id: ancestor.id.clone(),
                referred_id: user.id.clone(),
                referred_name: user.name.clone(),
                referred_email: user.email.clone(),
                level,
                commission_rate: rate,
                status: REFERRAL_STATUS_ACTIVE.to_string(),
                parent_id: parent_id.clone(),
                created_at: now,
                updated_at: now,
            };
            parent_id = Some(row.id.clone());
            rows.push(row);

            let next_code = match &ancestor.referred_by {
                Some(code) => code.clone(),
                None => break,
            };
            match self.store.user_by_referral_code(&next_code).await? {
                Some(next) => ancestor = next,
                None => break,
            }
        }

        Ok(rows)
    }

    /// Create the referral chain for a newly sponsored user. All eligible
    /// levels are written in one atomic store call.
    pub async fn create_chain(&self, user: &User, sponsor: &User) -> Result<Vec<Referral>> {
        let now = self.clock.now();
        let rows = self.chain_rows(user, sponsor, now).await?;
        let created = self.store.insert_referral_chain(rows).await?;
        info!(
            "created {}-level referral chain for user {} under sponsor {}",
            created.len(),
            user.id,
            sponsor.id
        );
        Ok(created)
    }

    /// Every user transitively referred by `user_id`. Bounded by a visited
    /// set so traversal terminates even over corrupted cyclic data.
    pub async fn downline(&self, user_id: &str) -> Result<HashSet<String>> {
        let mut downline = HashSet::new();
        let mut visited = HashSet::new();
        let mut stack = vec![user_id.to_string()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            for edge in self.store.referrals_by(&current).await? {
                if downline.insert(edge.referred_id.clone()) {
                    stack.push(edge.referred_id);
                }
            }
        }

        Ok(downline)
    }

    /// Move a user under a new sponsor. Checks run before any mutation: the
    /// new sponsor must exist and must not sit in the user's own downline.
    /// The old chain is deleted and the new one created atomically, then an
    /// audit row records the change.
    pub async fn reassign_sponsor(
        &self,
        actor: &Actor,
        user_id: &str,
        new_sponsor_id: &str,
        reason: &str,
    ) -> Result<Vec<Referral>> {
        ensure_admin(actor)?;
        if reason.trim().is_empty() {
            return Err(LedgerError::Validation(
                "a reason is required for a sponsor change".to_string(),
            ));
        }

        let user = self
            .store
            .user(user_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound("user", user_id.to_string()))?;
        let new_sponsor = self
            .store
            .user(new_sponsor_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound("user", new_sponsor_id.to_string()))?;

        if new_sponsor.id == user.id {
            return Err(LedgerError::Cycle {
                user: user.id.clone(),
                candidate: new_sponsor.id.clone(),
            });
        }
        let downline = self.downline(&user.id).await?;
        if downline.contains(&new_sponsor.id) {
            return Err(LedgerError::Cycle {
                user: user.id.clone(),
                candidate: new_sponsor.id.clone(),
            });
        }

        let old_sponsor = match &user.referred_by {
            Some(code) => self.store.user_by_referral_code(code).await?,
            None => None,
        };

        let now = self.clock.now();
        let rows = self.chain_rows(&user, &new_sponsor, now).await?;
        let created = self
            .store
            .replace_referral_chain(&user.id, &new_sponsor.referral_code, rows, now)
            .await?;

        let old_network_path = match &old_sponsor {
            Some(old) => format!("{} -> {}", old.name, user.name),
            None => format!("No sponsor -> {}", user.name),
        };
        let change = NetworkChange {
            id: new_id(),
            user_id: user.id.clone(),
            old_sponsor_id: old_sponsor.map(|s| s.id),
            new_sponsor_id: new_sponsor.id.clone(),
            admin_id: actor.id.clone(),
            reason: reason.to_string(),
            old_network_path,
            new_network_path: format!("{} -> {}", new_sponsor.name, user.name),
            created_at: now,
        };
        self.store.insert_network_change(change).await?;

        info!(
            "sponsor of user {} reassigned to {} by admin {}",
            user.id, new_sponsor.id, actor.id
        );
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ledger::accounts::AccountService;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    fn fixture() -> (Arc<MemoryStore>, Arc<FixedClock>, AccountService, ReferralGraph) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let accounts = AccountService::new(store.clone(), clock.clone());
        let graph = ReferralGraph::new(store.clone(), clock.clone());
        (store, clock, accounts, graph)
    }

    #[tokio::test]
    async fn chain_depth_matches_available_ancestry() {
        let (store, _clock, accounts, _graph) = fixture();

        let a = accounts.register("Alice Root", "alice@example.com", None).await.unwrap();
        let b = accounts
            .register("Bob Mid", "bob@example.com", Some(&a.referral_code))
            .await
            .unwrap();
        let c = accounts
            .register("Carol Leaf", "carol@example.com", Some(&b.referral_code))
            .await
            .unwrap();
        let d = accounts
            .register("Dave Deep", "dave@example.com", Some(&c.referral_code))
            .await
            .unwrap();

        // A has no sponsor: no rows at all.
        assert!(store.ancestry_of(&a.id).await.unwrap().is_empty());

        // B's only ancestor is A.
        let b_chain = store.ancestry_of(&b.id).await.unwrap();
        assert_eq!(b_chain.len(), 1);
        assert_eq!(b_chain[0].level, 1);
        assert_eq!(b_chain[0].referrer_id, a.id);
        assert_eq!(b_chain[0].commission_rate, 17);
        assert!(b_chain[0].parent_id.is_none());

        // C sees B at level 1 and A at level 2.
        let c_chain = store.ancestry_of(&c.id).await.unwrap();
        assert_eq!(c_chain.len(), 2);
        assert_eq!(c_chain[1].level, 2);
        assert_eq!(c_chain[1].referrer_id, a.id);
        assert_eq!(c_chain[1].commission_rate, 2);
        assert_eq!(c_chain[1].parent_id.as_deref(), Some(c_chain[0].id.as_str()));

        // D gets the full three levels with contiguous parent links.
        let d_chain = store.ancestry_of(&d.id).await.unwrap();
        assert_eq!(d_chain.len(), 3);
        assert_eq!(
            d_chain.iter().map(|r| r.commission_rate).collect::<Vec<_>>(),
            vec![17, 2, 1]
        );
        assert_eq!(d_chain[2].referrer_id, a.id);
        assert_eq!(d_chain[2].parent_id.as_deref(), Some(d_chain[1].id.as_str()));
    }

    #[tokio::test]
    async fn downline_is_transitive() {
        let (_store, _clock, accounts, graph) = fixture();

        let a = accounts.register("Alice", "a@example.com", None).await.unwrap();
        let b = accounts
            .register("Bob", "b@example.com", Some(&a.referral_code))
            .await
            .unwrap();
        let c = accounts
            .register("Carol", "c@example.com", Some(&b.referral_code))
            .await
            .unwrap();

        let downline = graph.downline(&a.id).await.unwrap();
        assert!(downline.contains(&b.id));
        assert!(downline.contains(&c.id));
        assert!(!downline.contains(&a.id));
    }

    #[tokio::test]
    async fn reassignment_into_own_downline_is_rejected_without_mutation() {
        let (store, _clock, accounts, graph) = fixture();

        let a = accounts.register("Alice", "a@example.com", None).await.unwrap();
        let b = accounts
            .register("Bob", "b@example.com", Some(&a.referral_code))
            .await
            .unwrap();
        let c = accounts
            .register("Carol", "c@example.com", Some(&b.referral_code))
            .await
            .unwrap();

        let admin = Actor::admin("admin");
        let err = graph
            .reassign_sponsor(&admin, &a.id, &c.id, "compress the tree")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Cycle { .. }));

        // A's rows and referred_by are untouched.
        let a_after = store.user(&a.id).await.unwrap().unwrap();
        assert!(a_after.referred_by.is_none());
        assert!(store.ancestry_of(&a.id).await.unwrap().is_empty());

        // And reassigning a user to itself is also a cycle.
        let err = graph
            .reassign_sponsor(&admin, &b.id, &b.id, "self sponsor")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Cycle { .. }));
    }

    #[tokio::test]
    async fn reassignment_rebuilds_chain_and_audits() {
        let (store, _clock, accounts, graph) = fixture();

        let a = accounts.register("Alice", "a@example.com", None).await.unwrap();
        let x = accounts.register("Xavier", "x@example.com", None).await.unwrap();
        let b = accounts
            .register("Bob", "b@example.com", Some(&a.referral_code))
            .await
            .unwrap();

        let admin = Actor::admin("admin");
        let created = graph
            .reassign_sponsor(&admin, &b.id, &x.id, "requested by support")
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].referrer_id, x.id);

        let b_after = store.user(&b.id).await.unwrap().unwrap();
        assert_eq!(b_after.referred_by.as_deref(), Some(x.referral_code.as_str()));

        let chain = store.ancestry_of(&b.id).await.unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].referrer_id, x.id);

        let changes = store.network_changes().await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].user_id, b.id);
        assert_eq!(changes[0].old_sponsor_id.as_deref(), Some(a.id.as_str()));
        assert_eq!(changes[0].new_sponsor_id, x.id);
        assert_eq!(changes[0].reason, "requested by support");
    }

    #[tokio::test]
    async fn reassignment_requires_admin() {
        let (_store, _clock, accounts, graph) = fixture();

        let a = accounts.register("Alice", "a@example.com", None).await.unwrap();
        let b = accounts.register("Bob", "b@example.com", None).await.unwrap();

        let actor = Actor::user(b.id.clone());
        let err = graph
            .reassign_sponsor(&actor, &b.id, &a.id, "please")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized));
    }
}
