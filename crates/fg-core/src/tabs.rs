//! Cross-tab authority: one tab per category accrues time at a time.
//!
//! Tab authority is inherently ephemeral process state; it is never
//! persisted. A newly seen tab takes over only when the incumbent has been
//! silent past a staleness threshold, so a closed tab that never said
//! goodbye cannot lock a category out forever.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};

use crate::types::CategoryKey;

/// An incumbent is replaced on registration after this much silence.
pub const REGISTER_TAKEOVER_SECS: i64 = 30;

/// An incumbent is replaced on activity pings after this much silence.
pub const ACTIVITY_TAKEOVER_SECS: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TabClaim {
    tab_id: String,
    last_activity: NaiveDateTime,
}

/// Which tab currently speaks for each category.
#[derive(Debug, Default)]
pub struct TabRegistry {
    claims: HashMap<CategoryKey, TabClaim>,
}

impl TabRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tab for a category. Returns whether it is now the
    /// authoritative tab.
    pub fn register(&mut self, category: &CategoryKey, tab_id: &str, now: NaiveDateTime) -> bool {
        self.claim_if(category, tab_id, now, REGISTER_TAKEOVER_SECS)
    }

    /// Removes every claim held by a closing tab.
    pub fn unregister(&mut self, tab_id: &str) {
        self.claims.retain(|_, claim| claim.tab_id != tab_id);
    }

    /// An activity ping from a tab. Inactive pings refresh an existing
    /// claim but never take one over.
    pub fn report_activity(
        &mut self,
        category: &CategoryKey,
        tab_id: &str,
        is_active: bool,
        now: NaiveDateTime,
    ) -> bool {
        if !is_active {
            if let Some(claim) = self.claims.get_mut(category) {
                if claim.tab_id == tab_id {
                    claim.last_activity = now;
                    return true;
                }
            }
            return false;
        }
        self.claim_if(category, tab_id, now, ACTIVITY_TAKEOVER_SECS)
    }

    /// Gate for an effective-time report: true when this tab's seconds may
    /// be accrued. Refreshes the claim timestamp on success.
    pub fn authorize_report(
        &mut self,
        category: &CategoryKey,
        tab_id: &str,
        now: NaiveDateTime,
    ) -> bool {
        self.claim_if(category, tab_id, now, ACTIVITY_TAKEOVER_SECS)
    }

    /// Whether this tab currently holds the claim, without mutating it.
    #[must_use]
    pub fn is_authoritative(&self, category: &CategoryKey, tab_id: &str) -> bool {
        self.claims
            .get(category)
            .is_some_and(|claim| claim.tab_id == tab_id)
    }

    fn claim_if(
        &mut self,
        category: &CategoryKey,
        tab_id: &str,
        now: NaiveDateTime,
        stale_secs: i64,
    ) -> bool {
        match self.claims.get_mut(category) {
            Some(claim) if claim.tab_id == tab_id => {
                claim.last_activity = now;
                true
            }
            Some(claim) if now - claim.last_activity >= Duration::seconds(stale_secs) => {
                tracing::debug!(
                    category = %category,
                    old = %claim.tab_id,
                    new = %tab_id,
                    "stale tab claim taken over"
                );
                claim.tab_id = tab_id.to_string();
                claim.last_activity = now;
                true
            }
            Some(_) => false,
            None => {
                self.claims.insert(
                    category.clone(),
                    TabClaim {
                        tab_id: tab_id.to_string(),
                        last_activity: now,
                    },
                );
                true
            }
        }
    }
}
