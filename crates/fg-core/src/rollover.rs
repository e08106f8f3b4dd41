//! Daily rollover: closing out the old day and starting fresh.

use chrono::NaiveDateTime;

use crate::arbiter::Arbiter;
use crate::store::StateStore;
use crate::types::{CategoryKey, DayKey};

/// Usage history older than this many days is pruned at rollover.
pub const RETENTION_DAYS: u64 = 31;

/// What a rollover pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloverReport {
    /// Categories whose dangling session was closed into its start day.
    pub closed_sessions: Vec<CategoryKey>,
    /// Day-category usage records removed by retention pruning.
    pub pruned_records: usize,
}

impl<S: StateStore> Arbiter<S> {
    /// Runs the day transition.
    ///
    /// Pending accrual is flushed first so no in-flight seconds are lost,
    /// then every dangling session is closed and attributed to the day it
    /// started (not the new day), all active state is dropped (rest does
    /// not carry across midnight), and retention-expired history is pruned.
    ///
    /// Idempotent: a second call in the same transition closes nothing and
    /// prunes nothing further.
    pub fn roll_over(&mut self, now: NaiveDateTime) -> Result<RolloverReport, S::Error> {
        self.flush(now)?;

        let mut report = RolloverReport::default();
        for (category, state) in self.store().all_active_states()? {
            if !state.in_session {
                continue;
            }
            let Some(start) = state.session_start else {
                continue;
            };
            let day = DayKey::of(start);
            // Close at the end of the day the session started, or at `now`
            // if that boundary is somehow still ahead.
            let end = day.end().min(now);
            self.store_mut().close_open_session(day, &category, end)?;
            tracing::info!(category = %category, day = %day, "closed dangling session at rollover");
            report.closed_sessions.push(category);
        }

        self.store_mut().clear_active_states()?;

        let cutoff = DayKey::of(now).days_back(RETENTION_DAYS);
        report.pruned_records = self.store_mut().prune_before(cutoff)?;
        if report.pruned_records > 0 {
            tracing::debug!(cutoff = %cutoff, pruned = report.pruned_records, "pruned usage history");
        }
        Ok(report)
    }
}
