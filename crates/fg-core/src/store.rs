//! Storage trait seams.
//!
//! The arbiter is generic over these traits so the core stays independent
//! of the storage engine. Implementations must make every mutation additive
//! or idempotent: the arbiter never read-modify-writes durable totals
//! outside its flush routine, and duplicate completions must be absorbed.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::category::DomainLimit;
use crate::state::ActiveState;
use crate::types::{CategoryKey, DayKey, DomainName};
use crate::usage::{DailyUsage, SessionRecord};

/// Durable per-day effective-time accounting.
pub trait UsageStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The usage record for one category on one day. Missing records read
    /// as empty.
    fn daily_usage(&self, day: DayKey, category: &CategoryKey)
    -> Result<DailyUsage, Self::Error>;

    /// Adds committed seconds to a category's daily total.
    fn add_category_seconds(
        &mut self,
        day: DayKey,
        category: &CategoryKey,
        seconds: u64,
    ) -> Result<(), Self::Error>;

    /// Adds committed seconds to a domain's share of a category's day.
    fn add_domain_seconds(
        &mut self,
        day: DayKey,
        category: &CategoryKey,
        domain: &DomainName,
        seconds: u64,
    ) -> Result<(), Self::Error>;

    /// Appends a new open session record.
    fn append_session(
        &mut self,
        day: DayKey,
        category: &CategoryKey,
        start: NaiveDateTime,
    ) -> Result<(), Self::Error>;

    /// Closes the open session record for the category on the given day,
    /// if one exists, and returns it.
    fn close_open_session(
        &mut self,
        day: DayKey,
        category: &CategoryKey,
        end: NaiveDateTime,
    ) -> Result<Option<SessionRecord>, Self::Error>;

    /// Committed seconds for a domain on a day, across all categories.
    fn domain_seconds(&self, day: DayKey, domain: &DomainName) -> Result<u64, Self::Error>;

    /// All usage records in the inclusive day range.
    fn usage_between(
        &self,
        from: DayKey,
        to: DayKey,
    ) -> Result<Vec<(DayKey, CategoryKey, DailyUsage)>, Self::Error>;

    /// Deletes usage records for days strictly before `cutoff`. Returns the
    /// number of day-category records removed.
    fn prune_before(&mut self, cutoff: DayKey) -> Result<usize, Self::Error>;

    fn domain_limit(&self, domain: &DomainName) -> Result<Option<DomainLimit>, Self::Error>;

    /// Sets or clears a per-domain daily cap.
    fn set_domain_limit(
        &mut self,
        domain: &DomainName,
        limit: Option<DomainLimit>,
    ) -> Result<(), Self::Error>;

    fn domain_limits(&self) -> Result<BTreeMap<DomainName, DomainLimit>, Self::Error>;
}

/// Durable session/rest state snapshots, for crash recovery.
pub trait StateStore: UsageStore {
    /// The persisted state for a category, if any.
    fn active_state(&self, category: &CategoryKey) -> Result<Option<ActiveState>, Self::Error>;

    fn put_active_state(
        &mut self,
        category: &CategoryKey,
        state: &ActiveState,
    ) -> Result<(), Self::Error>;

    fn all_active_states(&self) -> Result<Vec<(CategoryKey, ActiveState)>, Self::Error>;

    /// Drops every persisted state snapshot (day rollover).
    fn clear_active_states(&mut self) -> Result<(), Self::Error>;
}
