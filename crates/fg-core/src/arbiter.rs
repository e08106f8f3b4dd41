//! Session and access arbitration.
//!
//! The arbiter owns the pending-accrual buffer and is the only component
//! (together with the daily rollover) that mutates usage or active state.
//! All reads it arbitrates against merge committed storage with the pending
//! buffer; capping headroom is recomputed from that merged view on every
//! call, so interleaved reports can never overshoot a limit.

use chrono::{Duration, NaiveDateTime};

use crate::category::{Category, CategorySet, DomainLimit};
use crate::decision::{
    AccessDecision, AccrualOutcome, DomainLimitStatus, EndOutcome, StartOutcome,
};
use crate::pending::{PendingAccrual, PendingBatch};
use crate::policy::{self, UsageView};
use crate::state::ActiveState;
use crate::store::StateStore;
use crate::types::{CategoryKey, DayKey, DomainName};
use crate::usage::{DailyUsage, PeriodStats};

/// Pending accrual is flushed at least this often.
pub const FLUSH_INTERVAL_SECS: i64 = 10;

/// Decides access, accounts effective time, and drives the session state
/// machine for every category.
#[derive(Debug)]
pub struct Arbiter<S: StateStore> {
    store: S,
    categories: CategorySet,
    pending: PendingAccrual,
    last_flush: Option<NaiveDateTime>,
}

/// Within 5% of a cap: the next flush happens eagerly, out of band.
fn near_cap(used: u64, limit: u32) -> bool {
    // used >= 95% of limit, in integer math
    used.saturating_mul(20) >= u64::from(limit).saturating_mul(19)
}

impl<S: StateStore> Arbiter<S> {
    pub fn new(store: S, categories: CategorySet) -> Self {
        Self {
            store,
            categories,
            pending: PendingAccrual::new(),
            last_flush: None,
        }
    }

    #[must_use]
    pub const fn categories(&self) -> &CategorySet {
        &self.categories
    }

    /// Swaps in an edited category configuration.
    pub fn replace_categories(&mut self, categories: CategorySet) {
        self.categories = categories;
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    fn state_of(&self, category: &CategoryKey) -> Result<ActiveState, S::Error> {
        Ok(self.store.active_state(category)?.unwrap_or_default())
    }

    /// Committed usage merged with the pending buffer.
    pub fn merged_usage(
        &self,
        day: DayKey,
        category: &CategoryKey,
    ) -> Result<DailyUsage, S::Error> {
        let mut usage = self.store.daily_usage(day, category)?;
        usage.total_seconds += self.pending.category_seconds(day, category);
        for (d, cat, domain, seconds) in self.pending.iter_domains() {
            if d == day && cat == category {
                *usage.by_domain.entry(domain.clone()).or_default() += seconds;
            }
        }
        Ok(usage)
    }

    fn usage_view(&self, day: DayKey, category: &CategoryKey) -> Result<UsageView, S::Error> {
        let usage = self.store.daily_usage(day, category)?;
        Ok(UsageView {
            total_seconds: usage.total_seconds + self.pending.category_seconds(day, category),
            completed_sessions: usage.completed_sessions(),
        })
    }

    /// Whether the category may be used right now.
    /// Clears an expired rest as a side effect.
    pub fn can_access(
        &mut self,
        category: &CategoryKey,
        now: NaiveDateTime,
    ) -> Result<AccessDecision, S::Error> {
        let Some(config) = self.categories.get(category).cloned() else {
            return Ok(AccessDecision::unrestricted());
        };
        let view = self.usage_view(DayKey::of(now), category)?;
        let mut state = self.state_of(category)?;
        let eval = policy::evaluate_access(&config, view, &state, now);
        if eval.rest_cleared {
            state.clear_rest();
            self.store.put_active_state(category, &state)?;
            tracing::debug!(category = %category, "rest period expired, cleared");
        }
        Ok(eval.decision)
    }

    /// Per-domain daily cap check. `None` when the domain has no limit.
    pub fn check_domain_limit(
        &self,
        domain: &DomainName,
        now: NaiveDateTime,
    ) -> Result<Option<DomainLimitStatus>, S::Error> {
        let Some(limit) = self.store.domain_limit(domain)? else {
            return Ok(None);
        };
        let day = DayKey::of(now);
        let used = self.store.domain_seconds(day, domain)? + self.pending.domain_seconds(day, domain);
        Ok(Some(policy::domain_limit_status(limit, used)))
    }

    /// Opens a session if access allows. Idempotent while a session is open.
    pub fn start_session(
        &mut self,
        category: &CategoryKey,
        now: NaiveDateTime,
    ) -> Result<StartOutcome, S::Error> {
        if self.categories.get(category).is_none() {
            tracing::debug!(category = %category, "start_session for unknown category");
            return Ok(StartOutcome {
                success: false,
                already_active: false,
                session_start: None,
                denied: None,
            });
        }

        let decision = self.can_access(category, now)?;
        if !decision.allowed {
            return Ok(StartOutcome {
                success: false,
                already_active: false,
                session_start: None,
                denied: Some(decision),
            });
        }

        let mut state = self.state_of(category)?;
        if state.in_session {
            return Ok(StartOutcome {
                success: true,
                already_active: true,
                session_start: state.session_start,
                denied: None,
            });
        }

        self.store.append_session(DayKey::of(now), category, now)?;
        state.begin_session(now);
        self.store.put_active_state(category, &state)?;
        tracing::info!(category = %category, "session started");
        Ok(StartOutcome {
            success: true,
            already_active: false,
            session_start: Some(now),
            denied: None,
        })
    }

    /// Closes the open session. With `trigger_rest`, starts the category's
    /// mandatory rest if one is configured.
    pub fn end_session(
        &mut self,
        category: &CategoryKey,
        now: NaiveDateTime,
        trigger_rest: bool,
    ) -> Result<EndOutcome, S::Error> {
        let mut state = self.state_of(category)?;
        if !state.in_session {
            return Ok(EndOutcome {
                success: false,
                rest_started: false,
                rest_end: None,
            });
        }

        // The session record lives under the day it started.
        let session_day = state.session_start.map_or_else(|| DayKey::of(now), DayKey::of);
        self.store.close_open_session(session_day, category, now)?;

        let rest_duration = if trigger_rest {
            self.categories.get(category).and_then(|c| c.rest_duration)
        } else {
            None
        };
        let rest_started = state.finish_session(now, rest_duration);
        self.store.put_active_state(category, &state)?;
        tracing::info!(category = %category, rest_started, "session ended");
        Ok(EndOutcome {
            success: true,
            rest_started,
            rest_end: state.rest_end,
        })
    }

    /// Accounts an effective-seconds report against a category (and
    /// optionally a domain).
    ///
    /// The committed amount is capped so the daily total lands at most
    /// exactly on the limit. Crossing the session-duration cap ends the
    /// session (with rest) and takes priority over the daily cap; crossing
    /// the daily cap ends the session without rest.
    pub fn add_effective_time(
        &mut self,
        category: &CategoryKey,
        domain: Option<&DomainName>,
        seconds: i64,
        now: NaiveDateTime,
    ) -> Result<AccrualOutcome, S::Error> {
        if seconds <= 0 {
            return Ok(AccrualOutcome::pass_through());
        }
        let Some(config) = self.categories.get(category).cloned() else {
            return Ok(AccrualOutcome::pass_through());
        };
        if !config.enabled {
            return Ok(AccrualOutcome::pass_through());
        }

        let day = DayKey::of(now);
        let committed = self.store.daily_usage(day, category)?;
        let current = committed.total_seconds + self.pending.category_seconds(day, category);

        let reported = u64::try_from(seconds).unwrap_or(0);
        let to_add = match config.daily_limit {
            Some(limit) => reported.min(u64::from(limit).saturating_sub(current)),
            None => reported,
        };

        self.pending.add(day, category, domain, to_add);
        self.flush_if_due(&config, domain, day, current + to_add, now)?;

        let mut state = self.state_of(category)?;
        if state.in_session && to_add > 0 {
            state.session_effective = state
                .session_effective
                .saturating_add(u32::try_from(to_add).unwrap_or(u32::MAX));
            self.store.put_active_state(category, &state)?;
        }
        let session_effective = state.session_effective;

        // Session cap first: when one report crosses both limits, the
        // session-limit branch short-circuits.
        if state.in_session {
            if let Some(duration) = config.session_duration {
                if session_effective >= duration {
                    let end = self.end_session(category, now, true)?;
                    let rest_duration = end.rest_started.then(|| config.rest_duration).flatten();
                    return Ok(AccrualOutcome::session_limit(
                        to_add,
                        end.rest_started,
                        rest_duration,
                    ));
                }
            }
        }

        if let Some(limit) = config.daily_limit {
            if current + to_add >= u64::from(limit) {
                self.end_session(category, now, false)?;
                return Ok(AccrualOutcome::daily_limit(to_add));
            }
        }

        let access = self.can_access(category, now)?;
        Ok(AccrualOutcome {
            allowed: true,
            skipped: false,
            reason: None,
            added_seconds: to_add,
            session_effective,
            rest_started: false,
            rest_duration: None,
            access: Some(access),
        })
    }

    fn flush_if_due(
        &mut self,
        config: &Category,
        domain: Option<&DomainName>,
        day: DayKey,
        merged_total: u64,
        now: NaiveDateTime,
    ) -> Result<(), S::Error> {
        let mut eager = config
            .daily_limit
            .is_some_and(|limit| near_cap(merged_total, limit));

        if !eager {
            if let Some(domain) = domain {
                if let Some(limit) = self.store.domain_limit(domain)? {
                    let used = self.store.domain_seconds(day, domain)?
                        + self.pending.domain_seconds(day, domain);
                    eager = near_cap(used, limit.daily_limit);
                }
            }
        }

        let due = self
            .last_flush
            .is_none_or(|t| now - t >= Duration::seconds(FLUSH_INTERVAL_SECS));
        if eager || due {
            self.flush(now)?;
        }
        Ok(())
    }

    /// Writes the pending buffer through to durable storage.
    ///
    /// On a storage error the unwritten remainder is put back in the
    /// buffer, so the next successful flush recovers it.
    pub fn flush(&mut self, now: NaiveDateTime) -> Result<(), S::Error> {
        self.last_flush = Some(now);
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = self.pending.drain();
        let mut unwritten = PendingBatch::default();
        let mut first_err = None;

        for (day, cat, secs) in batch.categories {
            if first_err.is_some() {
                unwritten.categories.push((day, cat, secs));
                continue;
            }
            if let Err(e) = self.store.add_category_seconds(day, &cat, secs) {
                tracing::warn!(error = %e, category = %cat, "flush write failed");
                first_err = Some(e);
                unwritten.categories.push((day, cat, secs));
            }
        }
        for (day, cat, dom, secs) in batch.domains {
            if first_err.is_some() {
                unwritten.domains.push((day, cat, dom, secs));
                continue;
            }
            if let Err(e) = self.store.add_domain_seconds(day, &cat, &dom, secs) {
                tracing::warn!(error = %e, domain = %dom, "flush write failed");
                first_err = Some(e);
                unwritten.domains.push((day, cat, dom, secs));
            }
        }

        self.pending.restore(unwritten);
        tracing::debug!("pending accrual flushed");
        first_err.map_or(Ok(()), Err)
    }

    /// Sets or clears a per-domain cap, returning the updated map.
    pub fn set_domain_limit(
        &mut self,
        domain: &DomainName,
        limit: Option<DomainLimit>,
    ) -> Result<std::collections::BTreeMap<DomainName, DomainLimit>, S::Error> {
        self.store.set_domain_limit(domain, limit)?;
        self.store.domain_limits()
    }

    /// Clears rests that have elapsed, returning the affected categories.
    pub fn sweep_expired_rests(
        &mut self,
        now: NaiveDateTime,
    ) -> Result<Vec<CategoryKey>, S::Error> {
        let mut ended = Vec::new();
        for (category, mut state) in self.store.all_active_states()? {
            if state.rest_expired(now) {
                state.clear_rest();
                self.store.put_active_state(&category, &state)?;
                ended.push(category);
            }
        }
        Ok(ended)
    }

    /// Aggregated usage over an inclusive day range, merged with pending.
    pub fn period_stats(&self, from: DayKey, to: DayKey) -> Result<PeriodStats, S::Error> {
        let mut entries: std::collections::BTreeMap<(DayKey, CategoryKey), DailyUsage> = self
            .store
            .usage_between(from, to)?
            .into_iter()
            .map(|(day, cat, usage)| ((day, cat), usage))
            .collect();

        for (day, cat, secs) in self.pending.iter_categories() {
            if day >= from && day <= to {
                entries.entry((day, cat.clone())).or_default().total_seconds += secs;
            }
        }
        for (day, cat, dom, secs) in self.pending.iter_domains() {
            if day >= from && day <= to {
                *entries
                    .entry((day, cat.clone()))
                    .or_default()
                    .by_domain
                    .entry(dom.clone())
                    .or_default() += secs;
            }
        }

        Ok(PeriodStats::aggregate(
            entries.into_iter().map(|((day, cat), usage)| (day, cat, usage)),
        ))
    }
}
