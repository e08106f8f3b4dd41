//! In-memory store used by unit tests across the crate.

use std::collections::BTreeMap;
use std::convert::Infallible;

use chrono::NaiveDateTime;

use crate::category::DomainLimit;
use crate::state::ActiveState;
use crate::store::{StateStore, UsageStore};
use crate::types::{CategoryKey, DayKey, DomainName};
use crate::usage::{DailyUsage, SessionRecord};

/// A transparent, infallible store backed by maps.
#[derive(Debug, Default)]
pub struct MemStore {
    pub usage: BTreeMap<(DayKey, CategoryKey), DailyUsage>,
    pub states: BTreeMap<CategoryKey, ActiveState>,
    pub limits: BTreeMap<DomainName, DomainLimit>,
}

impl UsageStore for MemStore {
    type Error = Infallible;

    fn daily_usage(
        &self,
        day: DayKey,
        category: &CategoryKey,
    ) -> Result<DailyUsage, Self::Error> {
        Ok(self
            .usage
            .get(&(day, category.clone()))
            .cloned()
            .unwrap_or_default())
    }

    fn add_category_seconds(
        &mut self,
        day: DayKey,
        category: &CategoryKey,
        seconds: u64,
    ) -> Result<(), Self::Error> {
        self.usage
            .entry((day, category.clone()))
            .or_default()
            .total_seconds += seconds;
        Ok(())
    }

    fn add_domain_seconds(
        &mut self,
        day: DayKey,
        category: &CategoryKey,
        domain: &DomainName,
        seconds: u64,
    ) -> Result<(), Self::Error> {
        *self
            .usage
            .entry((day, category.clone()))
            .or_default()
            .by_domain
            .entry(domain.clone())
            .or_default() += seconds;
        Ok(())
    }

    fn append_session(
        &mut self,
        day: DayKey,
        category: &CategoryKey,
        start: NaiveDateTime,
    ) -> Result<(), Self::Error> {
        self.usage
            .entry((day, category.clone()))
            .or_default()
            .sessions
            .push(SessionRecord::open(start));
        Ok(())
    }

    fn close_open_session(
        &mut self,
        day: DayKey,
        category: &CategoryKey,
        end: NaiveDateTime,
    ) -> Result<Option<SessionRecord>, Self::Error> {
        let Some(usage) = self.usage.get_mut(&(day, category.clone())) else {
            return Ok(None);
        };
        let Some(record) = usage.sessions.iter_mut().find(|s| s.is_open()) else {
            return Ok(None);
        };
        record.close(end);
        Ok(Some(record.clone()))
    }

    fn domain_seconds(&self, day: DayKey, domain: &DomainName) -> Result<u64, Self::Error> {
        Ok(self
            .usage
            .iter()
            .filter(|((d, _), _)| *d == day)
            .filter_map(|(_, usage)| usage.by_domain.get(domain))
            .sum())
    }

    fn usage_between(
        &self,
        from: DayKey,
        to: DayKey,
    ) -> Result<Vec<(DayKey, CategoryKey, DailyUsage)>, Self::Error> {
        Ok(self
            .usage
            .iter()
            .filter(|((day, _), _)| *day >= from && *day <= to)
            .map(|((day, cat), usage)| (*day, cat.clone(), usage.clone()))
            .collect())
    }

    fn prune_before(&mut self, cutoff: DayKey) -> Result<usize, Self::Error> {
        let before = self.usage.len();
        self.usage.retain(|(day, _), _| *day >= cutoff);
        Ok(before - self.usage.len())
    }

    fn domain_limit(&self, domain: &DomainName) -> Result<Option<DomainLimit>, Self::Error> {
        Ok(self.limits.get(domain).copied())
    }

    fn set_domain_limit(
        &mut self,
        domain: &DomainName,
        limit: Option<DomainLimit>,
    ) -> Result<(), Self::Error> {
        match limit {
            Some(limit) => {
                self.limits.insert(domain.clone(), limit);
            }
            None => {
                self.limits.remove(domain);
            }
        }
        Ok(())
    }

    fn domain_limits(&self) -> Result<BTreeMap<DomainName, DomainLimit>, Self::Error> {
        Ok(self.limits.clone())
    }
}

impl StateStore for MemStore {
    fn active_state(&self, category: &CategoryKey) -> Result<Option<ActiveState>, Self::Error> {
        Ok(self.states.get(category).cloned())
    }

    fn put_active_state(
        &mut self,
        category: &CategoryKey,
        state: &ActiveState,
    ) -> Result<(), Self::Error> {
        self.states.insert(category.clone(), state.clone());
        Ok(())
    }

    fn all_active_states(&self) -> Result<Vec<(CategoryKey, ActiveState)>, Self::Error> {
        Ok(self
            .states
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn clear_active_states(&mut self) -> Result<(), Self::Error> {
        self.states.clear();
        Ok(())
    }
}
