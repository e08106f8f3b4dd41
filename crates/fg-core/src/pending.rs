//! In-memory buffer for effective seconds awaiting a batched commit.
//!
//! Increments are coalesced additively per `(day, category)` and
//! `(day, category, domain)`, so concurrently interleaved reports for the
//! same category accumulate correctly regardless of ordering. Every read
//! that computes "current usage" must merge this buffer with committed
//! storage state; the buffer is the authoritative delta until drained.

use std::collections::HashMap;

use crate::types::{CategoryKey, DayKey, DomainName};

/// Pending, uncommitted effective seconds.
#[derive(Debug, Clone, Default)]
pub struct PendingAccrual {
    by_category: HashMap<(DayKey, CategoryKey), u64>,
    by_domain: HashMap<(DayKey, CategoryKey, DomainName), u64>,
}

/// The drained contents of the buffer, ready to write through.
#[derive(Debug, Clone, Default)]
pub struct PendingBatch {
    pub categories: Vec<(DayKey, CategoryKey, u64)>,
    pub domains: Vec<(DayKey, CategoryKey, DomainName, u64)>,
}

impl PendingAccrual {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers `seconds` against a category, optionally attributed to a
    /// domain as well.
    pub fn add(
        &mut self,
        day: DayKey,
        category: &CategoryKey,
        domain: Option<&DomainName>,
        seconds: u64,
    ) {
        if seconds == 0 {
            return;
        }
        *self
            .by_category
            .entry((day, category.clone()))
            .or_default() += seconds;
        if let Some(domain) = domain {
            *self
                .by_domain
                .entry((day, category.clone(), domain.clone()))
                .or_default() += seconds;
        }
    }

    /// Uncommitted seconds for a category on a day.
    #[must_use]
    pub fn category_seconds(&self, day: DayKey, category: &CategoryKey) -> u64 {
        self.by_category
            .get(&(day, category.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Uncommitted seconds for a domain on a day, across all categories.
    #[must_use]
    pub fn domain_seconds(&self, day: DayKey, domain: &DomainName) -> u64 {
        self.by_domain
            .iter()
            .filter(|((d, _, dom), _)| *d == day && dom == domain)
            .map(|(_, secs)| secs)
            .sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_category.is_empty()
    }

    /// Puts a drained batch back, merging with anything buffered since.
    /// Used when a flush write fails partway through.
    pub fn restore(&mut self, batch: PendingBatch) {
        for (day, category, seconds) in batch.categories {
            *self.by_category.entry((day, category)).or_default() += seconds;
        }
        for (day, category, domain, seconds) in batch.domains {
            *self
                .by_domain
                .entry((day, category, domain))
                .or_default() += seconds;
        }
    }

    /// Buffered per-category entries.
    pub fn iter_categories(&self) -> impl Iterator<Item = (DayKey, &CategoryKey, u64)> {
        self.by_category
            .iter()
            .map(|((day, cat), secs)| (*day, cat, *secs))
    }

    /// Buffered per-domain entries.
    pub fn iter_domains(&self) -> impl Iterator<Item = (DayKey, &CategoryKey, &DomainName, u64)> {
        self.by_domain
            .iter()
            .map(|((day, cat, dom), secs)| (*day, cat, dom, *secs))
    }

    /// Empties the buffer, returning everything that was pending.
    pub fn drain(&mut self) -> PendingBatch {
        let categories = self
            .by_category
            .drain()
            .map(|((day, cat), secs)| (day, cat, secs))
            .collect();
        let domains = self
            .by_domain
            .drain()
            .map(|((day, cat, dom), secs)| (day, cat, dom, secs))
            .collect();
        PendingBatch {
            categories,
            domains,
        }
    }
}
