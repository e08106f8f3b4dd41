//! Per-day usage records and period aggregation.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::{CategoryKey, DayKey, DomainName};

/// One bounded span of continuous category usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub start: NaiveDateTime,
    /// `None` while the session is open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDateTime>,
    /// Wall-clock seconds, computed when the session closes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

impl SessionRecord {
    /// Opens a new session record at `start`.
    #[must_use]
    pub const fn open(start: NaiveDateTime) -> Self {
        Self {
            start,
            end: None,
            duration: None,
        }
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Closes the record, computing its duration. Ends before the start
    /// clamp to zero.
    pub fn close(&mut self, end: NaiveDateTime) {
        let secs = (end - self.start).num_seconds().max(0);
        self.end = Some(end);
        self.duration = Some(u32::try_from(secs).unwrap_or(u32::MAX));
    }
}

/// Accumulated effective usage for one category on one calendar day.
///
/// `total_seconds` is monotonically non-decreasing within a day and never
/// exceeds the category's daily limit once capping is applied. The by-domain
/// map attributes a subset of the total to individual domains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    #[serde(default)]
    pub total_seconds: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sessions: Vec<SessionRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_domain: BTreeMap<DomainName, u64>,
}

impl DailyUsage {
    /// Number of sessions that have ended.
    #[must_use]
    pub fn completed_sessions(&self) -> u32 {
        let n = self.sessions.iter().filter(|s| !s.is_open()).count();
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn has_open_session(&self) -> bool {
        self.sessions.iter().any(SessionRecord::is_open)
    }
}

/// Aggregated usage over a span of days.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PeriodStats {
    pub total_seconds: u64,
    pub by_category: BTreeMap<CategoryKey, u64>,
    pub by_domain: BTreeMap<DomainName, u64>,
    pub by_date: BTreeMap<DayKey, u64>,
}

impl PeriodStats {
    /// Folds per-day usage records into period totals.
    pub fn aggregate<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (DayKey, CategoryKey, DailyUsage)>,
    {
        let mut stats = Self::default();
        for (day, category, usage) in entries {
            stats.total_seconds += usage.total_seconds;
            *stats.by_category.entry(category).or_default() += usage.total_seconds;
            *stats.by_date.entry(day).or_default() += usage.total_seconds;
            for (domain, seconds) in usage.by_domain {
                *stats.by_domain.entry(domain).or_default() += seconds;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        s.parse().unwrap()
    }

    #[test]
    fn session_record_close_computes_duration() {
        let mut s = SessionRecord::open(dt("2026-03-01T10:00:00"));
        assert!(s.is_open());
        s.close(dt("2026-03-01T10:30:00"));
        assert!(!s.is_open());
        assert_eq!(s.duration, Some(1800));
    }

    #[test]
    fn session_record_close_clamps_backwards_clock() {
        let mut s = SessionRecord::open(dt("2026-03-01T10:00:00"));
        s.close(dt("2026-03-01T09:59:00"));
        assert_eq!(s.duration, Some(0));
    }

    #[test]
    fn daily_usage_counts_completed_sessions() {
        let mut usage = DailyUsage::default();
        let mut done = SessionRecord::open(dt("2026-03-01T09:00:00"));
        done.close(dt("2026-03-01T09:20:00"));
        usage.sessions.push(done);
        usage.sessions.push(SessionRecord::open(dt("2026-03-01T10:00:00")));

        assert_eq!(usage.completed_sessions(), 1);
        assert!(usage.has_open_session());
    }

    #[test]
    fn period_stats_aggregates_across_days() {
        let video = CategoryKey::new("video").unwrap();
        let social = CategoryKey::new("social").unwrap();
        let yt = DomainName::new("youtube.com").unwrap();

        let day1: DayKey = "2026-03-01".parse().unwrap();
        let day2: DayKey = "2026-03-02".parse().unwrap();

        let mut u1 = DailyUsage {
            total_seconds: 600,
            ..DailyUsage::default()
        };
        u1.by_domain.insert(yt.clone(), 600);
        let u2 = DailyUsage {
            total_seconds: 300,
            ..DailyUsage::default()
        };
        let mut u3 = DailyUsage {
            total_seconds: 100,
            ..DailyUsage::default()
        };
        u3.by_domain.insert(yt.clone(), 50);

        let stats = PeriodStats::aggregate([
            (day1, video.clone(), u1),
            (day1, social.clone(), u2),
            (day2, video.clone(), u3),
        ]);

        assert_eq!(stats.total_seconds, 1000);
        assert_eq!(stats.by_category[&video], 700);
        assert_eq!(stats.by_category[&social], 300);
        assert_eq!(stats.by_date[&day1], 900);
        assert_eq!(stats.by_date[&day2], 100);
        assert_eq!(stats.by_domain[&yt], 650);
    }
}
