//! Broadcast notifications from the core to presentation layers.

use serde::{Deserialize, Serialize};

use crate::decision::AccrualReason;
use crate::types::CategoryKey;

/// A fire-and-forget event published by the core.
///
/// Delivery is best-effort: transports swallow their own failures, the
/// core never waits on a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notice {
    /// A session or daily cap was hit during accrual.
    LimitReached {
        category: CategoryKey,
        reason: AccrualReason,
    },
    /// An access check ran into a forbidden time-of-day window.
    ForbiddenPeriodActive { category: CategoryKey },
    /// Rest periods elapsed for these categories.
    RestPeriodsEnded { categories: Vec<CategoryKey> },
    /// The day rolled over; all counters reset.
    DailyReset,
}

/// Where notices go. Implementations must not fail the caller.
pub trait NoticeSink {
    fn publish(&mut self, notice: Notice);
}

/// Discards every notice.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NoticeSink for NullSink {
    fn publish(&mut self, _notice: Notice) {}
}

/// Collects notices in order; for tests and in-process consumers.
#[derive(Debug, Clone, Default)]
pub struct VecSink {
    pub notices: Vec<Notice>,
}

impl NoticeSink for VecSink {
    fn publish(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}
