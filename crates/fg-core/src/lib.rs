//! Core domain logic for the attention gate.
//!
//! This crate contains the fundamental types and logic for:
//! - Policy: deciding whether a category may be accessed right now
//! - Accrual: counting effective seconds against daily and session caps
//! - Arbitration: sessions, rests, batched persistence, daily rollover
//! - Coordination: tab authority and the message gateway

pub mod arbiter;
pub mod category;
pub mod decision;
pub mod gateway;
pub mod notice;
mod pending;
pub mod policy;
pub mod rollover;
pub mod state;
pub mod store;
pub mod tabs;
pub mod types;
pub mod usage;

#[cfg(test)]
mod testing;

pub use arbiter::{Arbiter, FLUSH_INTERVAL_SECS};
pub use category::{
    Category, CategoryKind, CategorySet, DomainLimit, ForbiddenPeriod, TimeOfDay,
    UnknownCategoryKind,
};
pub use decision::{
    AccessDecision, AccrualOutcome, AccrualReason, DenyReason, DomainLimitStatus, EndOutcome,
    StartOutcome,
};
pub use gateway::{CategoryStatus, Gateway, Request, Response, TabAck};
pub use notice::{Notice, NoticeSink, NullSink, VecSink};
pub use pending::PendingBatch;
pub use rollover::{RETENTION_DAYS, RolloverReport};
pub use state::ActiveState;
pub use store::{StateStore, UsageStore};
pub use tabs::TabRegistry;
pub use types::{CategoryKey, DayKey, DomainName, ValidationError};
pub use usage::{DailyUsage, PeriodStats, SessionRecord};
