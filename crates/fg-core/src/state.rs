//! Per-category session/rest state machine.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Transient per-category state, persisted for crash recovery.
///
/// `in_session` and `in_rest` are mutually exclusive; the transition
/// methods below are the only intended way to flip them. Mutated only by
/// the arbiter and the daily rollover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveState {
    #[serde(default)]
    pub in_session: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_start: Option<NaiveDateTime>,
    /// Effective seconds accrued toward the *current* session's duration
    /// cap. Distinct from the daily total.
    #[serde(default)]
    pub session_effective: u32,
    #[serde(default)]
    pub in_rest: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_end: Option<NaiveDateTime>,
}

impl ActiveState {
    /// Enters a session, clearing any rest state.
    pub fn begin_session(&mut self, now: NaiveDateTime) {
        self.in_session = true;
        self.session_start = Some(now);
        self.session_effective = 0;
        self.in_rest = false;
        self.rest_end = None;
    }

    /// Leaves the session. With `rest_duration` set and non-zero, enters
    /// the mandatory rest instead of going idle. Returns whether rest
    /// started.
    pub fn finish_session(&mut self, now: NaiveDateTime, rest_duration: Option<u32>) -> bool {
        self.in_session = false;
        self.session_start = None;
        self.session_effective = 0;
        match rest_duration {
            Some(secs) if secs > 0 => {
                self.in_rest = true;
                self.rest_end = Some(now + Duration::seconds(i64::from(secs)));
                true
            }
            _ => {
                self.in_rest = false;
                self.rest_end = None;
                false
            }
        }
    }

    /// Whether an active rest has already elapsed at `now`.
    #[must_use]
    pub fn rest_expired(&self, now: NaiveDateTime) -> bool {
        self.in_rest && self.rest_end.is_none_or(|end| end <= now)
    }

    /// Seconds of rest remaining at `now`, when resting.
    #[must_use]
    pub fn rest_remaining(&self, now: NaiveDateTime) -> Option<u32> {
        if !self.in_rest {
            return None;
        }
        let end = self.rest_end?;
        let secs = (end - now).num_seconds().max(0);
        Some(u32::try_from(secs).unwrap_or(u32::MAX))
    }

    pub fn clear_rest(&mut self) {
        self.in_rest = false;
        self.rest_end = None;
    }

    /// No session and no rest.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        !self.in_session && !self.in_rest
    }
}
