//! Decision objects returned by the arbiter.
//!
//! Limit conditions are ordinary values with a `reason` tag, never errors:
//! a blocked category is an expected business outcome, and callers render
//! these objects directly.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Why access to a category is currently denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    ForbiddenPeriod,
    RestPeriod,
    DailyLimit,
    SessionsExhausted,
}

impl DenyReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ForbiddenPeriod => "forbidden_period",
            Self::RestPeriod => "rest_period",
            Self::DailyLimit => "daily_limit",
            Self::SessionsExhausted => "sessions_exhausted",
        }
    }
}

/// Why an accrual call stopped or skipped the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccrualReason {
    SessionLimitReached,
    DailyLimitReached,
    NotActiveTab,
}

impl AccrualReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SessionLimitReached => "session_limit_reached",
            Self::DailyLimitReached => "daily_limit_reached",
            Self::NotActiveTab => "not_active_tab",
        }
    }
}

/// The answer to "may this category be used right now?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    /// False for disabled or unconfigured categories, which are never
    /// restricted.
    pub has_limits: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    /// When the current denial clears (forbidden window end, rest end, or
    /// next midnight for a daily cap).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_allowed: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_remaining: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_remaining: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions_remaining: Option<u32>,
    /// Soft warning: less than a minute of session time left.
    #[serde(default)]
    pub is_warning: bool,
}

impl AccessDecision {
    /// Access with no limits configured (disabled or unknown category).
    #[must_use]
    pub const fn unrestricted() -> Self {
        Self {
            allowed: true,
            has_limits: false,
            reason: None,
            next_allowed: None,
            rest_remaining: None,
            daily_remaining: None,
            session_remaining: None,
            sessions_remaining: None,
            is_warning: false,
        }
    }

    /// A denial skeleton; callers fill in the remaining figures.
    #[must_use]
    pub const fn denied(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            has_limits: true,
            reason: Some(reason),
            next_allowed: None,
            rest_remaining: None,
            daily_remaining: None,
            session_remaining: None,
            sessions_remaining: None,
            is_warning: false,
        }
    }
}

/// The outcome of one effective-time report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualOutcome {
    pub allowed: bool,
    /// True when the report came from a non-authoritative tab and was not
    /// accrued.
    #[serde(default)]
    pub skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<AccrualReason>,
    /// Seconds actually committed — may be less than reported, due to
    /// capping at the daily limit.
    pub added_seconds: u64,
    pub session_effective: u32,
    #[serde(default)]
    pub rest_started: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessDecision>,
}

impl AccrualOutcome {
    /// No-op pass-through (zero/negative report, or unrestricted category).
    #[must_use]
    pub const fn pass_through() -> Self {
        Self {
            allowed: true,
            skipped: false,
            reason: None,
            added_seconds: 0,
            session_effective: 0,
            rest_started: false,
            rest_duration: None,
            access: None,
        }
    }

    /// Report accepted but not accrued: another tab is authoritative.
    #[must_use]
    pub const fn not_active_tab() -> Self {
        Self {
            allowed: true,
            skipped: true,
            reason: Some(AccrualReason::NotActiveTab),
            added_seconds: 0,
            session_effective: 0,
            rest_started: false,
            rest_duration: None,
            access: None,
        }
    }

    /// The report pushed the session over its duration cap.
    #[must_use]
    pub const fn session_limit(added: u64, rest_started: bool, rest_duration: Option<u32>) -> Self {
        Self {
            allowed: false,
            skipped: false,
            reason: Some(AccrualReason::SessionLimitReached),
            added_seconds: added,
            session_effective: 0,
            rest_started,
            rest_duration,
            access: None,
        }
    }

    /// The report landed on (or found) the daily cap.
    #[must_use]
    pub const fn daily_limit(added: u64) -> Self {
        Self {
            allowed: false,
            skipped: false,
            reason: Some(AccrualReason::DailyLimitReached),
            added_seconds: added,
            session_effective: 0,
            rest_started: false,
            rest_duration: None,
            access: None,
        }
    }
}

/// Result of a per-domain daily-cap check. Absent when the domain has no
/// configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainLimitStatus {
    pub allowed: bool,
    pub used: u64,
    pub limit: u32,
    pub remaining: u64,
}

/// Result of a session-start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOutcome {
    pub success: bool,
    /// True when a session was already open; no new record was created.
    #[serde(default)]
    pub already_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_start: Option<NaiveDateTime>,
    /// Present when the start was refused by policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub denied: Option<AccessDecision>,
}

/// Result of a session-end request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndOutcome {
    pub success: bool,
    pub rest_started: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_end: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deny_reason_serde_matches_as_str() {
        for reason in [
            DenyReason::ForbiddenPeriod,
            DenyReason::RestPeriod,
            DenyReason::DailyLimit,
            DenyReason::SessionsExhausted,
        ] {
            let value = serde_json::to_value(reason).unwrap();
            assert_eq!(value.as_str().unwrap(), reason.as_str());
        }
    }

    #[test]
    fn accrual_reason_serde_matches_as_str() {
        for reason in [
            AccrualReason::SessionLimitReached,
            AccrualReason::DailyLimitReached,
            AccrualReason::NotActiveTab,
        ] {
            let value = serde_json::to_value(reason).unwrap();
            assert_eq!(value.as_str().unwrap(), reason.as_str());
        }
    }

    #[test]
    fn skipped_outcome_shape() {
        let out = AccrualOutcome::not_active_tab();
        assert!(out.allowed);
        assert!(out.skipped);
        assert_eq!(out.added_seconds, 0);
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["reason"], "not_active_tab");
        assert_eq!(json["skipped"], true);
    }

    #[test]
    fn denial_omits_empty_fields_in_json() {
        let d = AccessDecision::denied(DenyReason::DailyLimit);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["reason"], "daily_limit");
        assert!(json.get("rest_remaining").is_none());
        assert!(json.get("next_allowed").is_none());
    }
}
