//! Pure access-policy evaluation.
//!
//! Evaluation takes immutable snapshots (config, merged usage view, active
//! state) and returns a decision; the only state change it can *request* is
//! clearing an expired rest, reported back via [`Evaluation::rest_cleared`]
//! for the arbiter to persist.

use chrono::NaiveDateTime;

use crate::category::{Category, DomainLimit};
use crate::decision::{AccessDecision, DenyReason, DomainLimitStatus};
use crate::state::ActiveState;
use crate::types::DayKey;

/// Session time left below this threshold flags a soft warning.
pub const SESSION_WARNING_SECS: u32 = 60;

/// Merged (committed + pending) usage figures the policy evaluates against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageView {
    pub total_seconds: u64,
    pub completed_sessions: u32,
}

/// An access decision plus the lazy-clear side effect it requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: AccessDecision,
    /// The rest period had already elapsed; the caller must persist the
    /// cleared flag.
    pub rest_cleared: bool,
}

/// Evaluates category access in strict priority order: forbidden period,
/// rest period, daily limit, session count. The first matching denial wins.
#[must_use]
pub fn evaluate_access(
    category: &Category,
    view: UsageView,
    state: &ActiveState,
    now: NaiveDateTime,
) -> Evaluation {
    if !category.enabled {
        return Evaluation {
            decision: AccessDecision::unrestricted(),
            rest_cleared: false,
        };
    }

    if let Some(period) = category.forbidden_at(now) {
        let mut decision = AccessDecision::denied(DenyReason::ForbiddenPeriod);
        decision.next_allowed = Some(period.next_end(now));
        return Evaluation {
            decision,
            rest_cleared: false,
        };
    }

    let mut rest_cleared = false;
    if state.in_rest {
        if state.rest_expired(now) {
            rest_cleared = true;
        } else {
            let mut decision = AccessDecision::denied(DenyReason::RestPeriod);
            decision.rest_remaining = state.rest_remaining(now);
            decision.next_allowed = state.rest_end;
            return Evaluation {
                decision,
                rest_cleared: false,
            };
        }
    }

    let next_midnight = DayKey::of(now).end();

    if let Some(limit) = category.daily_limit {
        if view.total_seconds >= u64::from(limit) {
            let mut decision = AccessDecision::denied(DenyReason::DailyLimit);
            decision.next_allowed = Some(next_midnight);
            decision.daily_remaining = Some(0);
            return Evaluation {
                decision,
                rest_cleared,
            };
        }
    }

    let sessions_used = view.completed_sessions + u32::from(state.in_session);
    if let Some(count) = category.session_count {
        if sessions_used >= count && !state.in_session {
            let mut decision = AccessDecision::denied(DenyReason::SessionsExhausted);
            decision.next_allowed = Some(next_midnight);
            decision.sessions_remaining = Some(0);
            return Evaluation {
                decision,
                rest_cleared,
            };
        }
    }

    let session_remaining = category.session_duration.map(|d| {
        if state.in_session {
            d.saturating_sub(state.session_effective)
        } else {
            d
        }
    });

    let decision = AccessDecision {
        allowed: true,
        has_limits: true,
        reason: None,
        next_allowed: None,
        rest_remaining: None,
        daily_remaining: category
            .daily_limit
            .map(|l| u64::from(l).saturating_sub(view.total_seconds)),
        session_remaining,
        sessions_remaining: category
            .session_count
            .map(|c| c.saturating_sub(sessions_used)),
        is_warning: session_remaining.is_some_and(|r| r <= SESSION_WARNING_SECS),
    };
    Evaluation {
        decision,
        rest_cleared,
    }
}

/// Evaluates a per-domain daily cap against merged usage.
#[must_use]
pub fn domain_limit_status(limit: DomainLimit, used: u64) -> DomainLimitStatus {
    let cap = u64::from(limit.daily_limit);
    DomainLimitStatus {
        allowed: used < cap,
        used,
        limit: limit.daily_limit,
        remaining: cap.saturating_sub(used),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::{CategoryKind, ForbiddenPeriod};
    use crate::types::CategoryKey;

    fn dt(s: &str) -> NaiveDateTime {
        s.parse().unwrap()
    }

    fn category() -> Category {
        let mut cat = Category::new(
            CategoryKey::new("video").unwrap(),
            "Video",
            CategoryKind::Video,
        );
        cat.daily_limit = Some(3600);
        cat.session_duration = Some(1800);
        cat.session_count = Some(3);
        cat.rest_duration = Some(300);
        cat
    }

    #[test]
    fn disabled_category_is_unrestricted() {
        let mut cat = category();
        cat.enabled = false;
        let eval = evaluate_access(
            &cat,
            UsageView {
                total_seconds: 999_999,
                completed_sessions: 99,
            },
            &ActiveState::default(),
            dt("2026-03-01T12:00:00"),
        );
        assert!(eval.decision.allowed);
        assert!(!eval.decision.has_limits);
    }

    #[test]
    fn forbidden_period_wins_over_everything() {
        let mut cat = category();
        cat.forbidden_periods = vec![ForbiddenPeriod {
            start: "22:00".parse().unwrap(),
            end: "08:00".parse().unwrap(),
        }];
        // Also resting and over the daily limit; forbidden still reported.
        let state = ActiveState {
            in_rest: true,
            rest_end: Some(dt("2026-03-02T06:00:00")),
            ..ActiveState::default()
        };
        let eval = evaluate_access(
            &cat,
            UsageView {
                total_seconds: 4000,
                completed_sessions: 0,
            },
            &state,
            dt("2026-03-01T23:30:00"),
        );
        assert_eq!(eval.decision.reason, Some(DenyReason::ForbiddenPeriod));
        assert_eq!(eval.decision.next_allowed, Some(dt("2026-03-02T08:00:00")));
    }

    #[test]
    fn active_rest_denies_with_remaining() {
        let state = ActiveState {
            in_rest: true,
            rest_end: Some(dt("2026-03-01T12:02:00")),
            ..ActiveState::default()
        };
        let eval = evaluate_access(
            &category(),
            UsageView::default(),
            &state,
            dt("2026-03-01T12:00:00"),
        );
        assert_eq!(eval.decision.reason, Some(DenyReason::RestPeriod));
        assert_eq!(eval.decision.rest_remaining, Some(120));
        assert!(!eval.rest_cleared);
    }

    #[test]
    fn expired_rest_is_cleared_and_evaluation_continues() {
        let state = ActiveState {
            in_rest: true,
            rest_end: Some(dt("2026-03-01T11:00:00")),
            ..ActiveState::default()
        };
        let eval = evaluate_access(
            &category(),
            UsageView::default(),
            &state,
            dt("2026-03-01T12:00:00"),
        );
        assert!(eval.decision.allowed);
        assert!(eval.rest_cleared);
    }

    #[test]
    fn daily_limit_denies_at_exactly_limit() {
        let eval = evaluate_access(
            &category(),
            UsageView {
                total_seconds: 3600,
                completed_sessions: 0,
            },
            &ActiveState::default(),
            dt("2026-03-01T12:00:00"),
        );
        assert_eq!(eval.decision.reason, Some(DenyReason::DailyLimit));
        assert_eq!(eval.decision.next_allowed, Some(dt("2026-03-02T00:00:00")));
    }

    #[test]
    fn sessions_exhausted_independent_of_daily_limit() {
        let eval = evaluate_access(
            &category(),
            UsageView {
                total_seconds: 0,
                completed_sessions: 3,
            },
            &ActiveState::default(),
            dt("2026-03-01T12:00:00"),
        );
        assert_eq!(eval.decision.reason, Some(DenyReason::SessionsExhausted));
        assert_eq!(eval.decision.sessions_remaining, Some(0));
    }

    #[test]
    fn open_session_is_not_exhausted_by_its_own_count() {
        // Two completed plus the open one hits the cap of 3, but an active
        // session keeps its access.
        let state = ActiveState {
            in_session: true,
            session_start: Some(dt("2026-03-01T11:00:00")),
            session_effective: 600,
            ..ActiveState::default()
        };
        let eval = evaluate_access(
            &category(),
            UsageView {
                total_seconds: 1200,
                completed_sessions: 2,
            },
            &state,
            dt("2026-03-01T12:00:00"),
        );
        assert!(eval.decision.allowed);
        assert_eq!(eval.decision.sessions_remaining, Some(0));
        assert_eq!(eval.decision.session_remaining, Some(1200));
    }

    #[test]
    fn allowed_reports_remaining_figures() {
        let eval = evaluate_access(
            &category(),
            UsageView {
                total_seconds: 1000,
                completed_sessions: 1,
            },
            &ActiveState::default(),
            dt("2026-03-01T12:00:00"),
        );
        let d = eval.decision;
        assert!(d.allowed);
        assert_eq!(d.daily_remaining, Some(2600));
        assert_eq!(d.session_remaining, Some(1800));
        assert_eq!(d.sessions_remaining, Some(2));
        assert!(!d.is_warning);
    }

    #[test]
    fn warning_flag_near_session_end() {
        let state = ActiveState {
            in_session: true,
            session_start: Some(dt("2026-03-01T11:00:00")),
            session_effective: 1750,
            ..ActiveState::default()
        };
        let eval = evaluate_access(
            &category(),
            UsageView {
                total_seconds: 1750,
                completed_sessions: 0,
            },
            &state,
            dt("2026-03-01T12:00:00"),
        );
        assert!(eval.decision.allowed);
        assert_eq!(eval.decision.session_remaining, Some(50));
        assert!(eval.decision.is_warning);
    }

    #[test]
    fn domain_limit_status_math() {
        let limit = DomainLimit { daily_limit: 600 };
        let ok = domain_limit_status(limit, 400);
        assert!(ok.allowed);
        assert_eq!(ok.remaining, 200);

        let blocked = domain_limit_status(limit, 600);
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);
    }
}
