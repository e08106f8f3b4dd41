//! The message-level entry point for detectors and presentation layers.
//!
//! Requests arrive as transport-agnostic typed messages; the gateway gates
//! accrual reports through tab authority, dispatches to the arbiter, and
//! publishes broadcast notices. Storage failures are caught here and turned
//! into fail-open responses: a storage hiccup must never wrongly block the
//! user, and the next successful read recomputes from merged state.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::arbiter::Arbiter;
use crate::category::{Category, DomainLimit};
use crate::decision::{
    AccessDecision, AccrualOutcome, AccrualReason, DenyReason, DomainLimitStatus, EndOutcome,
    StartOutcome,
};
use crate::notice::{Notice, NoticeSink};
use crate::state::ActiveState;
use crate::store::StateStore;
use crate::tabs::TabRegistry;
use crate::types::{CategoryKey, DayKey, DomainName};
use crate::usage::{DailyUsage, PeriodStats};

/// An inbound request. Serialized with `SCREAMING_SNAKE_CASE` type tags and
/// `camelCase` fields to match the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    GetCategoryForDomain { domain: String },
    #[serde(rename_all = "camelCase")]
    CheckDomainLimit { domain: String },
    #[serde(rename_all = "camelCase")]
    CanAccess { category_key: String },
    #[serde(rename_all = "camelCase")]
    StartSession { category_key: String },
    #[serde(rename_all = "camelCase")]
    EndSession {
        category_key: String,
        trigger_rest: bool,
    },
    #[serde(rename_all = "camelCase")]
    AddTime {
        category_key: String,
        #[serde(default)]
        domain: Option<String>,
        seconds: i64,
        tab_id: String,
    },
    #[serde(rename_all = "camelCase")]
    GetStatus { category_key: String },
    GetAllStatus,
    GetTodayStats,
    GetWeekStats,
    GetMonthStats,
    #[serde(rename_all = "camelCase")]
    SetDomainLimit {
        domain: String,
        #[serde(default)]
        daily_limit: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    RegisterTab {
        tab_id: String,
        category_key: String,
    },
    #[serde(rename_all = "camelCase")]
    UnregisterTab { tab_id: String },
    #[serde(rename_all = "camelCase")]
    ReportActivity {
        tab_id: String,
        category_key: String,
        is_active: bool,
    },
    #[serde(rename_all = "camelCase")]
    IsActiveTab {
        tab_id: String,
        category_key: String,
    },
}

/// Acknowledgement for tab-coordination requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabAck {
    pub success: bool,
    pub is_active: bool,
}

/// Composite per-category status for presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStatus {
    pub category: Category,
    pub usage: DailyUsage,
    pub state: ActiveState,
    pub access: AccessDecision,
}

/// The response to a [`Request`]. Serializes as the bare payload object.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Category(Option<Category>),
    DomainLimit(Option<DomainLimitStatus>),
    Access(AccessDecision),
    SessionStarted(StartOutcome),
    SessionEnded(EndOutcome),
    Accrual(AccrualOutcome),
    Status(Option<Box<CategoryStatus>>),
    AllStatus(Vec<CategoryStatus>),
    Stats(PeriodStats),
    DomainLimits(BTreeMap<DomainName, DomainLimit>),
    Tab(TabAck),
}

/// Dispatches requests to the arbiter, owning the ephemeral tab registry
/// and the notice sink.
#[derive(Debug)]
pub struct Gateway<S: StateStore, N: NoticeSink> {
    arbiter: Arbiter<S>,
    tabs: TabRegistry,
    sink: N,
    last_seen_day: Option<DayKey>,
}

impl<S: StateStore, N: NoticeSink> Gateway<S, N> {
    pub fn new(arbiter: Arbiter<S>, sink: N) -> Self {
        Self {
            arbiter,
            tabs: TabRegistry::new(),
            sink,
            last_seen_day: None,
        }
    }

    #[must_use]
    pub const fn arbiter(&self) -> &Arbiter<S> {
        &self.arbiter
    }

    pub const fn arbiter_mut(&mut self) -> &mut Arbiter<S> {
        &mut self.arbiter
    }

    #[must_use]
    pub const fn sink(&self) -> &N {
        &self.sink
    }

    /// Periodic maintenance: runs the day rollover when the calendar day
    /// has changed since the last call, and sweeps expired rests. Invoked
    /// implicitly before every request and by the host's timer.
    pub fn tick(&mut self, now: NaiveDateTime) {
        let today = DayKey::of(now);
        if let Some(last) = self.last_seen_day {
            if last != today {
                match self.arbiter.roll_over(now) {
                    Ok(report) => {
                        tracing::info!(
                            closed = report.closed_sessions.len(),
                            pruned = report.pruned_records,
                            "daily rollover complete"
                        );
                        self.sink.publish(Notice::DailyReset);
                    }
                    Err(e) => tracing::error!(error = %e, "daily rollover failed"),
                }
            }
        }
        self.last_seen_day = Some(today);

        match self.arbiter.sweep_expired_rests(now) {
            Ok(ended) if !ended.is_empty() => {
                self.sink.publish(Notice::RestPeriodsEnded { categories: ended });
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "rest sweep failed"),
        }
    }

    /// Flushes pending accrual; hosts call this on shutdown.
    pub fn flush(&mut self, now: NaiveDateTime) {
        if let Err(e) = self.arbiter.flush(now) {
            tracing::warn!(error = %e, "final flush failed");
        }
    }

    /// Handles one request to completion.
    pub fn handle(&mut self, request: Request, now: NaiveDateTime) -> Response {
        self.tick(now);
        match request {
            Request::GetCategoryForDomain { domain } => {
                let category = parse_domain(&domain)
                    .and_then(|d| self.arbiter.categories().category_for_domain(&d).cloned());
                Response::Category(category)
            }
            Request::CheckDomainLimit { domain } => {
                let Some(domain) = parse_domain(&domain) else {
                    return Response::DomainLimit(None);
                };
                match self.arbiter.check_domain_limit(&domain, now) {
                    Ok(status) => Response::DomainLimit(status),
                    Err(e) => {
                        tracing::warn!(error = %e, "domain limit check failed, failing open");
                        Response::DomainLimit(None)
                    }
                }
            }
            Request::CanAccess { category_key } => {
                let Some(key) = parse_key(&category_key) else {
                    return Response::Access(AccessDecision::unrestricted());
                };
                match self.arbiter.can_access(&key, now) {
                    Ok(decision) => {
                        if decision.reason == Some(DenyReason::ForbiddenPeriod) {
                            self.sink
                                .publish(Notice::ForbiddenPeriodActive { category: key });
                        }
                        Response::Access(decision)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "access check failed, failing open");
                        Response::Access(AccessDecision::unrestricted())
                    }
                }
            }
            Request::StartSession { category_key } => {
                let Some(key) = parse_key(&category_key) else {
                    return Response::SessionStarted(StartOutcome {
                        success: false,
                        already_active: false,
                        session_start: None,
                        denied: None,
                    });
                };
                match self.arbiter.start_session(&key, now) {
                    Ok(outcome) => Response::SessionStarted(outcome),
                    Err(e) => {
                        tracing::warn!(error = %e, "start_session failed");
                        Response::SessionStarted(StartOutcome {
                            success: false,
                            already_active: false,
                            session_start: None,
                            denied: None,
                        })
                    }
                }
            }
            Request::EndSession {
                category_key,
                trigger_rest,
            } => {
                let outcome = parse_key(&category_key)
                    .map(|key| self.arbiter.end_session(&key, now, trigger_rest))
                    .transpose()
                    .unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "end_session failed");
                        None
                    })
                    .unwrap_or(EndOutcome {
                        success: false,
                        rest_started: false,
                        rest_end: None,
                    });
                Response::SessionEnded(outcome)
            }
            Request::AddTime {
                category_key,
                domain,
                seconds,
                tab_id,
            } => {
                let Some(key) = parse_key(&category_key) else {
                    return Response::Accrual(AccrualOutcome::pass_through());
                };
                if !self.tabs.authorize_report(&key, &tab_id, now) {
                    return Response::Accrual(AccrualOutcome::not_active_tab());
                }
                let domain = domain.as_deref().and_then(parse_domain);
                match self
                    .arbiter
                    .add_effective_time(&key, domain.as_ref(), seconds, now)
                {
                    Ok(outcome) => {
                        if let Some(
                            reason @ (AccrualReason::SessionLimitReached
                            | AccrualReason::DailyLimitReached),
                        ) = outcome.reason
                        {
                            self.sink.publish(Notice::LimitReached {
                                category: key,
                                reason,
                            });
                        }
                        Response::Accrual(outcome)
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accrual failed, failing open");
                        Response::Accrual(AccrualOutcome::pass_through())
                    }
                }
            }
            Request::GetStatus { category_key } => {
                let status = parse_key(&category_key).and_then(|key| self.status_of(&key, now));
                Response::Status(status.map(Box::new))
            }
            Request::GetAllStatus => {
                let keys: Vec<CategoryKey> = self
                    .arbiter
                    .categories()
                    .iter()
                    .map(|c| c.key.clone())
                    .collect();
                let statuses = keys
                    .iter()
                    .filter_map(|key| self.status_of(key, now))
                    .collect();
                Response::AllStatus(statuses)
            }
            Request::GetTodayStats => self.stats_back(0, now),
            Request::GetWeekStats => self.stats_back(6, now),
            Request::GetMonthStats => self.stats_back(29, now),
            Request::SetDomainLimit {
                domain,
                daily_limit,
            } => {
                let Some(domain) = parse_domain(&domain) else {
                    return Response::DomainLimits(BTreeMap::new());
                };
                let limit = daily_limit.map(|daily_limit| DomainLimit { daily_limit });
                match self.arbiter.set_domain_limit(&domain, limit) {
                    Ok(limits) => Response::DomainLimits(limits),
                    Err(e) => {
                        tracing::warn!(error = %e, "set_domain_limit failed");
                        Response::DomainLimits(BTreeMap::new())
                    }
                }
            }
            Request::RegisterTab {
                tab_id,
                category_key,
            } => {
                let is_active = parse_key(&category_key)
                    .is_some_and(|key| self.tabs.register(&key, &tab_id, now));
                Response::Tab(TabAck {
                    success: true,
                    is_active,
                })
            }
            Request::UnregisterTab { tab_id } => {
                self.tabs.unregister(&tab_id);
                Response::Tab(TabAck {
                    success: true,
                    is_active: false,
                })
            }
            Request::ReportActivity {
                tab_id,
                category_key,
                is_active,
            } => {
                let authoritative = parse_key(&category_key)
                    .is_some_and(|key| self.tabs.report_activity(&key, &tab_id, is_active, now));
                Response::Tab(TabAck {
                    success: true,
                    is_active: authoritative,
                })
            }
            Request::IsActiveTab {
                tab_id,
                category_key,
            } => {
                let is_active = parse_key(&category_key)
                    .is_some_and(|key| self.tabs.is_authoritative(&key, &tab_id));
                Response::Tab(TabAck {
                    success: true,
                    is_active,
                })
            }
        }
    }

    fn status_of(&mut self, key: &CategoryKey, now: NaiveDateTime) -> Option<CategoryStatus> {
        let category = self.arbiter.categories().get(key)?.clone();
        let day = DayKey::of(now);
        let usage = match self.arbiter.merged_usage(day, key) {
            Ok(usage) => usage,
            Err(e) => {
                tracing::warn!(error = %e, "usage read failed");
                DailyUsage::default()
            }
        };
        let access = match self.arbiter.can_access(key, now) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(error = %e, "access check failed, failing open");
                AccessDecision::unrestricted()
            }
        };
        // Read the state after the access check, which may have cleared an
        // expired rest; the two fields must agree within one response.
        let state = match self.arbiter.store().active_state(key) {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "state read failed");
                ActiveState::default()
            }
        };
        Some(CategoryStatus {
            category,
            usage,
            state,
            access,
        })
    }

    fn stats_back(&self, days: u64, now: NaiveDateTime) -> Response {
        let today = DayKey::of(now);
        match self.arbiter.period_stats(today.days_back(days), today) {
            Ok(stats) => Response::Stats(stats),
            Err(e) => {
                tracing::warn!(error = %e, "stats read failed");
                Response::Stats(PeriodStats::default())
            }
        }
    }
}

fn parse_key(raw: &str) -> Option<CategoryKey> {
    CategoryKey::new(raw).ok()
}

fn parse_domain(raw: &str) -> Option<DomainName> {
    DomainName::new(raw).ok()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::category::{CategoryKind, CategorySet};
    use crate::notice::VecSink;
    use crate::store::UsageStore;
    use crate::testing::MemStore;

    fn dt(s: &str) -> NaiveDateTime {
        s.parse().unwrap()
    }

    fn gateway() -> Gateway<MemStore, VecSink> {
        let mut video = Category::new(
            CategoryKey::new("video").unwrap(),
            "Video",
            CategoryKind::Video,
        );
        video.patterns = vec!["youtube.com".to_string()];
        video.daily_limit = Some(3600);
        video.session_duration = Some(1800);
        video.rest_duration = Some(300);
        let set: CategorySet = [video].into_iter().collect();
        Gateway::new(Arbiter::new(MemStore::default(), set), VecSink::default())
    }

    fn add_time(seconds: i64, tab: &str) -> Request {
        Request::AddTime {
            category_key: "video".to_string(),
            domain: Some("youtube.com".to_string()),
            seconds,
            tab_id: tab.to_string(),
        }
    }

    #[test]
    fn request_wire_format() {
        let json = r#"{"type":"ADD_TIME","categoryKey":"video","domain":"youtube.com","seconds":5,"tabId":"tab-1"}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        assert_eq!(request, add_time(5, "tab-1"));

        let json = r#"{"type":"END_SESSION","categoryKey":"video","triggerRest":true}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        assert_eq!(
            request,
            Request::EndSession {
                category_key: "video".to_string(),
                trigger_rest: true,
            }
        );
    }

    #[test]
    fn category_lookup_by_domain() {
        let mut gw = gateway();
        let now = dt("2026-03-01T10:00:00");
        let Response::Category(Some(cat)) = gw.handle(
            Request::GetCategoryForDomain {
                domain: "music.youtube.com".to_string(),
            },
            now,
        ) else {
            panic!("expected a category");
        };
        assert_eq!(cat.key.as_str(), "video");

        let Response::Category(none) = gw.handle(
            Request::GetCategoryForDomain {
                domain: "example.org".to_string(),
            },
            now,
        ) else {
            panic!("expected a category response");
        };
        assert!(none.is_none());
    }

    #[test]
    fn second_tab_reports_are_skipped() {
        let mut gw = gateway();
        let now = dt("2026-03-01T10:00:00");
        gw.handle(
            Request::RegisterTab {
                tab_id: "tab-1".to_string(),
                category_key: "video".to_string(),
            },
            now,
        );

        let Response::Accrual(first) = gw.handle(add_time(5, "tab-1"), now) else {
            panic!("expected accrual");
        };
        assert!(!first.skipped);
        assert_eq!(first.added_seconds, 5);

        let Response::Accrual(second) =
            gw.handle(add_time(5, "tab-2"), now + Duration::seconds(1))
        else {
            panic!("expected accrual");
        };
        assert!(second.allowed);
        assert!(second.skipped);
        assert_eq!(second.reason, Some(AccrualReason::NotActiveTab));
        assert_eq!(second.added_seconds, 0);

        // Only the authoritative tab's seconds landed.
        let day = DayKey::of(now);
        let key = CategoryKey::new("video").unwrap();
        assert_eq!(
            gw.arbiter().merged_usage(day, &key).unwrap().total_seconds,
            5
        );
    }

    #[test]
    fn limit_reached_notice_is_published() {
        let mut gw = gateway();
        let now = dt("2026-03-01T10:00:00");
        gw.arbiter_mut()
            .store_mut()
            .add_category_seconds(DayKey::of(now), &CategoryKey::new("video").unwrap(), 3599)
            .unwrap();

        let Response::Accrual(outcome) = gw.handle(add_time(10, "tab-1"), now) else {
            panic!("expected accrual");
        };
        assert_eq!(outcome.reason, Some(AccrualReason::DailyLimitReached));
        assert!(gw.sink().notices.iter().any(|n| matches!(
            n,
            Notice::LimitReached {
                reason: AccrualReason::DailyLimitReached,
                ..
            }
        )));
    }

    #[test]
    fn day_change_triggers_rollover_and_reset_notice() {
        let mut gw = gateway();
        let evening = dt("2026-03-01T23:50:00");
        gw.handle(
            Request::StartSession {
                category_key: "video".to_string(),
            },
            evening,
        );

        let Response::Access(decision) = gw.handle(
            Request::CanAccess {
                category_key: "video".to_string(),
            },
            dt("2026-03-02T00:01:00"),
        ) else {
            panic!("expected access");
        };
        assert!(decision.allowed);
        assert!(gw.sink().notices.contains(&Notice::DailyReset));

        // The dangling session was closed into March 1st.
        let prev: DayKey = "2026-03-01".parse().unwrap();
        let key = CategoryKey::new("video").unwrap();
        let usage = gw.arbiter().store().daily_usage(prev, &key).unwrap();
        assert_eq!(usage.completed_sessions(), 1);
    }

    #[test]
    fn rest_end_notice_on_tick() {
        let mut gw = gateway();
        let now = dt("2026-03-01T10:00:00");
        gw.handle(
            Request::StartSession {
                category_key: "video".to_string(),
            },
            now,
        );
        gw.handle(
            Request::EndSession {
                category_key: "video".to_string(),
                trigger_rest: true,
            },
            now + Duration::seconds(600),
        );

        gw.tick(now + Duration::seconds(1000));
        assert!(gw.sink().notices.iter().any(|n| matches!(
            n,
            Notice::RestPeriodsEnded { categories } if categories.len() == 1
        )));
    }

    #[test]
    fn status_includes_usage_state_and_access() {
        let mut gw = gateway();
        let now = dt("2026-03-01T10:00:00");
        gw.handle(
            Request::StartSession {
                category_key: "video".to_string(),
            },
            now,
        );
        gw.handle(add_time(120, "tab-1"), now + Duration::seconds(120));

        let Response::Status(Some(status)) = gw.handle(
            Request::GetStatus {
                category_key: "video".to_string(),
            },
            now + Duration::seconds(121),
        ) else {
            panic!("expected status");
        };
        assert_eq!(status.usage.total_seconds, 120);
        assert!(status.state.in_session);
        assert!(status.access.allowed);
        assert_eq!(status.access.session_remaining, Some(1680));
    }

    #[test]
    fn status_state_agrees_with_access_after_rest_expires() {
        let mut gw = gateway();
        let now = dt("2026-03-01T10:00:00");
        gw.handle(
            Request::StartSession {
                category_key: "video".to_string(),
            },
            now,
        );
        gw.handle(
            Request::EndSession {
                category_key: "video".to_string(),
                trigger_rest: true,
            },
            now + Duration::seconds(600),
        );

        // Well past the 300-second rest.
        let Response::Status(Some(status)) = gw.handle(
            Request::GetStatus {
                category_key: "video".to_string(),
            },
            now + Duration::seconds(1200),
        ) else {
            panic!("expected status");
        };
        assert!(status.access.allowed);
        assert!(!status.state.in_rest);
    }

    #[test]
    fn stats_requests_cover_periods() {
        let mut gw = gateway();
        let now = dt("2026-03-10T10:00:00");
        let key = CategoryKey::new("video").unwrap();
        let today = DayKey::of(now);
        // Ten days ago: outside the week window, inside the month window.
        gw.arbiter_mut()
            .store_mut()
            .add_category_seconds(today.days_back(10), &key, 500)
            .unwrap();
        gw.handle(add_time(100, "tab-1"), now);

        let Response::Stats(today_stats) = gw.handle(Request::GetTodayStats, now) else {
            panic!("expected stats");
        };
        assert_eq!(today_stats.total_seconds, 100);

        let Response::Stats(week) = gw.handle(Request::GetWeekStats, now) else {
            panic!("expected stats");
        };
        assert_eq!(week.total_seconds, 100);

        let Response::Stats(month) = gw.handle(Request::GetMonthStats, now) else {
            panic!("expected stats");
        };
        assert_eq!(month.total_seconds, 600);
    }

    #[test]
    fn set_domain_limit_updates_map() {
        let mut gw = gateway();
        let now = dt("2026-03-01T10:00:00");
        let Response::DomainLimits(limits) = gw.handle(
            Request::SetDomainLimit {
                domain: "youtube.com".to_string(),
                daily_limit: Some(600),
            },
            now,
        ) else {
            panic!("expected limits");
        };
        assert_eq!(
            limits[&DomainName::new("youtube.com").unwrap()].daily_limit,
            600
        );

        let Response::DomainLimit(Some(status)) = gw.handle(
            Request::CheckDomainLimit {
                domain: "youtube.com".to_string(),
            },
            now,
        ) else {
            panic!("expected status");
        };
        assert!(status.allowed);
        assert_eq!(status.limit, 600);
    }

    #[test]
    fn unknown_category_requests_fail_open() {
        let mut gw = gateway();
        let now = dt("2026-03-01T10:00:00");
        let Response::Access(decision) = gw.handle(
            Request::CanAccess {
                category_key: "nope".to_string(),
            },
            now,
        ) else {
            panic!("expected access");
        };
        assert!(decision.allowed);
        assert!(!decision.has_limits);
    }
}
