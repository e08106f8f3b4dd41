//! Category configuration: limits, forbidden windows, domain matching.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::types::{CategoryKey, DomainName};

/// The broad kind of content a category covers.
///
/// The kind is informational for the core (detectors pick a measurement
/// strategy from it); arbitration treats all kinds identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CategoryKind {
    Video,
    Reading,
    Social,
    Audio,
    #[default]
    Other,
}

impl CategoryKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Reading => "reading",
            Self::Social => "social",
            Self::Audio => "audio",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryKind {
    type Err = UnknownCategoryKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Self::Video),
            "reading" => Ok(Self::Reading),
            "social" => Ok(Self::Social),
            "audio" => Ok(Self::Audio),
            "other" => Ok(Self::Other),
            _ => Err(UnknownCategoryKind(s.to_string())),
        }
    }
}

impl Serialize for CategoryKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CategoryKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown category kind strings.
#[derive(Debug, Clone)]
pub struct UnknownCategoryKind(String);

impl fmt::Display for UnknownCategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown category kind: {}", self.0)
    }
}

impl std::error::Error for UnknownCategoryKind {}

/// A wall-clock time of day, minute resolution, rendered as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// Creates a time of day, returning `None` for out-of-range values.
    #[must_use]
    pub const fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    /// As a chrono `NaiveTime` at second zero.
    #[must_use]
    pub fn as_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Error type for malformed `HH:MM` strings.
#[derive(Debug, Clone)]
pub struct InvalidTimeOfDay(String);

impl fmt::Display for InvalidTimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time of day: {}", self.0)
    }
}

impl std::error::Error for InvalidTimeOfDay {}

impl FromStr for TimeOfDay {
    type Err = InvalidTimeOfDay;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || InvalidTimeOfDay(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(err)?;
        let hour: u8 = h.parse().map_err(|_| err())?;
        let minute: u8 = m.parse().map_err(|_| err())?;
        Self::new(hour, minute).ok_or_else(err)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = InvalidTimeOfDay;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

/// A recurring daily window during which a category is always blocked.
///
/// Windows may wrap midnight: `{start: 22:00, end: 08:00}` blocks from
/// 22:00 through 08:00 the next morning. The window is half-open — the end
/// minute itself is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForbiddenPeriod {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl ForbiddenPeriod {
    /// Whether the given wall-clock time falls inside this window.
    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        let t = time.hour() * 60 + time.minute();
        let start = u32::from(self.start.hour) * 60 + u32::from(self.start.minute);
        let end = u32::from(self.end.hour) * 60 + u32::from(self.end.minute);
        if start <= end {
            t >= start && t < end
        } else {
            // Wraps midnight
            t >= start || t < end
        }
    }

    /// The next timestamp at which this window stops blocking, given a
    /// `now` that is inside the window.
    #[must_use]
    pub fn next_end(&self, now: NaiveDateTime) -> NaiveDateTime {
        let candidate = now.date().and_time(self.end.as_time());
        if candidate > now {
            candidate
        } else {
            candidate + Days::new(1)
        }
    }
}

/// A configured grouping of domains sharing one set of limits.
///
/// Categories are created and edited by the configuration surface and are
/// read-only to the arbitration core. All durations are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub key: CategoryKey,
    pub name: String,
    #[serde(default)]
    pub kind: CategoryKind,
    /// Domain suffixes this category claims (lowercase).
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Total effective seconds allowed per day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<u32>,
    /// Effective seconds allowed per session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_duration: Option<u32>,
    /// Number of sessions allowed per day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_count: Option<u32>,
    /// Mandatory cooldown after a session ends at its limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forbidden_periods: Vec<ForbiddenPeriod>,
    /// Detector hint: seconds of inactivity before time stops counting.
    /// Not consulted by arbitration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<u32>,
}

const fn default_enabled() -> bool {
    true
}

impl Category {
    /// Creates an enabled category with no limits configured.
    #[must_use]
    pub fn new(key: CategoryKey, name: impl Into<String>, kind: CategoryKind) -> Self {
        Self {
            key,
            name: name.into(),
            kind,
            patterns: Vec::new(),
            enabled: true,
            daily_limit: None,
            session_duration: None,
            session_count: None,
            rest_duration: None,
            forbidden_periods: Vec::new(),
            idle_timeout: None,
        }
    }

    /// Whether a domain matches one of this category's patterns.
    ///
    /// A pattern matches the domain itself and any subdomain of it:
    /// `youtube.com` matches `youtube.com` and `music.youtube.com`.
    #[must_use]
    pub fn matches_domain(&self, domain: &DomainName) -> bool {
        let d = domain.as_str();
        self.patterns.iter().any(|p| {
            d == p || (d.len() > p.len() && d.ends_with(p) && d.as_bytes()[d.len() - p.len() - 1] == b'.')
        })
    }

    /// The forbidden window containing `now`, if any.
    #[must_use]
    pub fn forbidden_at(&self, now: NaiveDateTime) -> Option<&ForbiddenPeriod> {
        self.forbidden_periods.iter().find(|p| p.contains(now.time()))
    }
}

/// An independent per-domain daily cap, checked with higher priority than
/// any category limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainLimit {
    pub daily_limit: u32,
}

/// The full set of configured categories, keyed by stable key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategorySet {
    categories: BTreeMap<CategoryKey, Category>,
}

impl CategorySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: Category) {
        self.categories.insert(category.key.clone(), category);
    }

    #[must_use]
    pub fn get(&self, key: &CategoryKey) -> Option<&Category> {
        self.categories.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Resolves a domain to its category.
    ///
    /// Every tracked domain belongs to at most one category; if patterns
    /// overlap, the first match in key order wins.
    #[must_use]
    pub fn category_for_domain(&self, domain: &DomainName) -> Option<&Category> {
        self.categories.values().find(|c| c.matches_domain(domain))
    }
}

impl FromIterator<Category> for CategorySet {
    fn from_iter<T: IntoIterator<Item = Category>>(iter: T) -> Self {
        let mut set = Self::new();
        for category in iter {
            set.insert(category);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        s.parse().unwrap()
    }

    fn tod(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn kind_roundtrip_all_variants() {
        for kind in [
            CategoryKind::Video,
            CategoryKind::Reading,
            CategoryKind::Social,
            CategoryKind::Audio,
            CategoryKind::Other,
        ] {
            let s = kind.to_string();
            let parsed: CategoryKind = s.parse().expect("should parse");
            assert_eq!(parsed, kind, "roundtrip failed for {kind:?}");
        }
    }

    #[test]
    fn kind_unknown_errors() {
        let result: Result<CategoryKind, _> = "gaming".parse();
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "unknown category kind: gaming"
        );
    }

    #[test]
    fn time_of_day_parses_and_rejects() {
        assert_eq!(tod("22:00").to_string(), "22:00");
        assert_eq!(tod("08:05").to_string(), "08:05");
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("12:60".parse::<TimeOfDay>().is_err());
        assert!("noon".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn forbidden_period_plain_window() {
        let p = ForbiddenPeriod {
            start: tod("09:00"),
            end: tod("17:00"),
        };
        assert!(p.contains(dt("2026-03-01T12:00:00").time()));
        assert!(p.contains(dt("2026-03-01T09:00:00").time()));
        assert!(!p.contains(dt("2026-03-01T17:00:00").time()));
        assert!(!p.contains(dt("2026-03-01T08:59:00").time()));
    }

    #[test]
    fn forbidden_period_wraps_midnight() {
        let p = ForbiddenPeriod {
            start: tod("22:00"),
            end: tod("08:00"),
        };
        assert!(p.contains(dt("2026-03-01T23:30:00").time()));
        assert!(p.contains(dt("2026-03-01T02:00:00").time()));
        assert!(!p.contains(dt("2026-03-01T10:00:00").time()));
    }

    #[test]
    fn forbidden_period_next_end() {
        let p = ForbiddenPeriod {
            start: tod("22:00"),
            end: tod("08:00"),
        };
        // Before midnight: the window ends tomorrow morning.
        assert_eq!(
            p.next_end(dt("2026-03-01T23:30:00")),
            dt("2026-03-02T08:00:00")
        );
        // After midnight: the window ends this morning.
        assert_eq!(
            p.next_end(dt("2026-03-02T02:00:00")),
            dt("2026-03-02T08:00:00")
        );
    }

    #[test]
    fn domain_matching_is_suffix_based() {
        let mut cat = Category::new(
            CategoryKey::new("video").unwrap(),
            "Video",
            CategoryKind::Video,
        );
        cat.patterns = vec!["youtube.com".to_string(), "vimeo.com".to_string()];

        assert!(cat.matches_domain(&DomainName::new("youtube.com").unwrap()));
        assert!(cat.matches_domain(&DomainName::new("music.youtube.com").unwrap()));
        assert!(!cat.matches_domain(&DomainName::new("notyoutube.com").unwrap()));
        assert!(!cat.matches_domain(&DomainName::new("youtube.com.evil.net").unwrap()));
    }

    #[test]
    fn category_set_resolves_domain() {
        let mut video = Category::new(
            CategoryKey::new("video").unwrap(),
            "Video",
            CategoryKind::Video,
        );
        video.patterns = vec!["youtube.com".to_string()];
        let mut social = Category::new(
            CategoryKey::new("social").unwrap(),
            "Social",
            CategoryKind::Social,
        );
        social.patterns = vec!["twitter.com".to_string()];

        let set: CategorySet = [video, social].into_iter().collect();

        let hit = set
            .category_for_domain(&DomainName::new("twitter.com").unwrap())
            .unwrap();
        assert_eq!(hit.key.as_str(), "social");
        assert!(set
            .category_for_domain(&DomainName::new("example.org").unwrap())
            .is_none());
    }

    #[test]
    fn category_serde_defaults() {
        let json = r#"{"key":"video","name":"Video"}"#;
        let cat: Category = serde_json::from_str(json).unwrap();
        assert!(cat.enabled);
        assert_eq!(cat.kind, CategoryKind::Other);
        assert!(cat.daily_limit.is_none());
        assert!(cat.forbidden_periods.is_empty());

        // Full round trip compares equal field for field.
        let mut configured = cat.clone();
        configured.daily_limit = Some(3600);
        configured.forbidden_periods = vec![ForbiddenPeriod {
            start: tod("22:00"),
            end: tod("08:00"),
        }];
        let json = serde_json::to_string(&configured).unwrap();
        let parsed: Category = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, configured);
    }

    #[test]
    fn forbidden_period_serde_uses_hhmm() {
        let p = ForbiddenPeriod {
            start: tod("22:00"),
            end: tod("08:00"),
        };
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"start":"22:00","end":"08:00"}"#);
        let parsed: ForbiddenPeriod = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, p);
    }
}
