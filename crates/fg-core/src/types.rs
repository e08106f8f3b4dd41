//! Core identifier and calendar types with validation.

use std::fmt;

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A domain name contained characters outside the allowed set.
    #[error("invalid domain name: {value}")]
    InvalidDomain { value: String },

    /// A day key was not in `YYYY-MM-DD` form.
    #[error("invalid day key: {value}")]
    InvalidDayKey { value: String },
}

/// Generates a validated string key newtype with common trait implementations.
macro_rules! define_string_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Returns the key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(key: $name) -> Self {
                key.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_key!(
    /// A stable category key (e.g., "video", "social-media").
    ///
    /// Keys identify one configured category across config edits; they must
    /// be non-empty.
    CategoryKey
);

impl CategoryKey {
    /// Creates a new key after validation.
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ValidationError::Empty {
                field: "category key",
            });
        }
        Ok(Self(key))
    }
}

define_string_key!(
    /// A normalized domain name (e.g., "youtube.com").
    ///
    /// Domains are lowercased on construction so that lookups and per-domain
    /// accounting are case-insensitive.
    DomainName
);

impl DomainName {
    /// Creates a new domain name, normalizing to lowercase.
    pub fn new(domain: impl Into<String>) -> Result<Self, ValidationError> {
        let domain = domain.into().trim().to_ascii_lowercase();
        if domain.is_empty() {
            return Err(ValidationError::Empty {
                field: "domain name",
            });
        }
        if !domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(ValidationError::InvalidDomain { value: domain });
        }
        Ok(Self(domain))
    }
}

/// A local calendar day, used as the partitioning key for daily usage.
///
/// Renders as `YYYY-MM-DD`. Day keys always refer to the *local* wall-clock
/// day; the embedding layer is responsible for supplying local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(NaiveDate);

impl DayKey {
    /// The day key for the given local timestamp.
    #[must_use]
    pub const fn of(now: NaiveDateTime) -> Self {
        Self(now.date())
    }

    /// Wraps an explicit date.
    #[must_use]
    pub const fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The underlying date.
    #[must_use]
    pub const fn date(self) -> NaiveDate {
        self.0
    }

    /// Midnight at the start of this day.
    #[must_use]
    pub fn start(self) -> NaiveDateTime {
        self.0.and_time(NaiveTime::MIN)
    }

    /// Midnight at the start of the *next* day (this day's exclusive end).
    #[must_use]
    pub fn end(self) -> NaiveDateTime {
        self.next().start()
    }

    /// The following day.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + Days::new(1))
    }

    /// The day `days` before this one.
    #[must_use]
    pub fn days_back(self, days: u64) -> Self {
        Self(self.0 - Days::new(days))
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl std::str::FromStr for DayKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| ValidationError::InvalidDayKey {
                value: s.to_string(),
            })
    }
}

impl TryFrom<String> for DayKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DayKey> for String {
    fn from(day: DayKey) -> Self {
        day.to_string()
    }
}
