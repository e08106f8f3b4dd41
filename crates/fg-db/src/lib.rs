//! Storage layer for the attention gate.
//!
//! Provides persistence for usage accounting, session/rest state, and
//! category configuration using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! This means a `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization (e.g. a `Mutex<Database>`).
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in local wall-clock ISO 8601 format without
//! offset (e.g., `2026-03-01T10:30:00`). Day keys are `YYYY-MM-DD`. Both sort
//! lexicographically in chronological order, so range queries compare text.
//!
//! ## Additive Writes
//!
//! Usage totals are only ever incremented (`ON CONFLICT ... DO UPDATE SET
//! total = total + excluded`), never read-modify-written by callers. This is
//! what lets the in-memory batching layer retry a failed flush without
//! double-counting.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use uuid::Uuid;

use fg_core::{
    ActiveState, Category, CategoryKey, CategorySet, DailyUsage, DayKey, DomainLimit, DomainName,
    SessionRecord, StateStore, UsageStore,
};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp failed to parse.
    #[error("invalid timestamp in {column}: {value}")]
    TimestampParse {
        column: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row holds a value the domain types reject.
    #[error("invalid stored value in {table}: {message}")]
    InvalidRow {
        table: &'static str,
        message: String,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS categories (
                key TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                patterns TEXT NOT NULL DEFAULT '[]',
                forbidden_periods TEXT NOT NULL DEFAULT '[]',
                daily_limit INTEGER,
                session_duration INTEGER,
                session_count INTEGER,
                rest_duration INTEGER,
                idle_timeout INTEGER
            );

            -- date_key: 'YYYY-MM-DD', local calendar day
            CREATE TABLE IF NOT EXISTS usage_days (
                date_key TEXT NOT NULL,
                category TEXT NOT NULL,
                total_seconds INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (date_key, category)
            );

            CREATE TABLE IF NOT EXISTS usage_sessions (
                id TEXT PRIMARY KEY,
                date_key TEXT NOT NULL,
                category TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                duration_seconds INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_day
                ON usage_sessions(date_key, category);

            CREATE TABLE IF NOT EXISTS usage_domains (
                date_key TEXT NOT NULL,
                category TEXT NOT NULL,
                domain TEXT NOT NULL,
                seconds INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (date_key, category, domain)
            );

            CREATE INDEX IF NOT EXISTS idx_domains_domain
                ON usage_domains(date_key, domain);

            CREATE TABLE IF NOT EXISTS active_state (
                category TEXT PRIMARY KEY,
                in_session INTEGER NOT NULL DEFAULT 0,
                session_start TEXT,
                session_effective INTEGER NOT NULL DEFAULT 0,
                in_rest INTEGER NOT NULL DEFAULT 0,
                rest_end TEXT
            );

            CREATE TABLE IF NOT EXISTS domain_limits (
                domain TEXT PRIMARY KEY,
                daily_limit INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Inserts or replaces a category definition.
    pub fn upsert_category(&mut self, category: &Category) -> Result<(), DbError> {
        let patterns = serde_json::to_string(&category.patterns).map_err(json_err("categories"))?;
        let forbidden = serde_json::to_string(&category.forbidden_periods)
            .map_err(json_err("categories"))?;
        self.conn.execute(
            "
            INSERT OR REPLACE INTO categories
            (key, name, kind, enabled, patterns, forbidden_periods,
             daily_limit, session_duration, session_count, rest_duration, idle_timeout)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                category.key.as_str(),
                category.name,
                category.kind.as_str(),
                category.enabled,
                patterns,
                forbidden,
                category.daily_limit,
                category.session_duration,
                category.session_count,
                category.rest_duration,
                category.idle_timeout,
            ],
        )?;
        Ok(())
    }

    /// Deletes a category. Usage history for it is kept.
    pub fn delete_category(&mut self, key: &CategoryKey) -> Result<bool, DbError> {
        let n = self
            .conn
            .execute("DELETE FROM categories WHERE key = ?", [key.as_str()])?;
        Ok(n > 0)
    }

    /// The last day for which rollover maintenance ran, if recorded.
    pub fn last_rollover_day(&self) -> Result<Option<DayKey>, DbError> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'last_rollover_day'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        value.as_deref().map(parse_day_key).transpose()
    }

    pub fn set_last_rollover_day(&mut self, day: DayKey) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('last_rollover_day', ?)",
            [day.to_string()],
        )?;
        Ok(())
    }

    /// Loads every stored category.
    pub fn load_categories(&self) -> Result<CategorySet, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT key, name, kind, enabled, patterns, forbidden_periods,
                   daily_limit, session_duration, session_count, rest_duration, idle_timeout
            FROM categories
            ORDER BY key ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, Option<u32>>(6)?,
                row.get::<_, Option<u32>>(7)?,
                row.get::<_, Option<u32>>(8)?,
                row.get::<_, Option<u32>>(9)?,
                row.get::<_, Option<u32>>(10)?,
            ))
        })?;

        let mut set = CategorySet::new();
        for row in rows {
            let (
                key,
                name,
                kind,
                enabled,
                patterns,
                forbidden,
                daily_limit,
                session_duration,
                session_count,
                rest_duration,
                idle_timeout,
            ) = row?;
            let key = parse_category_key(&key)?;
            let kind = kind
                .parse()
                .map_err(|e: fg_core::UnknownCategoryKind| DbError::InvalidRow {
                    table: "categories",
                    message: e.to_string(),
                })?;
            let mut category = Category::new(key, name, kind);
            category.enabled = enabled;
            category.patterns = serde_json::from_str(&patterns).map_err(json_err("categories"))?;
            category.forbidden_periods =
                serde_json::from_str(&forbidden).map_err(json_err("categories"))?;
            category.daily_limit = daily_limit;
            category.session_duration = session_duration;
            category.session_count = session_count;
            category.rest_duration = rest_duration;
            category.idle_timeout = idle_timeout;
            set.insert(category);
        }
        Ok(set)
    }
}

impl UsageStore for Database {
    type Error = DbError;

    fn daily_usage(&self, day: DayKey, category: &CategoryKey) -> Result<DailyUsage, DbError> {
        let total: Option<u64> = self
            .conn
            .query_row(
                "SELECT total_seconds FROM usage_days WHERE date_key = ? AND category = ?",
                params![day.to_string(), category.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let mut usage = DailyUsage {
            total_seconds: total.unwrap_or(0),
            ..DailyUsage::default()
        };

        let mut stmt = self.conn.prepare(
            "
            SELECT start_time, end_time, duration_seconds
            FROM usage_sessions
            WHERE date_key = ? AND category = ?
            ORDER BY start_time ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(params![day.to_string(), category.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<u32>>(2)?,
            ))
        })?;
        for row in rows {
            let (start, end, duration) = row?;
            usage.sessions.push(SessionRecord {
                start: parse_timestamp(&start, "start_time")?,
                end: end
                    .as_deref()
                    .map(|e| parse_timestamp(e, "end_time"))
                    .transpose()?,
                duration,
            });
        }

        let mut stmt = self.conn.prepare(
            "
            SELECT domain, seconds FROM usage_domains
            WHERE date_key = ? AND category = ?
            ",
        )?;
        let rows = stmt.query_map(params![day.to_string(), category.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows {
            let (domain, seconds) = row?;
            usage.by_domain.insert(parse_domain(&domain)?, seconds);
        }

        Ok(usage)
    }

    fn add_category_seconds(
        &mut self,
        day: DayKey,
        category: &CategoryKey,
        seconds: u64,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO usage_days (date_key, category, total_seconds)
            VALUES (?, ?, ?)
            ON CONFLICT(date_key, category)
            DO UPDATE SET total_seconds = total_seconds + excluded.total_seconds
            ",
            params![day.to_string(), category.as_str(), seconds],
        )?;
        Ok(())
    }

    fn add_domain_seconds(
        &mut self,
        day: DayKey,
        category: &CategoryKey,
        domain: &DomainName,
        seconds: u64,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO usage_domains (date_key, category, domain, seconds)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(date_key, category, domain)
            DO UPDATE SET seconds = seconds + excluded.seconds
            ",
            params![
                day.to_string(),
                category.as_str(),
                domain.as_str(),
                seconds
            ],
        )?;
        Ok(())
    }

    fn append_session(
        &mut self,
        day: DayKey,
        category: &CategoryKey,
        start: NaiveDateTime,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO usage_sessions (id, date_key, category, start_time)
            VALUES (?, ?, ?, ?)
            ",
            params![
                Uuid::new_v4().to_string(),
                day.to_string(),
                category.as_str(),
                format_timestamp(start),
            ],
        )?;
        Ok(())
    }

    fn close_open_session(
        &mut self,
        day: DayKey,
        category: &CategoryKey,
        end: NaiveDateTime,
    ) -> Result<Option<SessionRecord>, DbError> {
        let open: Option<(String, String)> = self
            .conn
            .query_row(
                "
                SELECT id, start_time FROM usage_sessions
                WHERE date_key = ? AND category = ? AND end_time IS NULL
                ORDER BY start_time ASC, id ASC
                LIMIT 1
                ",
                params![day.to_string(), category.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((id, start)) = open else {
            return Ok(None);
        };

        let mut record = SessionRecord::open(parse_timestamp(&start, "start_time")?);
        record.close(end);
        self.conn.execute(
            "UPDATE usage_sessions SET end_time = ?, duration_seconds = ? WHERE id = ?",
            params![format_timestamp(end), record.duration, id],
        )?;
        Ok(Some(record))
    }

    fn domain_seconds(&self, day: DayKey, domain: &DomainName) -> Result<u64, DbError> {
        let total: u64 = self.conn.query_row(
            "
            SELECT COALESCE(SUM(seconds), 0) FROM usage_domains
            WHERE date_key = ? AND domain = ?
            ",
            params![day.to_string(), domain.as_str()],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    fn usage_between(
        &self,
        from: DayKey,
        to: DayKey,
    ) -> Result<Vec<(DayKey, CategoryKey, DailyUsage)>, DbError> {
        // Day keys sort lexicographically in date order, so BETWEEN on the
        // text column is an inclusive date range.
        let mut merged: BTreeMap<(DayKey, CategoryKey), DailyUsage> = BTreeMap::new();

        let mut stmt = self.conn.prepare(
            "
            SELECT date_key, category, total_seconds FROM usage_days
            WHERE date_key BETWEEN ? AND ?
            ",
        )?;
        let rows = stmt.query_map(params![from.to_string(), to.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u64>(2)?,
            ))
        })?;
        for row in rows {
            let (day, category, total) = row?;
            let entry = merged
                .entry((parse_day_key(&day)?, parse_category_key(&category)?))
                .or_default();
            entry.total_seconds = total;
        }

        let mut stmt = self.conn.prepare(
            "
            SELECT date_key, category, domain, seconds FROM usage_domains
            WHERE date_key BETWEEN ? AND ?
            ",
        )?;
        let rows = stmt.query_map(params![from.to_string(), to.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u64>(3)?,
            ))
        })?;
        for row in rows {
            let (day, category, domain, seconds) = row?;
            merged
                .entry((parse_day_key(&day)?, parse_category_key(&category)?))
                .or_default()
                .by_domain
                .insert(parse_domain(&domain)?, seconds);
        }

        Ok(merged
            .into_iter()
            .map(|((day, category), usage)| (day, category, usage))
            .collect())
    }

    fn prune_before(&mut self, cutoff: DayKey) -> Result<usize, DbError> {
        let cutoff = cutoff.to_string();
        let pruned = self
            .conn
            .execute("DELETE FROM usage_days WHERE date_key < ?", [&cutoff])?;
        self.conn
            .execute("DELETE FROM usage_sessions WHERE date_key < ?", [&cutoff])?;
        self.conn
            .execute("DELETE FROM usage_domains WHERE date_key < ?", [&cutoff])?;
        Ok(pruned)
    }

    fn domain_limit(&self, domain: &DomainName) -> Result<Option<DomainLimit>, DbError> {
        let limit: Option<u32> = self
            .conn
            .query_row(
                "SELECT daily_limit FROM domain_limits WHERE domain = ?",
                [domain.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(limit.map(|daily_limit| DomainLimit { daily_limit }))
    }

    fn set_domain_limit(
        &mut self,
        domain: &DomainName,
        limit: Option<DomainLimit>,
    ) -> Result<(), DbError> {
        match limit {
            Some(limit) => {
                self.conn.execute(
                    "INSERT OR REPLACE INTO domain_limits (domain, daily_limit) VALUES (?, ?)",
                    params![domain.as_str(), limit.daily_limit],
                )?;
            }
            None => {
                self.conn
                    .execute("DELETE FROM domain_limits WHERE domain = ?", [
                        domain.as_str()
                    ])?;
            }
        }
        Ok(())
    }

    fn domain_limits(&self) -> Result<BTreeMap<DomainName, DomainLimit>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT domain, daily_limit FROM domain_limits ORDER BY domain ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        let mut limits = BTreeMap::new();
        for row in rows {
            let (domain, daily_limit) = row?;
            limits.insert(parse_domain(&domain)?, DomainLimit { daily_limit });
        }
        Ok(limits)
    }
}

impl StateStore for Database {
    fn active_state(&self, category: &CategoryKey) -> Result<Option<ActiveState>, DbError> {
        self.conn
            .query_row(
                "
                SELECT in_session, session_start, session_effective, in_rest, rest_end
                FROM active_state WHERE category = ?
                ",
                [category.as_str()],
                |row| {
                    Ok((
                        row.get::<_, bool>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?
            .map(|(in_session, session_start, session_effective, in_rest, rest_end)| {
                Ok(ActiveState {
                    in_session,
                    session_start: session_start
                        .as_deref()
                        .map(|t| parse_timestamp(t, "session_start"))
                        .transpose()?,
                    session_effective,
                    in_rest,
                    rest_end: rest_end
                        .as_deref()
                        .map(|t| parse_timestamp(t, "rest_end"))
                        .transpose()?,
                })
            })
            .transpose()
    }

    fn put_active_state(
        &mut self,
        category: &CategoryKey,
        state: &ActiveState,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT OR REPLACE INTO active_state
            (category, in_session, session_start, session_effective, in_rest, rest_end)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
            params![
                category.as_str(),
                state.in_session,
                state.session_start.map(format_timestamp),
                state.session_effective,
                state.in_rest,
                state.rest_end.map(format_timestamp),
            ],
        )?;
        Ok(())
    }

    fn all_active_states(&self) -> Result<Vec<(CategoryKey, ActiveState)>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT category, in_session, session_start, session_effective, in_rest, rest_end
            FROM active_state
            ORDER BY category ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, bool>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;
        let mut states = Vec::new();
        for row in rows {
            let (category, in_session, session_start, session_effective, in_rest, rest_end) = row?;
            states.push((
                parse_category_key(&category)?,
                ActiveState {
                    in_session,
                    session_start: session_start
                        .as_deref()
                        .map(|t| parse_timestamp(t, "session_start"))
                        .transpose()?,
                    session_effective,
                    in_rest,
                    rest_end: rest_end
                        .as_deref()
                        .map(|t| parse_timestamp(t, "rest_end"))
                        .transpose()?,
                },
            ));
        }
        Ok(states)
    }

    fn clear_active_states(&mut self) -> Result<(), DbError> {
        self.conn.execute("DELETE FROM active_state", [])?;
        Ok(())
    }
}

fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(value: &str, column: &'static str) -> Result<NaiveDateTime, DbError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|source| {
        DbError::TimestampParse {
            column,
            value: value.to_string(),
            source,
        }
    })
}

fn parse_day_key(value: &str) -> Result<DayKey, DbError> {
    value.parse().map_err(|e: fg_core::ValidationError| {
        DbError::InvalidRow {
            table: "usage_days",
            message: e.to_string(),
        }
    })
}

fn parse_category_key(value: &str) -> Result<CategoryKey, DbError> {
    CategoryKey::new(value).map_err(|e| DbError::InvalidRow {
        table: "categories",
        message: e.to_string(),
    })
}

fn parse_domain(value: &str) -> Result<DomainName, DbError> {
    DomainName::new(value).map_err(|e| DbError::InvalidRow {
        table: "usage_domains",
        message: e.to_string(),
    })
}

fn json_err(table: &'static str) -> impl Fn(serde_json::Error) -> DbError {
    move |e| DbError::InvalidRow {
        table,
        message: e.to_string(),
    }
}
