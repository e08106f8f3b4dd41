//! Category management commands.

use std::io::Write;

use anyhow::{Context, Result};
use fg_core::{Category, CategoryKey, CategoryKind};
use fg_db::Database;

use super::util::{format_duration, parse_forbidden};

/// Arguments for `fg category add`, mirroring the clap definition.
#[derive(Debug, Clone, Default)]
pub struct AddCategory {
    pub key: String,
    pub name: Option<String>,
    pub kind: String,
    pub patterns: Vec<String>,
    pub daily_limit: Option<u32>,
    pub session_duration: Option<u32>,
    pub session_count: Option<u32>,
    pub rest_duration: Option<u32>,
    pub forbidden: Vec<String>,
    pub idle_timeout: Option<u32>,
    pub disabled: bool,
}

pub fn add<W: Write>(writer: &mut W, db: &mut Database, args: AddCategory) -> Result<()> {
    let key = CategoryKey::new(&args.key).context("invalid category key")?;
    let kind: CategoryKind = args
        .kind
        .parse()
        .context("invalid category kind (use video, reading, social, audio, or other)")?;
    let name = args.name.unwrap_or_else(|| args.key.clone());

    let mut category = Category::new(key, name, kind);
    category.patterns = args
        .patterns
        .iter()
        .map(|p| p.trim().to_lowercase())
        .collect();
    category.enabled = !args.disabled;
    category.daily_limit = args.daily_limit;
    category.session_duration = args.session_duration;
    category.session_count = args.session_count;
    category.rest_duration = args.rest_duration;
    category.idle_timeout = args.idle_timeout;
    for window in &args.forbidden {
        category.forbidden_periods.push(parse_forbidden(window)?);
    }

    db.upsert_category(&category)?;
    writeln!(writer, "Saved category '{}'", category.key)?;
    Ok(())
}

pub fn list<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let categories = db.load_categories()?;

    if json {
        let all: Vec<&Category> = categories.iter().collect();
        serde_json::to_writer_pretty(&mut *writer, &all)?;
        writeln!(writer)?;
        return Ok(());
    }

    if categories.is_empty() {
        writeln!(writer, "No categories configured.")?;
        return Ok(());
    }

    for category in categories.iter() {
        let state = if category.enabled { "" } else { " (disabled)" };
        writeln!(writer, "{} — {}{}", category.key, category.name, state)?;
        if !category.patterns.is_empty() {
            writeln!(writer, "  domains: {}", category.patterns.join(", "))?;
        }
        if let Some(limit) = category.daily_limit {
            writeln!(writer, "  daily limit: {}", format_duration(u64::from(limit)))?;
        }
        if let Some(duration) = category.session_duration {
            let sessions = category
                .session_count
                .map_or(String::new(), |n| format!(" × {n} sessions"));
            writeln!(
                writer,
                "  session limit: {}{}",
                format_duration(u64::from(duration)),
                sessions
            )?;
        }
        if let Some(rest) = category.rest_duration {
            writeln!(writer, "  rest: {}", format_duration(u64::from(rest)))?;
        }
        for window in &category.forbidden_periods {
            writeln!(writer, "  forbidden: {}-{}", window.start, window.end)?;
        }
    }
    Ok(())
}

pub fn remove<W: Write>(writer: &mut W, db: &mut Database, key: &str) -> Result<()> {
    let key = CategoryKey::new(key).context("invalid category key")?;
    if db.delete_category(&key)? {
        writeln!(writer, "Removed category '{key}'")?;
    } else {
        writeln!(writer, "No category '{key}' configured.")?;
    }
    Ok(())
}
