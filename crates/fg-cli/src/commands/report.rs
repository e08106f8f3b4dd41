//! Report command: records effective time spent on a domain.

use std::io::Write;

use anyhow::Result;
use chrono::NaiveDateTime;
use fg_core::{AccrualReason, Arbiter, Gateway, NullSink, Request, Response};
use fg_db::Database;

use super::util::format_duration;

pub fn run<W: Write>(
    writer: &mut W,
    db: Database,
    domain: &str,
    seconds: i64,
    tab: &str,
    now: NaiveDateTime,
) -> Result<()> {
    let categories = db.load_categories()?;
    let mut gateway = Gateway::new(Arbiter::new(db, categories), NullSink);

    let Response::Category(Some(category)) = gateway.handle(
        Request::GetCategoryForDomain {
            domain: domain.to_string(),
        },
        now,
    ) else {
        writeln!(writer, "{domain} is not tracked; nothing recorded.")?;
        return Ok(());
    };

    let response = gateway.handle(
        Request::AddTime {
            category_key: category.key.to_string(),
            domain: Some(domain.to_string()),
            seconds,
            tab_id: tab.to_string(),
        },
        now,
    );
    gateway.flush(now);

    let Response::Accrual(outcome) = response else {
        anyhow::bail!("unexpected response to time report");
    };

    match outcome.reason {
        Some(AccrualReason::SessionLimitReached) => {
            let rest = outcome
                .rest_duration
                .map_or(String::new(), |r| {
                    format!("; rest for {}", format_duration(u64::from(r)))
                });
            writeln!(
                writer,
                "Recorded {} to {}; session limit reached{rest}",
                format_duration(outcome.added_seconds),
                category.key
            )?;
        }
        Some(AccrualReason::DailyLimitReached) => {
            writeln!(
                writer,
                "Recorded {} to {}; daily limit reached",
                format_duration(outcome.added_seconds),
                category.key
            )?;
        }
        Some(AccrualReason::NotActiveTab) => {
            writeln!(writer, "Skipped: another tab is tracking {}", category.key)?;
        }
        None => {
            writeln!(
                writer,
                "Recorded {} to {}",
                format_duration(outcome.added_seconds),
                category.key
            )?;
        }
    }
    Ok(())
}
