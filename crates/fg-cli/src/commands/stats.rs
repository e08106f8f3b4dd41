//! Stats command: aggregated usage over today, the week, or the month.

use std::io::Write;

use anyhow::Result;
use chrono::NaiveDateTime;
use fg_core::{Arbiter, DayKey, Gateway, NullSink, PeriodStats, Request, Response};
use fg_db::Database;

use super::util::format_duration;

/// Aggregation window, anchored at today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    Week,
    Month,
}

impl Period {
    const fn days_back(self) -> u64 {
        match self {
            Self::Today => 0,
            Self::Week => 6,
            Self::Month => 29,
        }
    }

    const fn request(self) -> Request {
        match self {
            Self::Today => Request::GetTodayStats,
            Self::Week => Request::GetWeekStats,
            Self::Month => Request::GetMonthStats,
        }
    }
}

pub fn run<W: Write>(
    writer: &mut W,
    db: Database,
    period: Period,
    json: bool,
    now: NaiveDateTime,
) -> Result<()> {
    let categories = db.load_categories()?;
    let mut gateway = Gateway::new(Arbiter::new(db, categories), NullSink);

    let Response::Stats(stats) = gateway.handle(period.request(), now) else {
        anyhow::bail!("unexpected response to stats request");
    };

    if json {
        serde_json::to_writer_pretty(&mut *writer, &stats)?;
        writeln!(writer)?;
        return Ok(());
    }

    let today = DayKey::of(now);
    let from = today.days_back(period.days_back());
    render(writer, &stats, from, today)
}

fn render<W: Write>(writer: &mut W, stats: &PeriodStats, from: DayKey, to: DayKey) -> Result<()> {
    if from == to {
        writeln!(
            writer,
            "Usage for {to}: {}",
            format_duration(stats.total_seconds)
        )?;
    } else {
        writeln!(
            writer,
            "Usage {from} to {to}: {}",
            format_duration(stats.total_seconds)
        )?;
    }

    if stats.total_seconds == 0 {
        writeln!(writer, "No usage recorded.")?;
        return Ok(());
    }

    writeln!(writer, "By category:")?;
    for (category, seconds) in &stats.by_category {
        writeln!(writer, "  {category}: {}", format_duration(*seconds))?;
    }

    if !stats.by_domain.is_empty() {
        writeln!(writer, "By domain:")?;
        for (domain, seconds) in &stats.by_domain {
            writeln!(writer, "  {domain}: {}", format_duration(*seconds))?;
        }
    }

    if from != to {
        writeln!(writer, "By day:")?;
        for (day, seconds) in &stats.by_date {
            writeln!(writer, "  {day}: {}", format_duration(*seconds))?;
        }
    }
    Ok(())
}
