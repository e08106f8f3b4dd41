//! Rollover command: day-transition maintenance.

use std::io::Write;

use anyhow::Result;
use chrono::NaiveDateTime;
use fg_core::{Arbiter, DayKey};
use fg_db::Database;

pub fn run<W: Write>(writer: &mut W, db: Database, force: bool, now: NaiveDateTime) -> Result<()> {
    let today = DayKey::of(now);
    if !force && db.last_rollover_day()? == Some(today) {
        writeln!(writer, "Rollover already ran for {today}.")?;
        return Ok(());
    }

    let categories = db.load_categories()?;
    let mut arbiter = Arbiter::new(db, categories);
    let report = arbiter.roll_over(now)?;
    arbiter.store_mut().set_last_rollover_day(today)?;

    if report.closed_sessions.is_empty() {
        writeln!(writer, "Rollover complete; no dangling sessions.")?;
    } else {
        let closed: Vec<String> = report
            .closed_sessions
            .iter()
            .map(ToString::to_string)
            .collect();
        writeln!(
            writer,
            "Rollover complete; closed sessions: {}",
            closed.join(", ")
        )?;
    }
    if report.pruned_records > 0 {
        writeln!(
            writer,
            "Pruned {} expired usage records.",
            report.pruned_records
        )?;
    }
    Ok(())
}
