//! Status command: current access state per category.

use std::io::Write;

use anyhow::Result;
use chrono::NaiveDateTime;
use fg_core::{
    Arbiter, CategoryStatus, DenyReason, Gateway, NullSink, Request, Response,
};
use fg_db::Database;

use super::util::format_duration;

pub fn run<W: Write>(
    writer: &mut W,
    db: Database,
    category: Option<&str>,
    json: bool,
    now: NaiveDateTime,
) -> Result<()> {
    let categories = db.load_categories()?;
    let mut gateway = Gateway::new(Arbiter::new(db, categories), NullSink);

    let statuses: Vec<CategoryStatus> = match category {
        Some(key) => {
            let response = gateway.handle(
                Request::GetStatus {
                    category_key: key.to_string(),
                },
                now,
            );
            match response {
                Response::Status(Some(status)) => vec![*status],
                _ => {
                    writeln!(writer, "No category '{key}' configured.")?;
                    return Ok(());
                }
            }
        }
        None => match gateway.handle(Request::GetAllStatus, now) {
            Response::AllStatus(statuses) => statuses,
            _ => Vec::new(),
        },
    };

    if json {
        serde_json::to_writer_pretty(&mut *writer, &statuses)?;
        writeln!(writer)?;
        return Ok(());
    }

    if statuses.is_empty() {
        writeln!(writer, "No categories configured.")?;
        return Ok(());
    }

    for status in &statuses {
        render(writer, status)?;
    }
    Ok(())
}

fn render<W: Write>(writer: &mut W, status: &CategoryStatus) -> Result<()> {
    let category = &status.category;
    writeln!(writer, "{} — {}", category.key, category.name)?;

    if status.state.in_session {
        writeln!(
            writer,
            "  state: in session ({} effective)",
            format_duration(u64::from(status.state.session_effective))
        )?;
    } else if status.state.in_rest {
        writeln!(writer, "  state: resting")?;
    } else {
        writeln!(writer, "  state: idle")?;
    }

    if let Some(limit) = category.daily_limit {
        writeln!(
            writer,
            "  today: {} of {}",
            format_duration(status.usage.total_seconds),
            format_duration(u64::from(limit))
        )?;
    } else {
        writeln!(
            writer,
            "  today: {}",
            format_duration(status.usage.total_seconds)
        )?;
    }

    if let Some(count) = category.session_count {
        let used = status.usage.completed_sessions() + u32::from(status.state.in_session);
        writeln!(writer, "  sessions: {used} of {count}")?;
    }

    let access = &status.access;
    if access.allowed {
        let mut line = "  access: allowed".to_string();
        if let Some(left) = access.session_remaining {
            line.push_str(&format!(
                " ({} left this session)",
                format_duration(u64::from(left))
            ));
        } else if let Some(left) = access.daily_remaining {
            line.push_str(&format!(" ({} left today)", format_duration(left)));
        }
        if access.is_warning {
            line.push_str(" [ending soon]");
        }
        writeln!(writer, "{line}")?;
    } else {
        let detail = match access.reason {
            Some(DenyReason::ForbiddenPeriod) => access
                .next_allowed
                .map_or("forbidden period".to_string(), |until| {
                    format!("forbidden period (until {})", until.format("%H:%M"))
                }),
            Some(DenyReason::RestPeriod) => access.rest_remaining.map_or(
                "rest period".to_string(),
                |left| format!("rest period ({} remaining)", format_duration(u64::from(left))),
            ),
            Some(DenyReason::DailyLimit) => "daily limit reached".to_string(),
            Some(DenyReason::SessionsExhausted) => "session count exhausted".to_string(),
            None => "blocked".to_string(),
        };
        writeln!(writer, "  access: blocked — {detail}")?;
    }
    Ok(())
}
