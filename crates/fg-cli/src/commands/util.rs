//! Shared utilities for CLI commands.

use anyhow::{Context, Result, bail};
use fg_core::ForbiddenPeriod;

/// Formats seconds as a duration string.
/// Returns "Xh Ym" if >= 1 hour, "Xm" if >= 1 minute, "Xs" below that.
#[must_use]
pub fn format_duration(seconds: u64) -> String {
    let minutes = seconds / 60;
    let hours = minutes / 60;
    if hours >= 1 {
        format!("{hours}h {}m", minutes % 60)
    } else if minutes >= 1 {
        format!("{minutes}m")
    } else {
        format!("{seconds}s")
    }
}

/// Parses a forbidden window given as `HH:MM-HH:MM`.
pub fn parse_forbidden(s: &str) -> Result<ForbiddenPeriod> {
    let Some((start, end)) = s.split_once('-') else {
        bail!("invalid forbidden window: {s}. Use HH:MM-HH:MM (e.g., 22:00-08:00)");
    };
    Ok(ForbiddenPeriod {
        start: start
            .parse()
            .with_context(|| format!("invalid window start in {s}"))?,
        end: end
            .parse()
            .with_context(|| format!("invalid window end in {s}"))?,
    })
}
