//! Per-domain daily limit commands.

use std::io::Write;

use anyhow::{Context, Result};
use fg_core::{DomainLimit, DomainName, UsageStore};
use fg_db::Database;

use super::util::format_duration;

pub fn set<W: Write>(writer: &mut W, db: &mut Database, domain: &str, seconds: u32) -> Result<()> {
    let domain = DomainName::new(domain).context("invalid domain")?;
    db.set_domain_limit(
        &domain,
        Some(DomainLimit {
            daily_limit: seconds,
        }),
    )?;
    writeln!(
        writer,
        "Set daily limit for {domain}: {}",
        format_duration(u64::from(seconds))
    )?;
    Ok(())
}

pub fn clear<W: Write>(writer: &mut W, db: &mut Database, domain: &str) -> Result<()> {
    let domain = DomainName::new(domain).context("invalid domain")?;
    db.set_domain_limit(&domain, None)?;
    writeln!(writer, "Cleared daily limit for {domain}")?;
    Ok(())
}

pub fn list<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let limits = db.domain_limits()?;

    if json {
        serde_json::to_writer_pretty(&mut *writer, &limits)?;
        writeln!(writer)?;
        return Ok(());
    }

    if limits.is_empty() {
        writeln!(writer, "No domain limits configured.")?;
        return Ok(());
    }

    for (domain, limit) in &limits {
        writeln!(
            writer,
            "{domain}: {}",
            format_duration(u64::from(limit.daily_limit))
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_list_clear_cycle() {
        let mut db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();

        set(&mut output, &mut db, "YouTube.com", 600).unwrap();
        set(&mut output, &mut db, "reddit.com", 3900).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("Set daily limit for youtube.com: 10m"));

        let mut listed = Vec::new();
        list(&mut listed, &db, false).unwrap();
        let listed = String::from_utf8(listed).unwrap();
        assert!(listed.contains("youtube.com: 10m"));
        assert!(listed.contains("reddit.com: 1h 5m"));

        let mut cleared = Vec::new();
        clear(&mut cleared, &mut db, "youtube.com").unwrap();
        assert!(String::from_utf8(cleared)
            .unwrap()
            .contains("Cleared daily limit for youtube.com"));

        // After clearing, only reddit.com remains.
        let mut listed = Vec::new();
        list(&mut listed, &db, false).unwrap();
        let listed = String::from_utf8(listed).unwrap();
        assert!(!listed.contains("youtube.com"));
        assert!(listed.contains("reddit.com: 1h 5m"));
    }

    #[test]
    fn rejects_invalid_domain() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(set(&mut Vec::new(), &mut db, "not a domain!", 600).is_err());
    }
}
