use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fg_cli::commands::{category, limit, report, rollover, stats, status};
use fg_cli::{CategoryAction, Cli, Commands, Config, LimitAction};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(fg_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = fg_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let now = Local::now().naive_local();
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Some(Commands::Category { action }) => match action {
            CategoryAction::Add {
                key,
                name,
                kind,
                patterns,
                daily_limit,
                session_duration,
                session_count,
                rest_duration,
                forbidden,
                idle_timeout,
                disabled,
            } => {
                let (mut db, _config) = open_database(cli.config.as_deref())?;
                category::add(
                    &mut stdout,
                    &mut db,
                    category::AddCategory {
                        key,
                        name,
                        kind,
                        patterns,
                        daily_limit,
                        session_duration,
                        session_count,
                        rest_duration,
                        forbidden,
                        idle_timeout,
                        disabled,
                    },
                )?;
            }
            CategoryAction::List { json } => {
                let (db, _config) = open_database(cli.config.as_deref())?;
                category::list(&mut stdout, &db, json)?;
            }
            CategoryAction::Remove { key } => {
                let (mut db, _config) = open_database(cli.config.as_deref())?;
                category::remove(&mut stdout, &mut db, &key)?;
            }
        },
        Some(Commands::Limit { action }) => match action {
            LimitAction::Set { domain, seconds } => {
                let (mut db, _config) = open_database(cli.config.as_deref())?;
                limit::set(&mut stdout, &mut db, &domain, seconds)?;
            }
            LimitAction::Clear { domain } => {
                let (mut db, _config) = open_database(cli.config.as_deref())?;
                limit::clear(&mut stdout, &mut db, &domain)?;
            }
            LimitAction::List { json } => {
                let (db, _config) = open_database(cli.config.as_deref())?;
                limit::list(&mut stdout, &db, json)?;
            }
        },
        Some(Commands::Status { category, json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            status::run(&mut stdout, db, category.as_deref(), json, now)?;
        }
        Some(Commands::Report {
            domain,
            seconds,
            tab,
        }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            report::run(&mut stdout, db, &domain, seconds, &tab, now)?;
        }
        Some(Commands::Stats { week, month, json }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            let period = if month {
                stats::Period::Month
            } else if week {
                stats::Period::Week
            } else {
                stats::Period::Today
            };
            stats::run(&mut stdout, db, period, json, now)?;
        }
        Some(Commands::Rollover { force }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            rollover::run(&mut stdout, db, force, now)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    stdout.flush()?;
    Ok(())
}
