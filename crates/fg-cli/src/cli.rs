//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Attention manager for distracting websites.
///
/// Arbitrates session and daily time limits per category of domains and
/// keeps effective-time accounting in a local database.
#[derive(Debug, Parser)]
#[command(name = "fg", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage tracked categories.
    Category {
        #[command(subcommand)]
        action: CategoryAction,
    },

    /// Manage per-domain daily limits.
    Limit {
        #[command(subcommand)]
        action: LimitAction,
    },

    /// Show current access status per category.
    Status {
        /// Show only this category.
        category: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Record effective time spent on a domain.
    Report {
        /// The domain the time was spent on.
        domain: String,

        /// Effective seconds to record.
        seconds: i64,

        /// Reporting tab identity.
        #[arg(long, default_value = "cli")]
        tab: String,
    },

    /// Show usage statistics.
    Stats {
        /// Aggregate the last 7 days.
        #[arg(long, conflicts_with = "month")]
        week: bool,

        /// Aggregate the last 30 days.
        #[arg(long)]
        month: bool,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run daily rollover maintenance if the day has changed.
    Rollover {
        /// Run even if rollover already ran today.
        #[arg(long)]
        force: bool,
    },
}

/// Category management actions.
#[derive(Debug, Subcommand)]
pub enum CategoryAction {
    /// Add or replace a category.
    Add {
        /// Stable category key (e.g., video).
        key: String,

        /// Display name.
        #[arg(long)]
        name: Option<String>,

        /// Content kind: video, reading, social, audio, other.
        #[arg(long, default_value = "other")]
        kind: String,

        /// Domain pattern the category claims (repeatable).
        #[arg(long = "pattern")]
        patterns: Vec<String>,

        /// Daily limit in seconds.
        #[arg(long)]
        daily_limit: Option<u32>,

        /// Per-session limit in seconds.
        #[arg(long)]
        session_duration: Option<u32>,

        /// Sessions allowed per day.
        #[arg(long)]
        session_count: Option<u32>,

        /// Mandatory rest after a session, in seconds.
        #[arg(long)]
        rest_duration: Option<u32>,

        /// Forbidden window as HH:MM-HH:MM (repeatable, may wrap midnight).
        #[arg(long = "forbid")]
        forbidden: Vec<String>,

        /// Detector idle timeout in seconds.
        #[arg(long)]
        idle_timeout: Option<u32>,

        /// Create the category disabled.
        #[arg(long)]
        disabled: bool,
    },

    /// List configured categories.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove a category. Usage history is kept.
    Remove {
        /// Category key to remove.
        key: String,
    },
}

/// Domain limit management actions.
#[derive(Debug, Subcommand)]
pub enum LimitAction {
    /// Set a daily cap for a domain.
    Set {
        /// The domain (e.g., youtube.com).
        domain: String,

        /// Daily cap in seconds.
        seconds: u32,
    },

    /// Remove a domain's daily cap.
    Clear {
        /// The domain.
        domain: String,
    },

    /// List configured domain limits.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}
