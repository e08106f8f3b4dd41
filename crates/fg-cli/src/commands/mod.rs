//! CLI subcommand implementations.

pub mod category;
pub mod limit;
pub mod report;
pub mod rollover;
pub mod stats;
pub mod status;
pub mod util;
