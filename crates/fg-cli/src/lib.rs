//! Attention gate CLI library.
//!
//! This crate provides the CLI interface for the attention gate.

mod cli;
pub mod commands;
mod config;

pub use cli::{CategoryAction, Cli, Commands, LimitAction};
pub use config::Config;
