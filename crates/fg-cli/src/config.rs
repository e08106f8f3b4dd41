//! Configuration for the `fg` binary.
//!
//! Values are layered: built-in defaults, then `config.toml` in the
//! platform config directory, then an explicit `--config` file, then
//! `FG_*` environment variables. Later layers win.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the usage database lives. Defaults to `fg.db` in the
    /// platform data directory (`~/.local/share/fg` on Linux).
    pub database_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = app_dir(dirs::data_dir()).unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("fg.db"),
        }
    }
}

impl Config {
    /// Loads configuration, optionally merging an explicit config file on
    /// top of the default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(config_dir) = app_dir(dirs::config_dir()) {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("FG_")).extract()
    }
}

fn app_dir(base: Option<PathBuf>) -> Option<PathBuf> {
    base.map(|p| p.join("fg"))
}
