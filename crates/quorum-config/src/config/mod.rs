//! Configuration management for quorum
//!
//! Hierarchical configuration with discovery and precedence: CLI > file > defaults.
//! The TOML file lives at `.quorum/config.toml` and has `[server]`, `[orchestrator]`,
//! `[coordinator]`, `[[coders]]`, `[[search]]` and `[memory]` sections. API keys are
//! never stored in the file; backends name the environment variable that holds them.

mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

use std::path::PathBuf;

pub use cli_args::CliArgs;
pub use discovery::CONFIG_DIR;
pub use model::*;

/// Where an effective configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    ConfigFile(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::ConfigFile(path) => write!(f, "config file ({})", path.display()),
            Self::Defaults => write!(f, "defaults"),
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Config {
    /// Defaults with memory disabled, suitable for unit tests that never touch disk.
    pub fn minimal_for_testing() -> Self {
        let mut config = Config::defaults();
        config.memory.backend = MemoryBackend::Disabled;
        config
    }
}
