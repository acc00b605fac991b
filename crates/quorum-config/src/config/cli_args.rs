use std::path::PathBuf;

/// Values supplied on the command line; each one overrides file and defaults.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub preferred_backend: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub memory_dir: Option<PathBuf>,
}
