use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::{
    BackendConfig, BackendOverrides, CliArgs, Config, ConfigSource, MemoryBackend,
    SearchProviderConfig,
};

/// Directory, relative to a project root, that holds `config.toml`
pub const CONFIG_DIR: &str = ".quorum";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    server: Option<TomlServer>,
    orchestrator: Option<TomlOrchestrator>,
    coordinator: Option<BackendOverrides>,
    coders: Option<Vec<BackendConfig>>,
    search: Option<Vec<SearchProviderConfig>>,
    memory: Option<TomlMemory>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlServer {
    host: Option<String>,
    port: Option<u16>,
    port_search_attempts: Option<u16>,
    api_key_env: Option<String>,
    agent_model: Option<String>,
    direct_models: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlOrchestrator {
    preferred_backend: Option<String>,
    simple_question_marker: Option<String>,
    search_vocabulary: Option<Vec<String>>,
    max_search_results: Option<usize>,
    stream_buffer: Option<usize>,
    memory_artifacts_in_prompt: Option<usize>,
    artifact_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlMemory {
    backend: Option<MemoryBackend>,
    dir: Option<PathBuf>,
}

/// Move `$src.$field` into `$dst.$field` when present and record where it came from.
macro_rules! apply {
    ($attr:ident, $source:expr, $key:literal, $dst:expr, $src:expr) => {
        if let Some(value) = $src {
            $dst = value;
            $attr.insert($key.to_string(), $source.clone());
        }
    };
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory for config file discovery when no
    /// explicit path is provided in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory
    ///
    /// This is the path-driven variant used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let mut config = Config::defaults();
        let mut attr: HashMap<String, ConfigSource> = HashMap::new();

        for key in Self::tracked_keys() {
            attr.insert((*key).to_string(), ConfigSource::Defaults);
        }

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(quorum_utils::ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    }
                    .into());
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir)?,
        };

        if let Some(path) = &config_path {
            let file = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            let source = ConfigSource::ConfigFile(path.clone());

            if let Some(server) = file.server {
                apply!(attr, source, "server.host", config.server.host, server.host);
                apply!(attr, source, "server.port", config.server.port, server.port);
                apply!(
                    attr,
                    source,
                    "server.port_search_attempts",
                    config.server.port_search_attempts,
                    server.port_search_attempts
                );
                apply!(
                    attr,
                    source,
                    "server.api_key_env",
                    config.server.api_key_env,
                    server.api_key_env
                );
                apply!(
                    attr,
                    source,
                    "server.agent_model",
                    config.server.agent_model,
                    server.agent_model
                );
                apply!(
                    attr,
                    source,
                    "server.direct_models",
                    config.server.direct_models,
                    server.direct_models
                );
            }

            if let Some(orch) = file.orchestrator {
                apply!(
                    attr,
                    source,
                    "orchestrator.preferred_backend",
                    config.orchestrator.preferred_backend,
                    orch.preferred_backend
                );
                apply!(
                    attr,
                    source,
                    "orchestrator.simple_question_marker",
                    config.orchestrator.simple_question_marker,
                    orch.simple_question_marker
                );
                apply!(
                    attr,
                    source,
                    "orchestrator.search_vocabulary",
                    config.orchestrator.search_vocabulary,
                    orch.search_vocabulary
                );
                apply!(
                    attr,
                    source,
                    "orchestrator.max_search_results",
                    config.orchestrator.max_search_results,
                    orch.max_search_results
                );
                apply!(
                    attr,
                    source,
                    "orchestrator.stream_buffer",
                    config.orchestrator.stream_buffer,
                    orch.stream_buffer
                );
                apply!(
                    attr,
                    source,
                    "orchestrator.memory_artifacts_in_prompt",
                    config.orchestrator.memory_artifacts_in_prompt,
                    orch.memory_artifacts_in_prompt
                );
                if orch.artifact_path.is_some() {
                    config.orchestrator.artifact_path = orch.artifact_path;
                    attr.insert("orchestrator.artifact_path".to_string(), source.clone());
                }
            }

            if let Some(coordinator) = file.coordinator {
                Self::merge_backend(&mut config.coordinator, coordinator);
                attr.insert("coordinator".to_string(), source.clone());
            }

            if let Some(coders) = file.coders {
                config.coders = coders;
                attr.insert("coders".to_string(), source.clone());
            }

            if let Some(search) = file.search {
                config.search = search;
                attr.insert("search".to_string(), source.clone());
            }

            if let Some(memory) = file.memory {
                apply!(attr, source, "memory.backend", config.memory.backend, memory.backend);
                apply!(attr, source, "memory.dir", config.memory.dir, memory.dir);
            }
        }

        // CLI overrides
        let cli = ConfigSource::Cli;
        apply!(
            attr,
            cli,
            "orchestrator.preferred_backend",
            config.orchestrator.preferred_backend,
            cli_args.preferred_backend.clone()
        );
        apply!(attr, cli, "server.host", config.server.host, cli_args.host.clone());
        apply!(attr, cli, "server.port", config.server.port, cli_args.port);
        apply!(attr, cli, "memory.dir", config.memory.dir, cli_args.memory_dir.clone());

        config.source_attribution = attr;
        config.validate()?;

        Ok(config)
    }

    fn tracked_keys() -> &'static [&'static str] {
        &[
            "server.host",
            "server.port",
            "server.port_search_attempts",
            "server.api_key_env",
            "server.agent_model",
            "server.direct_models",
            "orchestrator.preferred_backend",
            "orchestrator.simple_question_marker",
            "orchestrator.search_vocabulary",
            "orchestrator.max_search_results",
            "orchestrator.stream_buffer",
            "orchestrator.memory_artifacts_in_prompt",
            "coordinator",
            "coders",
            "search",
            "memory.backend",
            "memory.dir",
        ]
    }

    fn merge_backend(base: &mut BackendConfig, overrides: BackendOverrides) {
        if let Some(v) = overrides.name {
            base.name = v;
        }
        if let Some(v) = overrides.provider {
            base.provider = v;
            // A different provider means the default endpoint no longer applies.
            base.base_url = None;
        }
        if let Some(v) = overrides.model {
            base.model = v;
        }
        if overrides.base_url.is_some() {
            base.base_url = overrides.base_url;
        }
        if let Some(v) = overrides.api_key_env {
            base.api_key_env = v;
        }
        if let Some(v) = overrides.timeout_secs {
            base.timeout_secs = v;
        }
        if let Some(v) = overrides.max_tokens {
            base.max_tokens = v;
        }
        if let Some(v) = overrides.temperature {
            base.temperature = v;
        }
        if let Some(v) = overrides.backups {
            base.backups = v;
        }
    }

    /// Discover config file by searching upward from a given directory
    ///
    /// Walks up the directory tree looking for `.quorum/config.toml`, stopping
    /// at repository root markers (.git, .hg, .svn) or the filesystem root.
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        let mut current_dir = start_dir.to_path_buf();

        loop {
            let config_path = current_dir.join(CONFIG_DIR).join("config.toml");
            if config_path.exists() {
                return Ok(Some(config_path));
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    /// Load configuration from TOML file
    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: TomlConfig = toml::from_str(&content).map_err(|e| {
            quorum_utils::ConfigError::InvalidFile(format!("{}: {e}", path.display()))
        })?;
        Ok(config)
    }
}
