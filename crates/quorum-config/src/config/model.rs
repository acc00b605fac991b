use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use quorum_utils::error::ConfigError;

use super::ConfigSource;

/// Model name clients send to run the full orchestrator
pub const AGENT_MODEL: &str = "agent-system";

/// Default reply marker the coordinator uses to flag a simple question
pub const DEFAULT_SIMPLE_QUESTION_MARKER: &str = "SIMPLE_QUESTION";

/// Default number of recent artifacts rendered into coordinator prompts
pub const DEFAULT_MEMORY_ARTIFACTS_IN_PROMPT: usize = 5;

/// Wire protocol spoken by a completion backend
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions
    OpenAi,
    /// DeepSeek (OpenAI-compatible)
    DeepSeek,
    /// OpenRouter (OpenAI-compatible, extra attribution headers)
    OpenRouter,
    /// Anthropic Messages API
    Anthropic,
}

impl ProviderKind {
    /// Default chat endpoint for the provider
    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1/chat/completions",
            Self::DeepSeek => "https://api.deepseek.com/v1/chat/completions",
            Self::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
            Self::Anthropic => "https://api.anthropic.com/v1/messages",
        }
    }
}

/// Web search provider
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::AsRefStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum SearchProviderKind {
    Tavily,
    Brave,
}

impl SearchProviderKind {
    #[must_use]
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Tavily => "https://api.tavily.com/search",
            Self::Brave => "https://api.search.brave.com/res/v1/web/search",
        }
    }
}

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Number of consecutive ports tried when `port` is taken
    pub port_search_attempts: u16,
    /// Env var holding the bearer key clients must present
    pub api_key_env: String,
    /// Model id exposed for the orchestrator
    pub agent_model: String,
    /// Model id → coder name served without orchestration
    pub direct_models: BTreeMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            port_search_attempts: 10,
            api_key_env: "LOCAL_API_KEY".to_string(),
            agent_model: AGENT_MODEL.to_string(),
            direct_models: BTreeMap::new(),
        }
    }
}

/// `[orchestrator]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Coder whose solution is reviewed when it succeeded
    pub preferred_backend: String,
    pub simple_question_marker: String,
    /// Case-insensitive keywords that trigger a web search
    pub search_vocabulary: Vec<String>,
    pub max_search_results: usize,
    /// Frames buffered between the orchestrator and a slow consumer
    pub stream_buffer: usize,
    pub memory_artifacts_in_prompt: usize,
    /// Where the primary solution's code block is written, if anywhere
    pub artifact_path: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            preferred_backend: "claude".to_string(),
            simple_question_marker: DEFAULT_SIMPLE_QUESTION_MARKER.to_string(),
            search_vocabulary: default_search_vocabulary(),
            max_search_results: 5,
            stream_buffer: 16,
            memory_artifacts_in_prompt: DEFAULT_MEMORY_ARTIFACTS_IN_PROMPT,
            artifact_path: None,
        }
    }
}

/// Keywords that indicate a task needs fresh information from the web.
#[must_use]
pub fn default_search_vocabulary() -> Vec<String> {
    [
        "latest",
        "current",
        "news",
        "recent",
        "search",
        "find",
        "look up",
        "documentation",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// A named alternate model tried after the backend's primary model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupModel {
    pub name: String,
    pub model: String,
}

/// One completion backend: the coordinator or a coder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    /// One of `openai`, `deepseek`, `openrouter`, `anthropic`
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub api_key_env: String,
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backups: Vec<BackupModel>,
}

fn default_backend_timeout_secs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

impl BackendConfig {
    fn new(name: &str, provider: ProviderKind, model: &str, api_key_env: &str) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            base_url: None,
            api_key_env: api_key_env.to_string(),
            timeout_secs: default_backend_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            backups: Vec::new(),
        }
    }

    /// Parse the provider string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unknown provider kind.
    pub fn provider_kind(&self) -> Result<ProviderKind, ConfigError> {
        ProviderKind::from_str(&self.provider).map_err(|_| ConfigError::InvalidValue {
            key: format!("{}.provider", self.name),
            value: format!(
                "unknown provider '{}' (expected openai, deepseek, openrouter or anthropic)",
                self.provider
            ),
        })
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Endpoint, falling back to the provider default when unset or unparseable.
    #[must_use]
    pub fn endpoint(&self) -> String {
        match (&self.base_url, self.provider_kind()) {
            (Some(url), _) => url.clone(),
            (None, Ok(kind)) => kind.default_base_url().to_string(),
            (None, Err(_)) => String::new(),
        }
    }
}

/// Partial backend used for the `[coordinator]` section, merged over the default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendOverrides {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub backups: Option<Vec<BackupModel>>,
}

/// One `[[search]]` entry; list order is the failover order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchProviderConfig {
    pub name: String,
    /// One of `tavily`, `brave`
    pub provider: String,
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_search_timeout_secs() -> u64 {
    30
}

impl SearchProviderConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unknown provider kind.
    pub fn provider_kind(&self) -> Result<SearchProviderKind, ConfigError> {
        SearchProviderKind::from_str(&self.provider).map_err(|_| ConfigError::InvalidValue {
            key: format!("search.{}.provider", self.name),
            value: format!(
                "unknown search provider '{}' (expected tavily or brave)",
                self.provider
            ),
        })
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which memory store backs conversation history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    /// JSON files under `memory.dir`
    #[default]
    Json,
    /// Process-local, lost on exit
    InMemory,
    /// Memory hooks are no-ops
    Disabled,
}

impl std::fmt::Display for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::InMemory => write!(f, "inmemory"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// `[memory]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub backend: MemoryBackend,
    pub dir: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::Json,
            dir: PathBuf::from(".quorum").join("memory"),
        }
    }
}

/// Effective configuration after discovery and precedence resolution.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub orchestrator: OrchestratorConfig,
    pub coordinator: BackendConfig,
    /// Fan-out order is list order
    pub coders: Vec<BackendConfig>,
    /// Failover order is list order
    pub search: Vec<SearchProviderConfig>,
    pub memory: MemoryConfig,
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Config {
    /// Built-in defaults with no file or CLI input applied.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            server: ServerConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            coordinator: default_coordinator(),
            coders: default_coders(),
            search: default_search_providers(),
            memory: MemoryConfig::default(),
            source_attribution: HashMap::new(),
        }
    }

    /// Look up a coder by name.
    #[must_use]
    pub fn coder(&self, name: &str) -> Option<&BackendConfig> {
        self.coders.iter().find(|c| c.name == name)
    }
}

#[must_use]
pub fn default_coordinator() -> BackendConfig {
    BackendConfig::new(
        "coordinator",
        ProviderKind::OpenAi,
        "gpt-4-turbo",
        "OPENAI_API_KEY",
    )
}

#[must_use]
pub fn default_coders() -> Vec<BackendConfig> {
    let deepseek = BackendConfig::new(
        "deepseek",
        ProviderKind::DeepSeek,
        "deepseek-coder",
        "DEEPSEEK_API_KEY",
    );

    let claude = BackendConfig::new(
        "claude",
        ProviderKind::Anthropic,
        "claude-3-haiku-20240307",
        "ANTHROPIC_API_KEY",
    );

    let liquid = BackendConfig::new(
        "liquid",
        ProviderKind::OpenRouter,
        "liquid/lfm-40b",
        "OPENROUTER_API_KEY",
    );

    let mut hermes = BackendConfig::new(
        "hermes",
        ProviderKind::OpenRouter,
        "nousresearch/hermes-3-llama-3.1-405b:free",
        "OPENROUTER_API_KEY",
    );
    hermes.max_tokens = 2048;
    hermes.backups = vec![
        BackupModel {
            name: "hermes-backup-1".to_string(),
            model: "google/gemini-flash-1.5".to_string(),
        },
        BackupModel {
            name: "hermes-backup-2".to_string(),
            model: "meta-llama/llama-2-70b-instruct".to_string(),
        },
    ];

    vec![deepseek, claude, liquid, hermes]
}

#[must_use]
pub fn default_search_providers() -> Vec<SearchProviderConfig> {
    vec![
        SearchProviderConfig {
            name: "tavily".to_string(),
            provider: SearchProviderKind::Tavily.to_string(),
            api_key_env: "TAVILY_API_KEY".to_string(),
            base_url: None,
            timeout_secs: default_search_timeout_secs(),
        },
        SearchProviderConfig {
            name: "brave".to_string(),
            provider: SearchProviderKind::Brave.to_string(),
            api_key_env: "BRAVE_API_KEY".to_string(),
            base_url: None,
            timeout_secs: default_search_timeout_secs(),
        },
    ]
}
