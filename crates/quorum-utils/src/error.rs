use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Trait for errors that can explain themselves to an operator.
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    ProviderIntegration,
    ResourceLimits,
    Orchestration,
    FileSystem,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::ProviderIntegration => write!(f, "Provider Integration"),
            Self::ResourceLimits => write!(f, "Resource Limits"),
            Self::Orchestration => write!(f, "Orchestration"),
            Self::FileSystem => write!(f, "File System"),
        }
    }
}

/// Stable, serializable label for a [`CapabilityError`] variant.
///
/// Attempt histories carry this label so they can be logged or returned
/// without exposing provider payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityErrorKind {
    Transport,
    Timeout,
    ProviderAuth,
    ProviderQuota,
    ProviderOutage,
    Format,
    Misconfiguration,
    Exhausted,
}

impl fmt::Display for CapabilityErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::ProviderAuth => "provider_auth",
            Self::ProviderQuota => "provider_quota",
            Self::ProviderOutage => "provider_outage",
            Self::Format => "format",
            Self::Misconfiguration => "misconfiguration",
            Self::Exhausted => "exhausted",
        };
        f.write_str(label)
    }
}

/// Failure reported by a `Completer` or `Searcher` capability.
///
/// Every variant is failover-eligible: the dispatcher records it against the
/// candidate that produced it and moves on to the next one. Only
/// [`CapabilityError::Exhausted`] summarizes a whole chain.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CapabilityError {
    /// Network failure, connection refused, unexpected status
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invocation exceeded its time bound
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Provider rejected the credentials (401, 403, missing key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider rate limit or usage quota hit (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider-side failure (5xx)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Response arrived but was missing required fields or was not parseable
    #[error("Malformed response: {0}")]
    Format(String),

    /// Adapter cannot be used as configured
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Every candidate in a chain failed
    #[error("All candidates failed ({}); last error: {last}", attempted.join(", "))]
    Exhausted {
        attempted: Vec<String>,
        last: Box<CapabilityError>,
    },
}

impl CapabilityError {
    #[must_use]
    pub fn kind(&self) -> CapabilityErrorKind {
        match self {
            Self::Transport(_) => CapabilityErrorKind::Transport,
            Self::Timeout { .. } => CapabilityErrorKind::Timeout,
            Self::ProviderAuth(_) => CapabilityErrorKind::ProviderAuth,
            Self::ProviderQuota(_) => CapabilityErrorKind::ProviderQuota,
            Self::ProviderOutage(_) => CapabilityErrorKind::ProviderOutage,
            Self::Format(_) => CapabilityErrorKind::Format,
            Self::Misconfiguration(_) => CapabilityErrorKind::Misconfiguration,
            Self::Exhausted { .. } => CapabilityErrorKind::Exhausted,
        }
    }

    /// True for the transport family: network, timeout, auth, quota and outage.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Timeout { .. }
                | Self::ProviderAuth(_)
                | Self::ProviderQuota(_)
                | Self::ProviderOutage(_)
        )
    }

    /// Candidate names tried before giving up, empty unless `Exhausted`.
    #[must_use]
    pub fn attempted(&self) -> &[String] {
        match self {
            Self::Exhausted { attempted, .. } => attempted,
            _ => &[],
        }
    }

    /// The innermost non-exhausted error.
    #[must_use]
    pub fn root_cause(&self) -> &CapabilityError {
        match self {
            Self::Exhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

impl UserFriendlyError for CapabilityError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("Backend could not be reached: {msg}"),
            Self::Timeout { duration } => {
                format!("Backend did not answer within {duration:?}")
            }
            Self::ProviderAuth(msg) => format!("Backend rejected the credentials: {msg}"),
            Self::ProviderQuota(msg) => format!("Backend quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("Backend service outage: {msg}"),
            Self::Format(msg) => format!("Backend returned an unusable response: {msg}"),
            Self::Misconfiguration(msg) => format!("Backend is misconfigured: {msg}"),
            Self::Exhausted { attempted, last } => format!(
                "No candidate succeeded (tried {}): {}",
                attempted.join(", "),
                last.user_message()
            ),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::ProviderAuth(_) => Some(
                "API keys are read from the environment variable named in the backend's \
                 api_key_env setting."
                    .to_string(),
            ),
            Self::Exhausted { .. } => Some(
                "Candidates are tried in configured order; the last error is reported.".to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Transport(_) | Self::ProviderOutage(_) => vec![
                "Check network connectivity to the provider".to_string(),
                "Configure a backup model or search provider".to_string(),
            ],
            Self::Timeout { .. } => {
                vec!["Increase timeout_secs for the backend in config.toml".to_string()]
            }
            Self::ProviderAuth(_) => vec![
                "Check that the API key environment variable is set".to_string(),
                "Verify the API key is valid and not expired".to_string(),
            ],
            Self::ProviderQuota(_) => vec!["Wait a few minutes and try again".to_string()],
            Self::Format(_) => vec!["Run with --verbose to inspect provider responses".to_string()],
            Self::Misconfiguration(_) => {
                vec!["Run `quorum config` to review the effective configuration".to_string()]
            }
            Self::Exhausted { last, .. } => last.suggestions(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ProviderAuth(_) | Self::Misconfiguration(_) => ErrorCategory::Configuration,
            Self::ProviderQuota(_) => ErrorCategory::ResourceLimits,
            Self::Exhausted { last, .. } => last.category(),
            _ => ErrorCategory::ProviderIntegration,
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::MissingRequired(key) => {
                format!("Required configuration '{key}' is missing")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => {
                format!("Configuration file not found: {path}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "Configuration is read from .quorum/config.toml, discovered upward from the \
             working directory, or from --config."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec!["Check the TOML syntax of the config file".to_string()],
            Self::MissingRequired(key) => vec![format!("Add '{key}' to the config file")],
            Self::InvalidValue { key, .. } => {
                vec![format!("Correct the value of '{key}' in the config file")]
            }
            Self::NotFound { .. } => vec![
                "Pass an existing file to --config".to_string(),
                "Or omit --config to use discovery and built-in defaults".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}
