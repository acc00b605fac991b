//! Command-line argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use quorum_config::CliArgs;

/// quorum - failover, fan-out and streaming across LLM backends
#[derive(Parser, Debug)]
#[command(name = "quorum")]
#[command(about = "Run tasks across several LLM backends with failover, fan-out and streaming")]
#[command(long_about = r#"
quorum sends one task to a coordinator model, gathers web search results when the
task asks for current information, fans the task out to every configured coding
backend, and has the coordinator review the preferred solution. Each backend may
list backup models that are tried in order when the primary fails.

EXAMPLES:
  # Serve the OpenAI-compatible API on the configured port
  quorum serve --port 8080

  # Run one task and print each stage as it finishes
  quorum ask "implement a ring buffer in Rust" --stream

  # Show the effective configuration and where each value came from
  quorum config

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  Config file is discovered by searching upward from CWD for .quorum/config.toml
  Use --config to specify an explicit config file path
  API keys are read from the environment variables named in the config
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Coder whose solution is reviewed when it succeeds
    #[arg(long, global = true)]
    pub preferred_backend: Option<String>,

    /// Directory for the JSON memory store
    #[arg(long, global = true)]
    pub memory_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the OpenAI-compatible HTTP server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// First port to try; later ports are tried if it is taken
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run a single task and print the result
    Ask {
        /// Task text
        task: String,

        /// Print each stage as soon as it completes
        #[arg(long)]
        stream: bool,

        /// Continue an existing conversation
        #[arg(long)]
        conversation_id: Option<String>,
    },

    /// Print the effective configuration with source attribution
    Config,
}

impl Cli {
    /// Values that override the config file.
    #[must_use]
    pub fn to_cli_args(&self) -> CliArgs {
        let (host, port) = match &self.command {
            Commands::Serve { host, port } => (host.clone(), *port),
            _ => (None, None),
        };
        CliArgs {
            config_path: self.config.clone(),
            preferred_backend: self.preferred_backend.clone(),
            host,
            port,
            memory_dir: self.memory_dir.clone(),
        }
    }
}
