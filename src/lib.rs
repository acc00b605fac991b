//! quorum - failover, fan-out and streaming dispatch across LLM backends
//!
//! A task is classified by a coordinator model, optionally enriched with web search
//! results, sent to every configured coding backend concurrently, and the preferred
//! solution is reviewed. Each stage is reported as an ordered frame that can be
//! streamed as server-sent events or collected into one response.
//!
//! quorum can be used in two ways:
//! - **CLI**: `quorum serve`, `quorum ask`, `quorum config`
//! - **Library**: build a [`TaskOrchestrator`] from a [`Config`] and drive tasks directly
//!
//! # Quick Start (Library)
//!
//! ```no_run
//! use quorum::{AppState, Config, TaskRequest};
//!
//! # async fn demo() -> Result<(), quorum::QuorumError> {
//! let config = Config::defaults();
//! let state = AppState::from_config(&config)?;
//! let batch = state
//!     .orchestrator
//!     .collect(TaskRequest::from_task("implement a ring buffer"))
//!     .await;
//! println!("{}", batch.content);
//! # Ok(())
//! # }
//! ```
//!
//! # Crate layout
//!
//! | Crate | Concern |
//! |-------|---------|
//! | `quorum-utils` | Error taxonomy, logging, redaction, atomic writes, exit codes |
//! | `quorum-config` | TOML discovery and precedence |
//! | `quorum-llm` | Chat completion adapters |
//! | `quorum-search` | Web search adapters |
//! | `quorum-memory` | Conversation memory stores |
//! | `quorum-engine` | Failover, fan-out, orchestration, stream frames |

pub mod cli;
pub mod error;
pub mod server;

pub use error::QuorumError;
pub use server::{AppState, router};

pub use quorum_config::{CliArgs, Config};
pub use quorum_engine::{
    BackendRegistry, BatchResponse, CandidateChain, DispatchOutcome, FailoverDispatcher,
    FanOutAggregator, Stage, StreamFrame, TaskOrchestrator, TaskRequest,
};
pub use quorum_utils::ExitCode;
