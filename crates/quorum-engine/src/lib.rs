//! Dispatch core of quorum
//!
//! - [`failover`]: ordered-candidate failover over any capability
//! - [`fanout`]: concurrent solver fan-out and primary-solution selection
//! - [`model_chain`]: a backend's primary and backup models as one completer
//! - [`registry`]: capability chains built from configuration
//! - [`orchestrator`]: the task state machine
//! - [`stream`]: frame sequencing and SSE / batch encodings
//!
//! The engine only sees the `Completer`, `Searcher` and `MemoryStore` traits; it
//! never talks HTTP itself.

pub mod failover;
pub mod fanout;
pub mod model_chain;
pub mod orchestrator;
pub mod registry;
pub mod stream;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use failover::{
    Attempt, AttemptSummary, Candidate, CandidateChain, DispatchOutcome, FailoverDispatcher,
};
pub use fanout::{
    BackendOutcome, FanOutAggregator, NamedCompleter, extract_primary_artifact, select_primary,
};
pub use model_chain::ModelChain;
pub use orchestrator::prompts::needs_search;
pub use orchestrator::{
    OrchestrationError, SearchOutcome, TaskOrchestrator, TaskRecord, TaskRequest, TaskState,
};
pub use registry::BackendRegistry;
pub use stream::{
    BatchResponse, ResponseShape, SSE_DONE, SseEnvelope, Stage, StreamEncoder, StreamFrame,
};
