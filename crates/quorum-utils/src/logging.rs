//! Logging and observability setup for quorum
//!
//! Structured `tracing` output with either a compact human format or JSON lines.
//! Orchestrator runs are wrapped in a [`task_span`] so every log line emitted while
//! serving a task carries its `task_id`.

use std::time::Instant;
use tracing::{Span, debug, info_span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::redaction::redact_error_message;

/// Build the env filter: `RUST_LOG` wins, otherwise a verbosity-dependent default.
fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("quorum=debug,info")
            } else {
                EnvFilter::try_new("quorum=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber.
///
/// # Arguments
/// * `verbose` - debug level for quorum crates, with span close events
/// * `json` - emit one JSON object per line instead of the compact format
///
/// # Errors
/// Fails if a global subscriber has already been installed.
pub fn init_tracing(verbose: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = env_filter(verbose);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init()?;
    } else if verbose {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one orchestrator run.
#[must_use]
pub fn task_span(task_id: &str) -> Span {
    info_span!("task", task_id = %task_id)
}

/// Times a single stage of a task and logs its outcome when finished.
#[derive(Debug)]
pub struct StageTimer {
    stage: &'static str,
    started: Instant,
}

impl StageTimer {
    #[must_use]
    pub fn start(stage: &'static str) -> Self {
        debug!(stage, "Stage started");
        Self {
            stage,
            started: Instant::now(),
        }
    }

    /// Milliseconds since the stage started.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn finish_ok(self) -> u64 {
        let duration_ms = self.elapsed_ms();
        debug!(stage = self.stage, duration_ms, "Stage completed");
        duration_ms
    }

    pub fn finish_err(self, error: &str) -> u64 {
        let duration_ms = self.elapsed_ms();
        tracing::warn!(
            stage = self.stage,
            duration_ms,
            error = %redact_error_message(error),
            "Stage failed"
        );
        duration_ms
    }
}
