//! CLI entry point
//!
//! [`run`] owns all terminal output, including error reports. It returns the exit
//! code instead of exiting so `main` stays a one-liner.

mod args;

pub use args::{Cli, Commands};

use std::io::Write;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::debug;

use quorum_config::Config;
use quorum_engine::{Stage, StreamFrame, TaskRequest};
use quorum_utils::logging::init_tracing;
use quorum_utils::{ConfigError, ExitCode};

use crate::error::QuorumError;
use crate::server::{self, AppState};

pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.verbose, cli.json_logs) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err.display_for_user());
            return Err(err.to_exit_code());
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    match rt.block_on(execute(cli.command, config)) {
        Ok(()) => Ok(()),
        Err(err) => {
            eprintln!("{}", err.display_for_user());
            Err(err.to_exit_code())
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, QuorumError> {
    Config::discover(&cli.to_cli_args()).map_err(discovery_error)
}

/// Any discovery failure is reported as a configuration error.
fn discovery_error(err: anyhow::Error) -> QuorumError {
    match err.downcast::<ConfigError>() {
        Ok(config_error) => QuorumError::Config(config_error),
        Err(other) => QuorumError::Config(ConfigError::InvalidFile(format!("{other:#}"))),
    }
}

async fn execute(command: Commands, config: Config) -> Result<(), QuorumError> {
    match command {
        Commands::Serve { .. } => server::serve(AppState::from_config(&config)?).await,
        Commands::Ask {
            task,
            stream,
            conversation_id,
        } => ask(&config, task, stream, conversation_id).await,
        Commands::Config => {
            print_config(&config);
            Ok(())
        }
    }
}

async fn ask(
    config: &Config,
    task: String,
    stream: bool,
    conversation_id: Option<String>,
) -> Result<(), QuorumError> {
    let state = AppState::from_config(config)?;
    let mut request = TaskRequest::from_task(task);
    request.conversation_id = conversation_id;

    if stream {
        let rx = state.orchestrator.stream(request);
        let failure = write_frames(rx, &mut std::io::stdout()).await;
        return failure.map_or(Ok(()), |msg| Err(QuorumError::TaskFailed(msg)));
    }

    let batch = state.orchestrator.collect(request).await;
    print!("{}", batch.content);
    if batch.errored() {
        let msg = batch
            .frames
            .last()
            .map(|f| f.payload.trim().to_string())
            .unwrap_or_default();
        return Err(QuorumError::TaskFailed(msg));
    }
    Ok(())
}

/// Write each frame's payload to `out` as it arrives.
///
/// Returns the error frame's message, if the task failed. A write failure (a
/// closed pipe, typically) stops reading, which drops the receiver and cancels
/// the task.
async fn write_frames<W: Write>(
    mut rx: mpsc::Receiver<StreamFrame>,
    out: &mut W,
) -> Option<String> {
    let mut failure = None;
    while let Some(frame) = rx.recv().await {
        if frame.stage == Stage::Error {
            failure = Some(frame.payload.trim().to_string());
        }
        if let Err(e) = out
            .write_all(frame.payload.as_bytes())
            .and_then(|()| out.flush())
        {
            debug!(error = %e, sequence = frame.sequence, "Output closed, abandoning task");
            break;
        }
    }
    failure
}

fn print_config(config: &Config) {
    println!("Effective configuration:");
    for (key, (value, source)) in config.effective_config() {
        println!("  {key} = {value} (from {source})");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_discovery_errors_keep_config_error() {
        let err = anyhow::Error::new(ConfigError::NotFound {
            path: "missing.toml".to_string(),
        });
        let mapped = discovery_error(err);
        assert!(matches!(mapped, QuorumError::Config(ConfigError::NotFound { .. })));
        assert_eq!(mapped.to_exit_code(), ExitCode::CLI_ARGS);
    }

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn frame(sequence: u64, stage: Stage, payload: &str) -> StreamFrame {
        StreamFrame {
            sequence,
            stage,
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_write_frames_copies_payloads_and_reports_error() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(frame(0, Stage::Analysis, "analysis\n")).await.unwrap();
        tx.send(frame(1, Stage::Error, "Error: all coders failed\n"))
            .await
            .unwrap();
        drop(tx);

        let mut out = Vec::new();
        let failure = write_frames(rx, &mut out).await;

        assert_eq!(String::from_utf8(out).unwrap(), "analysis\nError: all coders failed\n");
        assert_eq!(failure.as_deref(), Some("Error: all coders failed"));
    }

    #[tokio::test]
    async fn test_write_frames_stops_when_output_closes() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(frame(0, Stage::Analysis, "analysis\n")).await.unwrap();
        tx.send(frame(1, Stage::Answer, "answer\n")).await.unwrap();

        let failure = write_frames(rx, &mut ClosedPipe).await;

        assert!(failure.is_none());
        // The receiver is gone, so the producing task sees the stream as closed.
        assert!(tx.is_closed());
        assert!(tx.send(frame(2, Stage::Done, "")).await.is_err());
    }

    #[test]
    fn test_other_discovery_errors_become_invalid_file() {
        let err = std::fs::read_to_string("/nonexistent/quorum.toml")
            .context("Failed to read config")
            .unwrap_err();
        let mapped = discovery_error(err);
        assert!(matches!(mapped, QuorumError::Config(ConfigError::InvalidFile(ref msg)) if msg.contains("Failed to read config")));
    }
}
