//! Task orchestration: classify, optionally search, fan out, review
//!
//! [`TaskOrchestrator`] drives one task through its [`TaskState`]s and reports each
//! finished stage as a [`StreamFrame`] on a bounded channel. The same run feeds
//! both delivery modes: [`TaskOrchestrator::stream`] hands the receiver to the
//! caller, [`TaskOrchestrator::collect`] drains it into a [`BatchResponse`].
//!
//! Every stage races against the consumer going away. Once the receiver is
//! dropped, in-flight capability calls are abandoned and no further frames are
//! produced.

pub mod prompts;
mod state;

pub use self::state::{OrchestrationError, SearchOutcome, TaskRecord, TaskState};

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use quorum_config::OrchestratorConfig;
use quorum_llm::{Message, Role};
use quorum_memory::{MemoryStore, render_prompt_context};
use quorum_search::{SearchHit, Searcher};
use quorum_utils::CapabilityError;
use quorum_utils::atomic_write::write_file_atomic;
use quorum_utils::logging::{StageTimer, task_span};

use crate::failover::{CandidateChain, DispatchOutcome, FailoverDispatcher};
use crate::fanout::{FanOutAggregator, extract_primary_artifact, select_primary};
use crate::registry::BackendRegistry;
use crate::stream::{BatchResponse, ResponseShape, Stage, StreamEncoder, StreamFrame};

use self::prompts::{
    SEARCH_SUMMARY_KEY, analysis_payload, analysis_prompt, answer_payload, answer_prompt,
    coder_context, error_payload, format_hits, needs_search, review_payload, review_prompt,
    search_payload, solution_payload, summary_prompt,
};

/// One incoming task: the client's messages and, optionally, the conversation
/// they belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub messages: Vec<Message>,
    pub conversation_id: Option<String>,
}

impl TaskRequest {
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            conversation_id: None,
        }
    }

    /// Request consisting of a single user message.
    pub fn from_task(task: impl Into<String>) -> Self {
        Self::new(vec![Message::user(task)])
    }

    #[must_use]
    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// The task text: the last user message, else the last message of any role.
    #[must_use]
    pub fn task_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .or_else(|| self.messages.last())
            .map_or("", |m| m.content.as_str())
    }
}

fn new_conversation_id() -> String {
    format!("conversation-{}", Uuid::new_v4().simple())
}

/// Why a run stopped before reaching `Done`.
enum Halt {
    /// The frame receiver was dropped
    Cancelled,
    Failed(OrchestrationError),
}

impl From<OrchestrationError> for Halt {
    fn from(error: OrchestrationError) -> Self {
        Self::Failed(error)
    }
}

/// Run `work` unless the consumer disconnects first.
async fn until_closed<F: Future>(
    tx: &mpsc::Sender<StreamFrame>,
    work: F,
) -> Result<F::Output, Halt> {
    tokio::select! {
        biased;
        output = work => Ok(output),
        () = tx.closed() => Err(Halt::Cancelled),
    }
}

/// Drives tasks through classification, search, fan-out and review.
///
/// Cheap to clone; clones share the registry and the memory store.
#[derive(Clone)]
pub struct TaskOrchestrator {
    registry: Arc<BackendRegistry>,
    memory: Arc<dyn MemoryStore>,
    settings: Arc<OrchestratorConfig>,
    coordinator: FailoverDispatcher,
    search: FailoverDispatcher,
    fanout: FanOutAggregator,
}

impl TaskOrchestrator {
    pub fn new(
        registry: Arc<BackendRegistry>,
        memory: Arc<dyn MemoryStore>,
        settings: OrchestratorConfig,
    ) -> Self {
        Self {
            registry,
            memory,
            settings: Arc::new(settings),
            coordinator: FailoverDispatcher::new("coordinator"),
            search: FailoverDispatcher::new("search"),
            fanout: FanOutAggregator::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    #[must_use]
    pub fn settings(&self) -> &OrchestratorConfig {
        &self.settings
    }

    /// Start a task in the background and return its frames as they are produced.
    ///
    /// The channel holds at most `stream_buffer` frames; a slow consumer slows the
    /// task down. Dropping the receiver cancels the task.
    #[must_use]
    pub fn stream(&self, request: TaskRequest) -> mpsc::Receiver<StreamFrame> {
        let (tx, rx) = mpsc::channel(self.settings.stream_buffer.max(1));
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.execute(request, tx).await;
        });
        rx
    }

    /// Run a task to completion and buffer every frame.
    pub async fn collect(&self, request: TaskRequest) -> BatchResponse {
        self.collect_with_record(request).await.0
    }

    /// Like [`collect`](Self::collect), also returning the finished task record.
    pub async fn collect_with_record(&self, request: TaskRequest) -> (BatchResponse, TaskRecord) {
        let (tx, mut rx) = mpsc::channel(self.settings.stream_buffer.max(1));
        let drain = async move {
            let mut frames = Vec::new();
            while let Some(frame) = rx.recv().await {
                frames.push(frame);
            }
            frames
        };
        let (record, frames) = tokio::join!(self.execute(request, tx), drain);
        (BatchResponse::from_frames(frames), record)
    }

    /// Drive one task, sending its frames on `tx`.
    ///
    /// Returns the task record in whatever state the run ended: `Done`, `Errored`,
    /// or the last live state if the consumer disconnected.
    pub async fn execute(&self, request: TaskRequest, tx: mpsc::Sender<StreamFrame>) -> TaskRecord {
        let task_id = Uuid::new_v4().simple().to_string();
        let conversation_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(new_conversation_id);
        let span = task_span(&task_id);

        let mut run = TaskRun {
            orchestrator: self,
            tx,
            encoder: StreamEncoder::new(),
            record: TaskRecord::new(task_id, conversation_id),
        };

        async move {
            info!(
                conversation_id = %run.record.conversation_id,
                messages = request.messages.len(),
                "Task accepted"
            );
            let outcome = run.drive(&request).await;
            run.finish(outcome).await;
            run.record
        }
        .instrument(span)
        .await
    }

    /// Send `messages` straight to one coder, bypassing orchestration.
    ///
    /// Returns `None` if no coder has that name. A failed call yields a single
    /// `error` frame.
    pub async fn passthrough(&self, backend: &str, messages: &[Message]) -> Option<Vec<StreamFrame>> {
        let coder = self.registry.coder(backend)?;
        let chain = coder.chain();
        let outcome = FailoverDispatcher::new(backend)
            .dispatch(&chain, |completer| async move {
                completer.complete(messages).await
            })
            .await;

        let mut encoder = StreamEncoder::new();
        Some(match outcome.into_result() {
            Ok(result) => encoder.encode_shape(ResponseShape::Completion(result)),
            Err(e) => {
                warn!(backend, error = %e, "Direct completion failed");
                encoder
                    .encode(Stage::Error, error_payload(&e.to_string()))
                    .into_iter()
                    .collect()
            }
        })
    }

    /// Prepend the rendered memory of `conversation_id` to a coordinator prompt.
    async fn with_memory(&self, conversation_id: &str, mut messages: Vec<Message>) -> Vec<Message> {
        let history = self.memory.read(conversation_id).await;
        let artifacts = self
            .memory
            .recent_artifacts(self.settings.memory_artifacts_in_prompt)
            .await;
        let context = self.memory.context().await;

        let rendered = render_prompt_context(&history, &artifacts, &context);
        if !rendered.is_empty() {
            messages.insert(0, Message::system(format!("Memory Context:\n{rendered}")));
        }
        messages
    }

    /// One coordinator call; the reply is remembered as an assistant turn.
    async fn ask_coordinator(
        &self,
        conversation_id: &str,
        messages: Vec<Message>,
    ) -> Result<String, CapabilityError> {
        let messages = self.with_memory(conversation_id, messages).await;
        let messages = messages.as_slice();
        let chain = self.registry.coordinator().chain();

        let reply = self
            .coordinator
            .dispatch(&chain, |completer| async move {
                completer.complete(messages).await
            })
            .await
            .into_result()?
            .content;

        self.memory
            .append(conversation_id, Role::Assistant, &reply)
            .await;
        Ok(reply)
    }

    async fn run_search(
        &self,
        chain: &CandidateChain<dyn Searcher>,
        query: &str,
    ) -> DispatchOutcome<Vec<SearchHit>> {
        let max_results = self.settings.max_search_results;
        self.search
            .dispatch(chain, |searcher| async move {
                searcher.search(query, max_results).await
            })
            .await
    }

    /// Write the code block of the reviewed solution to `artifact_path`, if set.
    fn write_artifact(&self, solution: &str) {
        let Some(path) = self.settings.artifact_path.as_deref() else {
            return;
        };
        let Some(code) = extract_primary_artifact(solution) else {
            debug!("Primary solution has no code block, nothing written");
            return;
        };
        match write_file_atomic(path, &code) {
            Ok(()) => info!(path = %path.display(), bytes = code.len(), "Wrote primary artifact"),
            Err(e) => warn!(path = %path.display(), error = %format!("{e:#}"), "Failed to write primary artifact"),
        }
    }
}

impl std::fmt::Debug for TaskOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOrchestrator")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// State of a single run: its record, its encoder and where frames go.
struct TaskRun<'a> {
    orchestrator: &'a TaskOrchestrator,
    tx: mpsc::Sender<StreamFrame>,
    encoder: StreamEncoder,
    record: TaskRecord,
}

impl TaskRun<'_> {
    async fn emit(&mut self, stage: Stage, payload: String) -> Result<(), Halt> {
        let Some(frame) = self.encoder.encode(stage, payload) else {
            return Ok(());
        };
        self.record.frames_emitted = self.encoder.frames_emitted();
        self.tx.send(frame).await.map_err(|_| Halt::Cancelled)
    }

    async fn drive(&mut self, request: &TaskRequest) -> Result<(), Halt> {
        let orch = self.orchestrator;
        let settings = orch.settings.as_ref();
        let task = request.task_text();
        let conversation_id = self.record.conversation_id.clone();

        orch.memory
            .append(&conversation_id, Role::User, task)
            .await;

        // Classification
        let timer = StageTimer::start("analysis");
        let prompt = vec![
            Message::system(analysis_prompt(&settings.simple_question_marker)),
            Message::user(task),
        ];
        let analysis = match until_closed(&self.tx, orch.ask_coordinator(&conversation_id, prompt)).await? {
            Ok(reply) => {
                timer.finish_ok();
                reply
            }
            Err(e) => {
                timer.finish_err(&e.to_string());
                return Err(OrchestrationError::Classification(e).into());
            }
        };
        let simple = analysis.contains(&settings.simple_question_marker);
        self.record.analysis = Some(analysis.clone());
        self.emit(Stage::Analysis, analysis_payload(&analysis)).await?;
        self.record.transition(TaskState::Classified)?;
        debug!(simple, "Task classified");

        // Optional search
        if needs_search(task, &settings.search_vocabulary) {
            if let Some(chain) = orch.registry.search_chain() {
                self.search(chain, task).await?;
            } else {
                debug!("Task matches search vocabulary but no search provider is configured");
            }
        }

        if simple {
            return self.answer(task).await;
        }

        // Fan-out
        let mut context = request.messages.clone();
        context.push(Message::system(coder_context(
            &analysis,
            self.record.search_summary(),
        )));
        let timer = StageTimer::start("solve");
        let outcomes = until_closed(&self.tx, orch.fanout.run(orch.registry.coders(), &context)).await?;
        timer.finish_ok();

        for outcome in &outcomes {
            if let Some(result) = outcome.outcome.result() {
                orch.memory
                    .append_artifact(
                        &format!("{}_solution", outcome.backend),
                        &result.content,
                        &format!("Solution generated by {}", outcome.backend),
                    )
                    .await;
            }
        }
        for outcome in &outcomes {
            let body = match &outcome.outcome {
                DispatchOutcome::Success { result, .. } => result.content.clone(),
                DispatchOutcome::Failure { last_error, .. } => format!("Error: {last_error}"),
            };
            self.emit(Stage::Solution, solution_payload(&outcome.backend, &body))
                .await?;
        }
        self.record.solutions = outcomes;

        let Some(primary) = select_primary(&self.record.solutions, &settings.preferred_backend)
        else {
            let attempted = self
                .record
                .solutions
                .iter()
                .map(|o| o.backend.clone())
                .collect();
            return Err(OrchestrationError::NoSolution { attempted }.into());
        };
        let primary_backend = primary.backend.clone();
        let solution = primary.content().unwrap_or_default().to_string();
        info!(
            backend = %primary_backend,
            model = primary.model().unwrap_or_default(),
            "Selected primary solution"
        );
        self.record.transition(TaskState::Solved)?;
        orch.write_artifact(&solution);

        // Review
        let timer = StageTimer::start("review");
        let prompt = vec![Message::system(review_prompt()), Message::user(solution.clone())];
        let review = match until_closed(&self.tx, orch.ask_coordinator(&conversation_id, prompt)).await? {
            Ok(review) => {
                timer.finish_ok();
                review
            }
            Err(e) => {
                timer.finish_err(&e.to_string());
                return Err(OrchestrationError::Review(e).into());
            }
        };
        orch.memory
            .append_artifact("solution_review", &solution, &review)
            .await;
        self.record.review = Some(review.clone());
        self.emit(Stage::Review, review_payload(&review)).await?;
        self.record.transition(TaskState::Reviewed)?;
        self.record.transition(TaskState::Done)?;
        Ok(())
    }

    /// Search, then summarize the hits. Failures here never fail the task.
    async fn search(&mut self, chain: &CandidateChain<dyn Searcher>, task: &str) -> Result<(), Halt> {
        let orch = self.orchestrator;
        let conversation_id = self.record.conversation_id.clone();

        let timer = StageTimer::start("search");
        let dispatch = until_closed(&self.tx, orch.run_search(chain, task)).await?;

        let summary = match dispatch.result() {
            Some(hits) if !hits.is_empty() => {
                let prompt = vec![Message::system(summary_prompt()), Message::user(format_hits(hits))];
                match until_closed(&self.tx, orch.ask_coordinator(&conversation_id, prompt)).await? {
                    Ok(summary) => {
                        timer.finish_ok();
                        Some(summary)
                    }
                    Err(e) => {
                        timer.finish_err(&format!("summary failed: {e}"));
                        None
                    }
                }
            }
            Some(_) => {
                timer.finish_err("search returned no results");
                None
            }
            None => {
                let reason = dispatch
                    .error()
                    .map_or_else(String::new, ToString::to_string);
                timer.finish_err(&reason);
                None
            }
        };

        let attempts = dispatch.attempts().len();
        self.record.search = Some(SearchOutcome {
            dispatch,
            summary: summary.clone(),
        });

        let Some(summary) = summary else {
            info!(attempts, "Continuing without search results");
            return Ok(());
        };
        orch.memory.set_context(SEARCH_SUMMARY_KEY, &summary).await;
        self.emit(Stage::Search, search_payload(&summary)).await?;
        self.record.transition(TaskState::Searched)?;
        Ok(())
    }

    /// Simple-question path: a single coordinator answer, no fan-out or review.
    async fn answer(&mut self, task: &str) -> Result<(), Halt> {
        let orch = self.orchestrator;
        let conversation_id = self.record.conversation_id.clone();
        let prompt = vec![
            Message::system(answer_prompt(self.record.search_summary())),
            Message::user(task),
        ];

        let answer = until_closed(&self.tx, orch.ask_coordinator(&conversation_id, prompt))
            .await?
            .map_err(OrchestrationError::Answer)?;
        self.emit(Stage::Answer, answer_payload(&answer)).await?;
        self.record.transition(TaskState::Done)?;
        Ok(())
    }

    async fn finish(&mut self, outcome: Result<(), Halt>) {
        match outcome {
            Ok(()) => {
                if self.emit(Stage::Done, String::new()).await.is_err() {
                    debug!("Consumer left before the done frame");
                }
                info!(frames = self.record.frames_emitted, "Task completed");
            }
            Err(Halt::Cancelled) => {
                info!(
                    state = %self.record.state(),
                    frames = self.record.frames_emitted,
                    "Consumer disconnected, task abandoned"
                );
            }
            Err(Halt::Failed(e)) => {
                error!(error = %e, state = %self.record.state(), "Task failed");
                if let Err(transition) = self.record.transition(TaskState::Errored) {
                    debug!(error = %transition, "Task already terminal");
                }
                if self.emit(Stage::Error, error_payload(&e.to_string())).await.is_err() {
                    debug!("Consumer left before the error frame");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failover::Candidate;
    use crate::fanout::NamedCompleter;
    use crate::test_support::{CoordinatorScript, MockCompleter, MockSearcher, hit};
    use quorum_config::Config;
    use quorum_llm::Completer;
    use quorum_memory::InMemoryStore;
    use std::time::Duration;

    const SECOND: Duration = Duration::from_secs(1);

    fn named(mock: MockCompleter) -> NamedCompleter {
        NamedCompleter::new(mock.name().to_string(), Arc::new(mock), SECOND)
    }

    fn settings() -> OrchestratorConfig {
        Config::minimal_for_testing().orchestrator
    }

    fn orchestrator(
        coordinator: MockCompleter,
        coders: Vec<MockCompleter>,
        search: Vec<MockSearcher>,
        memory: Arc<dyn MemoryStore>,
    ) -> TaskOrchestrator {
        let search = search
            .into_iter()
            .enumerate()
            .map(|(i, s)| {
                let name = s.name().to_string();
                let searcher: Arc<dyn Searcher> = Arc::new(s);
                Candidate::new(name, i == 0, searcher, SECOND)
            })
            .collect();
        let registry = BackendRegistry::new(
            named(coordinator),
            coders.into_iter().map(named).collect(),
            search,
        );
        TaskOrchestrator::new(Arc::new(registry), memory, settings())
    }

    fn stages(batch: &BatchResponse) -> Vec<Stage> {
        batch.frames.iter().map(|f| f.stage).collect()
    }

    #[test]
    fn test_task_text_prefers_last_user_message() {
        let request = TaskRequest::new(vec![
            Message::user("first"),
            Message::assistant("reply"),
            Message::user("second"),
            Message::assistant("trailing"),
        ]);
        assert_eq!(request.task_text(), "second");
        assert_eq!(TaskRequest::new(Vec::new()).task_text(), "");
    }

    #[tokio::test]
    async fn test_build_task_runs_every_stage_in_order() {
        let memory = Arc::new(InMemoryStore::new());
        let orch = orchestrator(
            CoordinatorScript::default().into_completer("coordinator"),
            vec![
                MockCompleter::replying("deepseek", "```python\nprint('d')\n```"),
                MockCompleter::replying("claude", "```python\nprint('c')\n```"),
            ],
            Vec::new(),
            memory.clone(),
        );

        let (batch, record) = orch
            .collect_with_record(TaskRequest::from_task("implement a tokenizer").with_conversation_id("conv-1"))
            .await;

        assert_eq!(
            stages(&batch),
            [Stage::Analysis, Stage::Solution, Stage::Solution, Stage::Review, Stage::Done]
        );
        assert_eq!(record.state(), TaskState::Done);
        assert_eq!(record.frames_emitted, 5);
        assert!(batch.content.contains("💻 Claude's Solution:\n```python\nprint('c')\n```"));
        assert!(batch.content.contains("🤖 Final Review:\nThe solution is correct."));

        let artifacts = memory.recent_artifacts(10).await;
        let names: Vec<_> = artifacts.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["deepseek_solution", "claude_solution", "solution_review"]);
        assert_eq!(artifacts[2].content, "```python\nprint('c')\n```");

        let history = memory.read("conv-1").await;
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "implement a tokenizer");
    }

    #[tokio::test]
    async fn test_classification_failure_emits_single_error_frame() {
        let orch = orchestrator(
            MockCompleter::failing("coordinator", CapabilityError::ProviderAuth("401".into())),
            vec![MockCompleter::replying("claude", "never")],
            Vec::new(),
            Arc::new(InMemoryStore::new()),
        );

        let (batch, record) = orch.collect_with_record(TaskRequest::from_task("build it")).await;

        assert_eq!(stages(&batch), [Stage::Error]);
        assert!(batch.errored());
        assert!(batch.content.starts_with("❌ Error: Error processing task: Task classification failed"));
        assert_eq!(record.state(), TaskState::Errored);
    }

    #[tokio::test]
    async fn test_all_coders_failing_is_no_solution() {
        let orch = orchestrator(
            CoordinatorScript::default().into_completer("coordinator"),
            vec![
                MockCompleter::failing("deepseek", CapabilityError::Transport("reset".into())),
                MockCompleter::failing("claude", CapabilityError::ProviderOutage("503".into())),
            ],
            Vec::new(),
            Arc::new(InMemoryStore::new()),
        );

        let (batch, record) = orch.collect_with_record(TaskRequest::from_task("build it")).await;

        assert_eq!(
            stages(&batch),
            [Stage::Analysis, Stage::Solution, Stage::Solution, Stage::Error]
        );
        assert!(batch.content.contains("💻 Deepseek's Solution:\nError: "));
        assert!(batch.content.contains("No backend produced a solution (tried deepseek, claude)"));
        assert_eq!(record.state(), TaskState::Errored);
        assert_eq!(record.solutions.len(), 2);
    }

    #[tokio::test]
    async fn test_review_failure_errors_after_solutions() {
        let coordinator = MockCompleter::scripted(
            "coordinator",
            vec![
                Ok("analysis".to_string()),
                Err(CapabilityError::Timeout { duration: SECOND }),
            ],
        );
        let orch = orchestrator(
            coordinator,
            vec![MockCompleter::replying("claude", "code")],
            Vec::new(),
            Arc::new(InMemoryStore::new()),
        );

        let batch = orch.collect(TaskRequest::from_task("build it")).await;
        assert_eq!(stages(&batch), [Stage::Analysis, Stage::Solution, Stage::Error]);
        assert!(batch.content.contains("Solution review failed"));
    }

    #[tokio::test]
    async fn test_search_exhaustion_is_not_fatal() {
        let tavily = MockSearcher::failing("tavily", CapabilityError::ProviderQuota("429".into()));
        let brave = MockSearcher::failing("brave", CapabilityError::ProviderAuth("missing".into()));
        let orch = orchestrator(
            CoordinatorScript::default().into_completer("coordinator"),
            vec![MockCompleter::replying("claude", "code")],
            vec![tavily, brave],
            Arc::new(InMemoryStore::new()),
        );

        let (batch, record) = orch
            .collect_with_record(TaskRequest::from_task("find the latest docs and build it"))
            .await;

        assert!(!stages(&batch).contains(&Stage::Search));
        assert_eq!(batch.frames.last().map(|f| f.stage), Some(Stage::Done));
        let search = record.search.unwrap();
        assert_eq!(search.dispatch.attempted(), ["tavily", "brave"]);
        assert!(search.summary.is_none());
    }

    #[tokio::test]
    async fn test_empty_search_results_skip_summary() {
        let coordinator = Arc::new(CoordinatorScript::default().into_completer("coordinator"));
        let coordinator_dyn: Arc<dyn Completer> = coordinator.clone();
        let search: Arc<dyn Searcher> = Arc::new(MockSearcher::returning("tavily", Vec::new()));
        let registry = BackendRegistry::new(
            NamedCompleter::new("coordinator", coordinator_dyn, SECOND),
            vec![named(MockCompleter::replying("claude", "code"))],
            vec![Candidate::primary("tavily", search, SECOND)],
        );
        let orch = TaskOrchestrator::new(Arc::new(registry), Arc::new(InMemoryStore::new()), settings());

        let batch = orch.collect(TaskRequest::from_task("search for nothing, then build")).await;

        assert!(!stages(&batch).contains(&Stage::Search));
        // analysis + review only; no summary call
        assert_eq!(coordinator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_search_summary_reaches_coders_and_context() {
        let memory = Arc::new(InMemoryStore::new());
        let claude = Arc::new(MockCompleter::replying("claude", "code"));
        let claude_dyn: Arc<dyn Completer> = claude.clone();
        let search: Arc<dyn Searcher> =
            Arc::new(MockSearcher::returning("tavily", vec![hit("React", "https://react.dev")]));
        let registry = BackendRegistry::new(
            named(CoordinatorScript::default().into_completer("coordinator")),
            vec![NamedCompleter::new("claude", claude_dyn, SECOND)],
            vec![Candidate::primary("tavily", search, SECOND)],
        );
        let orch = TaskOrchestrator::new(Arc::new(registry), memory.clone(), settings());

        let batch = orch
            .collect(TaskRequest::from_task("find the latest React documentation and implement a hook"))
            .await;

        assert_eq!(batch.frames[1].stage, Stage::Search);
        let received = claude.received();
        let system = received[0].last().unwrap();
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains("Search Information:\nSearch summary"));
        assert_eq!(
            memory.context().await.get(SEARCH_SUMMARY_KEY).map(String::as_str),
            Some("Search summary: the docs describe the new API.")
        );
    }

    #[tokio::test]
    async fn test_coordinator_prompt_includes_memory() {
        let memory: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
        memory.append("conv-9", Role::User, "my name is Ada").await;
        let coordinator = Arc::new(CoordinatorScript::simple_question().into_completer("coordinator"));
        let coordinator_dyn: Arc<dyn Completer> = coordinator.clone();
        let registry = BackendRegistry::new(
            NamedCompleter::new("coordinator", coordinator_dyn, SECOND),
            vec![named(MockCompleter::replying("claude", "unused"))],
            Vec::new(),
        );
        let orch = TaskOrchestrator::new(Arc::new(registry), memory, settings());

        orch.collect(TaskRequest::from_task("what is my name").with_conversation_id("conv-9"))
            .await;

        let first_call = &coordinator.received()[0];
        assert!(first_call[0].content.starts_with("Memory Context:\nPrevious Conversation:"));
        assert!(first_call[0].content.contains("user: my name is Ada"));
    }

    #[tokio::test]
    async fn test_artifact_written_from_primary_solution() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out").join("solution.py");
        let mut settings = settings();
        settings.artifact_path = Some(path.clone());

        let registry = BackendRegistry::new(
            named(CoordinatorScript::default().into_completer("coordinator")),
            vec![
                named(MockCompleter::replying("deepseek", "```python\nprint('d')\n```")),
                named(MockCompleter::replying("claude", "```python\nprint('c')\n```")),
            ],
            Vec::new(),
        );
        let orch = TaskOrchestrator::new(Arc::new(registry), Arc::new(InMemoryStore::new()), settings);
        orch.collect(TaskRequest::from_task("write a script")).await;

        assert_eq!(std::fs::read_to_string(path).unwrap(), "print('c')");
    }

    #[tokio::test]
    async fn test_dropping_receiver_abandons_task() {
        let claude = Arc::new(MockCompleter::replying("claude", "code").with_delay(Duration::from_secs(30)));
        let claude_dyn: Arc<dyn Completer> = claude.clone();
        let registry = BackendRegistry::new(
            named(CoordinatorScript::default().into_completer("coordinator")),
            vec![NamedCompleter::new("claude", claude_dyn, Duration::from_secs(60))],
            Vec::new(),
        );
        let orch = TaskOrchestrator::new(Arc::new(registry), Arc::new(InMemoryStore::new()), settings());

        let (tx, mut rx) = mpsc::channel(1);
        let runner = orch.clone();
        let handle = tokio::spawn(async move { runner.execute(TaskRequest::from_task("build it"), tx).await });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.stage, Stage::Analysis);
        drop(rx);

        let record = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("task should stop once the consumer is gone")
            .unwrap();
        assert_eq!(record.state(), TaskState::Classified);
        assert_eq!(record.frames_emitted, 1);
    }

    #[tokio::test]
    async fn test_stream_and_collect_match() {
        let build = || {
            orchestrator(
                CoordinatorScript::default().into_completer("coordinator"),
                vec![
                    MockCompleter::replying("deepseek", "d"),
                    MockCompleter::replying("claude", "c"),
                ],
                Vec::new(),
                Arc::new(InMemoryStore::new()),
            )
        };

        let mut rx = build().stream(TaskRequest::from_task("build"));
        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        let streamed = BatchResponse::from_frames(frames);
        let collected = build().collect(TaskRequest::from_task("build")).await;

        assert_eq!(streamed.content, collected.content);
        assert_eq!(streamed.frames, collected.frames);
    }

    #[tokio::test]
    async fn test_passthrough_direct_model() {
        let orch = orchestrator(
            CoordinatorScript::default().into_completer("coordinator"),
            vec![
                MockCompleter::replying("liquid", "direct answer"),
                MockCompleter::failing("hermes", CapabilityError::Format("no choices".into())),
            ],
            Vec::new(),
            Arc::new(InMemoryStore::new()),
        );
        let messages = [Message::user("hi")];

        let frames = orch.passthrough("liquid", &messages).await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].payload, "direct answer");

        let frames = orch.passthrough("hermes", &messages).await.unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].stage, Stage::Error);

        assert!(orch.passthrough("unknown", &messages).await.is_none());
    }
}
