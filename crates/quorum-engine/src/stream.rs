//! Ordered stream frames and their wire encodings
//!
//! The orchestrator reports each finished stage to a [`StreamEncoder`], which stamps
//! it with the next sequence number. Frames can then be delivered incrementally as
//! server-sent events ([`SseEnvelope`]) or buffered into a [`BatchResponse`]; both
//! carry the same payloads in the same order.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};

use quorum_llm::CompletionResult;

/// Line that closes an SSE response after the terminal frame
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// Stage a frame reports on
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Analysis,
    Search,
    Solution,
    Answer,
    Review,
    Done,
    Error,
}

impl Stage {
    /// `done` and `error` close a frame sequence.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamFrame {
    pub sequence: u64,
    pub stage: Stage,
    pub payload: String,
}

/// Heterogeneous results that are delivered through the same frame protocol.
#[derive(Debug, Clone)]
pub enum ResponseShape {
    /// One completion, as returned by a directly addressed backend
    Completion(CompletionResult),
    /// A list of text parts, joined with a blank line
    Parts(Vec<String>),
}

impl ResponseShape {
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Completion(result) => result.content,
            Self::Parts(parts) => parts.join("\n\n"),
        }
    }
}

/// Assigns contiguous sequence numbers and refuses frames after a terminal one.
#[derive(Debug, Default)]
pub struct StreamEncoder {
    next_sequence: u64,
    closed: bool,
}

impl StreamEncoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a completed stage. Returns `None` once the sequence is closed.
    pub fn encode(&mut self, stage: Stage, payload: impl Into<String>) -> Option<StreamFrame> {
        if self.closed {
            return None;
        }
        let frame = StreamFrame {
            sequence: self.next_sequence,
            stage,
            payload: payload.into(),
        };
        self.next_sequence += 1;
        self.closed = stage.is_terminal();
        Some(frame)
    }

    /// Encode a whole single-shot response: one `answer` frame, then `done`.
    pub fn encode_shape(&mut self, shape: ResponseShape) -> Vec<StreamFrame> {
        [
            self.encode(Stage::Answer, shape.into_text()),
            self.encode(Stage::Done, ""),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    #[must_use]
    pub fn frames_emitted(&self) -> u64 {
        self.next_sequence
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// All frames of one task, buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResponse {
    pub frames: Vec<StreamFrame>,
    /// Payloads concatenated in sequence order
    pub content: String,
}

impl BatchResponse {
    #[must_use]
    pub fn from_frames(mut frames: Vec<StreamFrame>) -> Self {
        frames.sort_by_key(|f| f.sequence);
        let content = frames.iter().map(|f| f.payload.as_str()).collect();
        Self { frames, content }
    }

    #[must_use]
    pub fn errored(&self) -> bool {
        self.frames.last().is_some_and(|f| f.stage == Stage::Error)
    }
}

/// Chat-completion style envelope shared by all frames of one response.
#[derive(Debug, Clone)]
pub struct SseEnvelope {
    id: String,
    model: String,
    created: i64,
}

impl SseEnvelope {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created: Utc::now().timestamp(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// `chat.completion.chunk` object for one frame.
    #[must_use]
    pub fn chunk(&self, frame: &StreamFrame) -> Value {
        let finish_reason = match frame.stage {
            Stage::Done => Value::from("stop"),
            Stage::Error => Value::from("error"),
            _ => Value::Null,
        };
        json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "sequence": frame.sequence,
            "stage": frame.stage,
            "choices": [{
                "index": 0,
                "delta": {"content": frame.payload},
                "finish_reason": finish_reason,
            }],
        })
    }

    /// One frame as an SSE event: `data: <json>\n\n`.
    #[must_use]
    pub fn event(&self, frame: &StreamFrame) -> String {
        format!("data: {}\n\n", self.chunk(frame))
    }

    /// `chat.completion` object carrying the concatenated content.
    #[must_use]
    pub fn completion(&self, batch: &BatchResponse) -> Value {
        let finish_reason = if batch.errored() { "error" } else { "stop" };
        json!({
            "id": self.id,
            "object": "chat.completion",
            "created": self.created,
            "model": self.model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": batch.content},
                "finish_reason": finish_reason,
            }],
        })
    }
}
