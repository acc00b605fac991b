use std::convert::Infallible;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use quorum_engine::{BatchResponse, SSE_DONE, SseEnvelope, StreamFrame, TaskRequest};

use super::AppState;
use super::wire::{ApiError, ChatCompletionRequest};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn list_models(State(state): State<AppState>) -> Json<Value> {
    let mut data = vec![json!({
        "id": state.server.agent_model,
        "object": "model",
        "owned_by": "quorum",
    })];
    data.extend(state.server.direct_models.iter().map(|(model, backend)| {
        json!({
            "id": model,
            "object": "model",
            "owned_by": backend,
        })
    }));
    Json(json!({"object": "list", "data": data}))
}

pub async fn chat_completions(
    State(state): State<AppState>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload
        .map_err(|rejection| ApiError::invalid_request(rejection.status(), rejection.body_text()))?;
    if request.messages.is_empty() {
        return Err(ApiError::invalid_request(
            StatusCode::UNPROCESSABLE_ENTITY,
            "messages must not be empty",
        ));
    }

    let model = request
        .model
        .clone()
        .unwrap_or_else(|| state.server.agent_model.clone());
    let streaming = request.stream;
    let conversation_id = request.conversation_id.clone();
    let messages = request.into_messages();
    info!(%model, streaming, messages = messages.len(), "Chat completion request");

    if model == state.server.agent_model {
        let envelope = SseEnvelope::new(format!("agent-{}", Uuid::new_v4().simple()), &model);
        let mut task = TaskRequest::new(messages);
        task.conversation_id = conversation_id;

        return Ok(if streaming {
            sse_response(envelope, receiver_stream(state.orchestrator.stream(task)))
        } else {
            let batch = state.orchestrator.collect(task).await;
            Json(envelope.completion(&batch)).into_response()
        });
    }

    let backend = state
        .server
        .direct_models
        .get(&model)
        .ok_or_else(|| ApiError::model_not_found(&model))?;
    let frames = state
        .orchestrator
        .passthrough(backend, &messages)
        .await
        .ok_or_else(|| ApiError::model_not_found(&model))?;

    let envelope = SseEnvelope::new(format!("chatcmpl-{}", Uuid::new_v4().simple()), &model);
    Ok(if streaming {
        sse_response(envelope, stream::iter(frames))
    } else {
        Json(envelope.completion(&BatchResponse::from_frames(frames))).into_response()
    })
}

fn receiver_stream(rx: mpsc::Receiver<StreamFrame>) -> impl Stream<Item = StreamFrame> + Send {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|frame| (frame, rx)) })
}

/// Frames as server-sent events, closed by the `[DONE]` line.
fn sse_response<S>(envelope: SseEnvelope, frames: S) -> Response
where
    S: Stream<Item = StreamFrame> + Send + 'static,
{
    let events = frames
        .map(move |frame| Ok::<_, Infallible>(envelope.event(&frame)))
        .chain(stream::once(async { Ok(SSE_DONE.to_string()) }));

    (
        [(CONTENT_TYPE, "text/event-stream"), (CACHE_CONTROL, "no-cache")],
        Body::from_stream(events),
    )
        .into_response()
}
