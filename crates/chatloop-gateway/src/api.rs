use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use chatloop_agents::ToolContext;
use chatloop_common::{ChatMessage, Error, Result, ThreadId};
use futures::{Stream, StreamExt, stream};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::state::SharedState;

/// Marker frame that closes every streamed reply.
pub const END_OF_STREAM: &str = "[END]";

/// Buffered text fragments between the turn task and the SSE response.
const DELTA_BUFFER: usize = 64;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

impl ChatRequest {
    /// Blank thread ids are treated as absent.
    fn thread_id(&self) -> Option<ThreadId> {
        self.thread_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(ThreadId::from)
    }
}

fn failure(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": error.into(),
        })),
    )
        .into_response()
}

/// Status for a failed turn. Client mistakes are caught earlier by
/// [`parse_chat_request`], so anything here is on the server side.
fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::ModelUnavailable(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Decode and check a chat body, rendering problems as a 400 failure.
fn parse_chat_request(
    body: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> std::result::Result<ChatRequest, Response> {
    let Json(request) = body.map_err(|e| failure(StatusCode::BAD_REQUEST, e.body_text()))?;
    if request.message.trim().is_empty() {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "message must not be empty",
        ));
    }
    Ok(request)
}

/// Run one turn for `request`.
///
/// With a thread id the whole turn holds that thread's lease: history is read,
/// the turn runs, and the new messages are committed only if it succeeds.
/// Without one the turn starts from an empty log and nothing is stored.
async fn execute_turn(
    state: &SharedState,
    request: ChatRequest,
    delta_tx: Option<mpsc::Sender<String>>,
) -> Result<String> {
    let thread_id = request.thread_id();
    let context = ToolContext {
        thread_id: thread_id.clone(),
    };
    let user_message = ChatMessage::user(request.message);

    let Some(thread_id) = thread_id else {
        let outcome = match delta_tx {
            Some(tx) => {
                state
                    .executor
                    .run_turn_streaming(vec![user_message], &context, tx)
                    .await?
            }
            None => state.executor.run_turn(vec![user_message], &context).await?,
        };
        return Ok(outcome.reply.content);
    };

    let mut lease = state.conversations.checkout(&thread_id).await;
    let mut log = lease.history().to_vec();
    let prior_len = log.len();
    log.push(user_message);

    let outcome = match delta_tx {
        Some(tx) => state.executor.run_turn_streaming(log, &context, tx).await?,
        None => state.executor.run_turn(log, &context).await?,
    };
    let reply = outcome.reply.content.clone();
    lease
        .commit(outcome.into_new_messages(prior_len))
        .map_err(|e| Error::Gateway(format!("failed to store turn: {e}")))?;
    Ok(reply)
}

/// POST /chat: run one turn and return the final answer.
pub async fn chat(
    State(state): State<SharedState>,
    body: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match parse_chat_request(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    info!(thread_id = ?request.thread_id, "chat request");

    match execute_turn(&state, request, None).await {
        Ok(content) => Json(json!({
            "success": true,
            "message": content,
        }))
        .into_response(),
        Err(e) => {
            warn!("chat turn failed: {}", e);
            failure(error_status(&e), e.to_string())
        }
    }
}

/// Frame one text fragment. SSE cannot carry carriage returns.
fn token_event(fragment: String) -> Event {
    if fragment.contains('\r') {
        Event::default().data(fragment.replace('\r', ""))
    } else {
        Event::default().data(fragment)
    }
}

fn closing_events(result: Option<Result<String>>) -> Vec<Event> {
    let mut events = Vec::with_capacity(2);
    match result {
        Some(Ok(_)) => {}
        Some(Err(e)) => {
            warn!("streamed turn failed: {}", e);
            events.push(
                Event::default()
                    .event("error")
                    .data(e.to_string().replace('\r', "")),
            );
        }
        None => {
            events.push(Event::default().event("error").data("turn aborted"));
        }
    }
    events.push(Event::default().data(END_OF_STREAM));
    events
}

/// POST /chat/stream: same turn, with model text streamed as SSE frames and
/// a final `data: [END]` frame.
pub async fn chat_stream(
    State(state): State<SharedState>,
    body: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match parse_chat_request(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    info!(thread_id = ?request.thread_id, "streaming chat request");

    let (delta_tx, delta_rx) = mpsc::channel::<String>(DELTA_BUFFER);
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let result = execute_turn(&state, request, Some(delta_tx)).await;
        if let Err(Error::Cancelled(_)) = &result {
            info!("client went away, streamed turn dropped");
        }
        let _ = done_tx.send(result);
    });

    Sse::new(sse_events(delta_rx, done_rx))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

fn sse_events(
    delta_rx: mpsc::Receiver<String>,
    done_rx: oneshot::Receiver<Result<String>>,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    let tokens = ReceiverStream::new(delta_rx).map(token_event);
    let tail = stream::once(async move { stream::iter(closing_events(done_rx.await.ok())) })
        .flatten();
    tokens.chain(tail).map(Ok)
}

/// GET /chat/{thread_id}/history: stored log of one thread.
pub async fn history(
    State(state): State<SharedState>,
    Path(thread_id): Path<String>,
) -> Response {
    let thread_id = ThreadId::from(thread_id);
    match state.conversations.snapshot(&thread_id).await {
        Some(snapshot) => Json(json!({
            "success": true,
            "thread_id": snapshot.thread_id,
            "messages": snapshot.messages,
            "created_at": snapshot.created_at,
            "updated_at": snapshot.updated_at,
        }))
        .into_response(),
        None => failure(
            StatusCode::NOT_FOUND,
            format!("unknown thread '{thread_id}'"),
        ),
    }
}

/// GET /api/tools: registered tools in registration order.
pub async fn list_tools(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(json!({
        "tools": state.executor.tools().describe_all(),
    }))
}
