//! The streaming surface endpoints.
//!
//! - `POST /api/chat`: general chat
//! - `POST /api/dev`: single-file website generation
//! - `POST /api/research`: concept-tree research
//!
//! Each takes `{ "messages": Turn[] }` and answers with an SSE stream of
//! `AgentStreamEvent`s, named by event type.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracefold_agent::Surface;
use tracefold_core::{AgentStreamEvent, Turn};
use tracefold_config::SurfaceConfig;
use tracefold_lifecycle::{LifecyclePolicy, RequestController, RequestState, TimeoutGuard};
use tracing::{info, warn};

use crate::SharedState;

/// A request body that could not be turned into turns.
#[derive(Debug)]
pub enum BodyError {
    /// `messages` is missing or not an array.
    InvalidMessages,
    /// Anything else; the message becomes the response body.
    Malformed(String),
}

impl IntoResponse for BodyError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidMessages => {
                (StatusCode::BAD_REQUEST, "Invalid messages format").into_response()
            }
            Self::Malformed(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
        }
    }
}

/// Parse the JSON body and its `messages` array.
pub fn parse_body(body: &[u8]) -> Result<(Value, Vec<Turn>), BodyError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| BodyError::Malformed(e.to_string()))?;
    let messages = value
        .get("messages")
        .filter(|m| m.is_array())
        .cloned()
        .ok_or(BodyError::InvalidMessages)?;
    let turns = serde_json::from_value(messages).map_err(|e| BodyError::Malformed(e.to_string()))?;
    Ok((value, turns))
}

pub(crate) async fn chat_handler(State(state): State<SharedState>, body: Bytes) -> Response {
    surface_handler(state, Surface::Chat, body)
}

pub(crate) async fn dev_handler(State(state): State<SharedState>, body: Bytes) -> Response {
    surface_handler(state, Surface::Dev, body)
}

pub(crate) async fn research_handler(State(state): State<SharedState>, body: Bytes) -> Response {
    surface_handler(state, Surface::Research, body)
}

fn surface_handler(state: SharedState, surface: Surface, body: Bytes) -> Response {
    let turns = match parse_body(&body) {
        Ok((_, turns)) => turns,
        Err(e) => {
            warn!(%surface, error = ?e, "Rejected request body");
            return e.into_response();
        }
    };
    info!(%surface, turns = turns.len(), "Surface request");

    let budget = surface.config(&state.config.surfaces);
    let controller = RequestController::new(request_policy(budget));
    controller.arm();
    let guard = controller.start_timeout(|| {});

    let events = state.runner(surface).run_stream(turns, controller.clone());
    let events = forward(
        events,
        controller,
        guard,
        Duration::from_secs(budget.max_duration_secs),
    );

    let stream = ReceiverStream::new(events).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok::<_, Infallible>(SseEvent::default().event(event.event_type()).data(data))
    });

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Lifecycle policy of one HTTP request: the controller deadline never
/// outlives the wall-clock budget.
pub fn request_policy(budget: &SurfaceConfig) -> LifecyclePolicy {
    LifecyclePolicy::from(budget).capped(Duration::from_secs(budget.max_duration_secs))
}

fn timed_out(after: Duration) -> AgentStreamEvent {
    AgentStreamEvent::Error {
        message: format!("request timed out after {}s", after.as_secs()),
    }
}

/// Relay runner events to the client under the wall-clock budget.
///
/// The request is aborted when the client goes away. When the budget runs
/// out it is timed out instead, and the stream ends with an `error` event
/// naming the budget, whichever deadline noticed first.
fn forward(
    mut events: mpsc::Receiver<AgentStreamEvent>,
    controller: RequestController,
    guard: TimeoutGuard,
    max_duration: Duration,
) -> mpsc::Receiver<AgentStreamEvent> {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let _guard = guard;
        let deadline = tokio::time::sleep(max_duration);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = tx.closed() => {
                    info!("Client disconnected, aborting request");
                    controller.abort();
                    break;
                }
                _ = &mut deadline => {
                    warn!(max_duration_secs = max_duration.as_secs(), "Request exceeded its time budget");
                    controller.expire();
                    let _ = tx.send(timed_out(max_duration)).await;
                    break;
                }
                event = events.recv() => {
                    let Some(mut event) = event else { break };
                    if matches!(event, AgentStreamEvent::Error { .. })
                        && controller.state() == RequestState::TimedOut
                    {
                        event = timed_out(controller.policy().timeout);
                    }
                    let terminal = event.is_terminal();
                    if tx.send(event).await.is_err() {
                        controller.abort();
                        break;
                    }
                    if terminal {
                        break;
                    }
                }
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_array_messages_are_invalid() {
        for body in [r#"{"messages": "hi"}"#, r#"{"messages": null}"#, r#"{}"#] {
            assert!(matches!(
                parse_body(body.as_bytes()),
                Err(BodyError::InvalidMessages)
            ));
        }
    }

    #[test]
    fn malformed_json_is_a_server_error() {
        let err = parse_body(b"{not json").unwrap_err();
        assert!(matches!(err, BodyError::Malformed(_)));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn turns_accept_parts_and_content_shapes() {
        let body = br#"{"messages": [
            {"role": "user", "content": "hello"},
            {"role": "assistant", "parts": [{"type": "text", "text": "hi"}]}
        ]}"#;
        let (_, turns) = parse_body(body).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text(), "hello");
        assert!(turns[1].is_agent());
    }

    #[tokio::test(start_paused = true)]
    async fn forward_stops_at_the_budget() {
        let (_runner_tx, runner_rx) = mpsc::channel(1);
        let controller = RequestController::default();
        controller.arm();
        let guard = controller.start_timeout(|| {});

        let mut rx = forward(runner_rx, controller.clone(), guard, Duration::from_secs(30));
        let event = rx.recv().await.unwrap();

        assert_eq!(
            event,
            AgentStreamEvent::Error {
                message: "request timed out after 30s".into()
            }
        );
        assert!(rx.recv().await.is_none());
        assert!(controller.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn budget_expiry_times_the_request_out() {
        let (_runner_tx, runner_rx) = mpsc::channel(1);
        let controller = RequestController::new(LifecyclePolicy {
            timeout: Duration::from_secs(60),
            max_retries: 0,
            retry_delay: Duration::from_secs(1),
        });
        controller.arm();
        let guard = controller.start_timeout(|| {});

        let mut rx = forward(runner_rx, controller.clone(), guard, Duration::from_secs(30));
        assert_eq!(rx.recv().await.unwrap(), timed_out(Duration::from_secs(30)));
        assert_eq!(controller.state(), RequestState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn controller_deadline_reports_the_budget() {
        let budget = SurfaceConfig::chat();
        let controller = RequestController::new(request_policy(&budget));
        assert_eq!(controller.policy().timeout, Duration::from_secs(30));
        controller.arm();
        let guard = controller.start_timeout(|| {});

        // Stands in for a runner that reports its own cancellation.
        let (runner_tx, runner_rx) = mpsc::channel(1);
        let token = controller.token();
        let cancelled = controller.clone();
        tokio::spawn(async move {
            token.cancelled().await;
            let message = cancelled.cancellation_error().to_string();
            let _ = runner_tx.send(AgentStreamEvent::Error { message }).await;
        });

        // The budget here is longer, so only the controller deadline fires.
        let mut rx = forward(runner_rx, controller.clone(), guard, Duration::from_secs(45));
        assert_eq!(rx.recv().await.unwrap(), timed_out(Duration::from_secs(30)));
        assert!(rx.recv().await.is_none());
        assert_eq!(controller.state(), RequestState::TimedOut);
    }

    #[tokio::test]
    async fn dropping_the_client_aborts() {
        let (_runner_tx, runner_rx) = mpsc::channel(1);
        let controller = RequestController::default();
        controller.arm();
        let guard = controller.start_timeout(|| {});

        let rx = forward(runner_rx, controller.clone(), guard, Duration::from_secs(30));
        drop(rx);

        let token = controller.token();
        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .unwrap();
    }
}
