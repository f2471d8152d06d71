//! Server-Sent Events stream of saved problems.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Serialize;
use solver::core::types::FinalStatus;
use tokio::sync::broadcast;
use tracing::warn;

use crate::state::{AppState, ChangeEvent};

#[derive(Debug, Serialize)]
struct SsePayload {
    #[serde(rename = "type")]
    event_type: &'static str,
    problem_id: String,
    status: FinalStatus,
}

impl From<&ChangeEvent> for SsePayload {
    fn from(event: &ChangeEvent) -> Self {
        match event {
            ChangeEvent::ProblemSaved { problem_id, status } => SsePayload {
                event_type: "problem_saved",
                problem_id: problem_id.clone(),
                status: *status,
            },
        }
    }
}

/// SSE endpoint handler.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));

        loop {
            match rx.recv().await {
                Ok(change_event) => {
                    let payload = SsePayload::from(&change_event);
                    if let Ok(json) = serde_json::to_string(&payload) {
                        yield Ok(Event::default().event("change").data(json));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn problem_saved_payload() {
        let event = ChangeEvent::ProblemSaved {
            problem_id: "p-20260101T000000Z-abcd1234".to_string(),
            status: FinalStatus::SemanticOnlyPass,
        };
        let json = serde_json::to_value(SsePayload::from(&event)).expect("serialize");
        assert_eq!(json["type"], "problem_saved");
        assert_eq!(json["problem_id"], "p-20260101T000000Z-abcd1234");
        assert_eq!(json["status"], "SEMANTIC_ONLY_PASS");
    }
}
