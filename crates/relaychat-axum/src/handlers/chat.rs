//! One-shot chat over Server-Sent Events.
//!
//! `POST /chat` with `{"messages": [{"role", "content"}, ...]}`. The
//! response body is the live record stream of a single turn.

use std::convert::Infallible;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;
use relaychat_core::{
    ChatRequest, ChatRequestBody, FRAGMENT_CHANNEL_CAPACITY, FragmentSink, RelayEvent,
    TransportError,
};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::error::HttpError;
use crate::framing;
use crate::state::AppState;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// Writes SSE records into the response body channel.
struct SseSink {
    tx: mpsc::Sender<Bytes>,
}

#[async_trait]
impl FragmentSink for SseSink {
    async fn send(&mut self, event: RelayEvent) -> Result<(), TransportError> {
        let Some(record) = framing::sse_record(&event) else {
            return Ok(());
        };
        self.tx
            .send(Bytes::from(record))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// `POST /chat`
pub async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Response, HttpError> {
    if state.shutdown.is_cancelled() {
        return Err(HttpError::ServiceUnavailable(
            "Server is shutting down".to_string(),
        ));
    }

    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected chat request: {e}");
            let record = framing::sse_error(&e.to_string());
            return Ok(sse_response(StatusCode::BAD_REQUEST, Body::from(record)));
        }
    };

    let (tx, rx) = mpsc::channel::<Bytes>(FRAGMENT_CHANNEL_CAPACITY);
    let relay = state.relay.clone();
    let span = info_span!("turn", session = %Uuid::new_v4(), turn = 1u64);

    tokio::spawn(
        async move {
            let client = tx.clone();
            let mut sink = SseSink { tx };
            tokio::select! {
                outcome = relay.handle(request, &mut sink) => {
                    debug!(?outcome, "One-shot turn finished");
                }
                () = client.closed() => {
                    debug!("Client disconnected, turn cancelled");
                }
            }
        }
        .instrument(span),
    );

    Ok(sse_response(StatusCode::OK, receiver_body(rx)))
}

fn parse_request(body: &[u8]) -> Result<ChatRequest, TransportError> {
    let body: ChatRequestBody = serde_json::from_slice(body)
        .map_err(|e| TransportError::Malformed(format!("Invalid request body: {e}")))?;
    ChatRequest::try_from(body)
}

/// Stream channel items as the response body. Dropping the body closes the
/// channel, which the turn task watches.
fn receiver_body(rx: mpsc::Receiver<Bytes>) -> Body {
    Body::from_stream(stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    }))
}

fn sse_response(status: StatusCode, body: Body) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        body,
    )
        .into_response()
}
