//! Persistent chat session over WebSocket.
//!
//! `GET /ws` upgrades to a text WebSocket that serves any number of turns,
//! strictly one after another.
//!
//! ## Lifecycle
//!
//! 1. Wait for a client message (plain text or a `{"text", "attachment"}`
//!    record).
//! 2. Run the turn through the relay, writing its frames to the socket.
//!    The inbound side is still read meanwhile: up to
//!    [`MAX_PENDING_MESSAGES`] messages are queued for later turns, past
//!    that the socket is left unread until the turn ends. A close or
//!    receive error cancels the running turn.
//! 3. Back to 1 until the client goes away or the server shuts down. A
//!    turn cut short by shutdown ends with an error frame.
//!
//! Malformed input is answered with an error frame and the session keeps
//! reading.

use std::collections::VecDeque;
use std::fmt::Display;

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use relaychat_core::{
    ChatRequest, ClientPayload, FragmentSink, RelayError, RelayEvent, StreamRelay,
    TransportError, TurnOutcome,
};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::HttpError;
use crate::framing;
use crate::state::AppState;

/// Messages buffered while a turn is running.
pub const MAX_PENDING_MESSAGES: usize = 8;

/// `GET /ws`
pub async fn chat_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<Response, HttpError> {
    if state.shutdown.is_cancelled() {
        return Err(HttpError::ServiceUnavailable(
            "Server is shutting down".to_string(),
        ));
    }

    Ok(ws
        .on_upgrade(move |socket| {
            let (sender, receiver) = socket.split();
            run_session(
                state.relay.clone(),
                sender,
                receiver,
                state.shutdown.clone(),
            )
        })
        .into_response())
}

/// One inbound item, reduced to what the session cares about.
#[derive(Debug)]
enum Inbound {
    Text(String),
    Binary,
    Closed,
}

/// How a running turn came to an end.
#[derive(Debug)]
enum TurnEnd {
    Finished(TurnOutcome),
    ClientClosed,
    Shutdown,
}

/// Frames relay events as WebSocket text messages.
struct WsSink<Tx> {
    sender: Tx,
}

#[async_trait]
impl<Tx> FragmentSink for WsSink<Tx>
where
    Tx: Sink<Message> + Unpin + Send,
    Tx::Error: Display,
{
    async fn send(&mut self, event: RelayEvent) -> Result<(), TransportError> {
        let Some(frame) = framing::ws_frame(&event) else {
            return Ok(());
        };
        self.sender
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}

/// Drive one persistent session until the client leaves or `shutdown` fires.
///
/// Generic over the socket halves so the session can run over any
/// message sink and stream.
pub async fn run_session<Tx, Rx, E>(
    relay: StreamRelay,
    sender: Tx,
    mut receiver: Rx,
    shutdown: CancellationToken,
) where
    Tx: Sink<Message> + Unpin + Send,
    Tx::Error: Display,
    Rx: Stream<Item = Result<Message, E>> + Unpin + Send,
    E: Display,
{
    let session = Uuid::new_v4();
    let mut sink = WsSink { sender };
    let mut pending: VecDeque<Inbound> = VecDeque::new();
    let mut turn = 0u64;

    info!(%session, "WebSocket session opened");

    loop {
        let inbound = match pending.pop_front() {
            Some(inbound) => inbound,
            None => tokio::select! {
                inbound = next_inbound(&mut receiver) => inbound,
                () = shutdown.cancelled() => break,
            },
        };

        let request = match inbound {
            Inbound::Text(text) => match parse_turn(&text) {
                Ok(request) => request,
                Err(e) => {
                    debug!(%session, "Rejected client message: {e}");
                    if sink.send(RelayEvent::error(e.to_string())).await.is_err() {
                        break;
                    }
                    continue;
                }
            },
            Inbound::Binary => {
                let message = "Binary messages are not supported; send text";
                if sink.send(RelayEvent::error(message)).await.is_err() {
                    break;
                }
                continue;
            }
            Inbound::Closed => break,
        };

        turn += 1;
        let span = info_span!("turn", %session, turn);

        // Leaving this block drops `handle`, which releases the admission
        // permit and hands `sink` back.
        let end = {
            let handle = relay.handle(request, &mut sink).instrument(span);
            tokio::pin!(handle);

            loop {
                let has_room = pending.len() < MAX_PENDING_MESSAGES;
                tokio::select! {
                    outcome = &mut handle => break TurnEnd::Finished(outcome),
                    inbound = next_inbound(&mut receiver), if has_room => {
                        match inbound {
                            Inbound::Closed => break TurnEnd::ClientClosed,
                            queued => pending.push_back(queued),
                        }
                    }
                    () = shutdown.cancelled() => break TurnEnd::Shutdown,
                }
            }
        };

        match end {
            TurnEnd::Finished(TurnOutcome::ClientGone) => break,
            TurnEnd::Finished(_) => {}
            TurnEnd::ClientClosed => {
                debug!(%session, turn, "Turn cancelled by client");
                break;
            }
            TurnEnd::Shutdown => {
                debug!(%session, turn, "Turn cancelled by shutdown");
                let message = RelayError::ShuttingDown.user_message();
                let _ = sink.send(RelayEvent::error(message)).await;
                break;
            }
        }
    }

    let _ = sink.sender.close().await;
    info!(%session, turns = turn, "WebSocket session closed");
}

fn parse_turn(text: &str) -> Result<ChatRequest, TransportError> {
    let payload = ClientPayload::parse(text)?;
    if let Some(attachment) = &payload.attachment {
        info!(
            name = %attachment.name,
            mime_type = ?attachment.mime_type,
            size = ?attachment.size,
            "Message carries attachment metadata"
        );
    }
    payload.into_request()
}

async fn next_inbound<Rx, E>(receiver: &mut Rx) -> Inbound
where
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => return Inbound::Text(text.as_str().to_owned()),
            Some(Ok(Message::Binary(_))) => return Inbound::Binary,
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => return Inbound::Closed,
            Some(Err(e)) => {
                warn!("WebSocket receive error: {e}");
                return Inbound::Closed;
            }
        }
    }
}
