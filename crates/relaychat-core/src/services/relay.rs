//! Stream relay: runs one chat turn from request to terminal event.
//!
//! Event order for a turn:
//!
//! 1. `UserEcho` with the user's message
//! 2. `AssistantStart`
//! 3. (admission wait)
//! 4. `Stream` for every upstream fragment, in arrival order
//! 5. `Done`, or a single `Error` on any failure
//!
//! Failures never escape [`StreamRelay::handle`]; they become the terminal
//! event so a persistent connection survives a bad turn.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{ChatRequest, RelayEvent, StreamFragment};
use crate::error::{RelayError, TransportError};
use crate::ports::{FragmentSink, UpstreamPort, spawn_completion};
use crate::services::rate_limiter::RateLimiter;

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// All fragments forwarded and the terminal marker written.
    Completed { fragments: usize },
    /// The turn failed and the client was sent an error event.
    Failed(RelayError),
    /// The client could not be written to.
    ClientGone,
}

enum Failure {
    Client(&'static str, TransportError),
    Relay(&'static str, RelayError),
}

/// Orchestrates chat turns against the shared limiter and upstream.
#[derive(Debug, Clone)]
pub struct StreamRelay {
    limiter: Arc<RateLimiter>,
    upstream: Arc<dyn UpstreamPort>,
    fragment_timeout: Option<Duration>,
}

impl StreamRelay {
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>, upstream: Arc<dyn UpstreamPort>) -> Self {
        Self {
            limiter,
            upstream,
            fragment_timeout: None,
        }
    }

    /// Fail the turn if the upstream goes quiet for longer than `timeout`.
    #[must_use]
    pub const fn with_fragment_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fragment_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run one turn, writing its events to `sink`.
    ///
    /// Cancel a turn by dropping the returned future: the admission permit
    /// and the upstream producer go with it.
    pub async fn handle<S>(&self, request: ChatRequest, sink: &mut S) -> TurnOutcome
    where
        S: FragmentSink + ?Sized,
    {
        let started = Instant::now();

        let echo = RelayEvent::UserEcho {
            content: request.last_user_content().to_string(),
        };
        if let Err(e) = sink.send(echo).await {
            return client_gone("echo", &e);
        }
        if let Err(e) = sink.send(RelayEvent::AssistantStart).await {
            return client_gone("start", &e);
        }

        match self.stream_reply(request, sink).await {
            Ok(fragments) => {
                if let Err(e) = sink.send(RelayEvent::Done).await {
                    return client_gone("done", &e);
                }
                info!(
                    fragments,
                    elapsed_ms = elapsed_ms(started),
                    "Turn completed"
                );
                TurnOutcome::Completed { fragments }
            }
            Err(Failure::Client(stage, e)) => {
                let _ = sink.send(RelayEvent::error(e.to_string())).await;
                client_gone(stage, &e)
            }
            Err(Failure::Relay(stage, err)) => {
                warn!(
                    stage,
                    retryable = err.is_retryable(),
                    elapsed_ms = elapsed_ms(started),
                    "Turn failed: {err}"
                );
                if let Err(e) = sink.send(RelayEvent::error(err.user_message())).await {
                    debug!("Could not deliver error event: {e}");
                }
                TurnOutcome::Failed(err)
            }
        }
    }

    /// Admit, call upstream, forward fragments. The permit is released when
    /// this returns, before the terminal event is written.
    async fn stream_reply<S>(&self, request: ChatRequest, sink: &mut S) -> Result<usize, Failure>
    where
        S: FragmentSink + ?Sized,
    {
        let permit = self
            .limiter
            .admit()
            .await
            .map_err(|e| Failure::Relay("admission", e))?;
        debug!(
            queued_ms = elapsed_ms(permit.admitted_at()),
            messages = request.len(),
            "Admitted upstream call"
        );

        let mut stream = spawn_completion(Arc::clone(&self.upstream), request);
        let mut forwarded = 0usize;

        loop {
            let next = match self.fragment_timeout {
                Some(limit) => tokio::time::timeout(limit, stream.next())
                    .await
                    .map_err(|_| {
                        Failure::Relay(
                            "upstream",
                            RelayError::Timeout {
                                stage: "upstream",
                                detail: format!("no fragment within {}ms", limit.as_millis()),
                            },
                        )
                    })?,
                None => stream.next().await,
            };

            match next {
                Some(StreamFragment::Content(content)) => {
                    sink.send(RelayEvent::Stream { content })
                        .await
                        .map_err(|e| Failure::Client("forward", e))?;
                    forwarded += 1;
                }
                Some(StreamFragment::Done) | None => return Ok(forwarded),
                Some(StreamFragment::Error(e)) => return Err(Failure::Relay("upstream", e.into())),
            }
        }
    }
}

fn client_gone(stage: &'static str, err: &TransportError) -> TurnOutcome {
    debug!(stage, "Client unreachable: {err}");
    TurnOutcome::ClientGone
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
