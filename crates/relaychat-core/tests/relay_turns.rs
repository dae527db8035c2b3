//! End-to-end turn tests for the relay against scripted upstreams.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use relaychat_core::{
    ChatRequest, FragmentSink, RateLimitSettings, RateLimiter, RelayError, RelayEvent,
    StreamFragment, StreamRelay, TransportError, TurnOutcome, UpstreamError, UpstreamPort,
};

/// Plays back a fixed list of fragments.
#[derive(Debug)]
struct Scripted(Vec<StreamFragment>);

#[async_trait]
impl UpstreamPort for Scripted {
    async fn stream_into(&self, _request: ChatRequest, tx: mpsc::Sender<StreamFragment>) {
        for fragment in self.0.clone() {
            if tx.send(fragment).await.is_err() {
                return;
            }
        }
    }
}

/// Finishes after a short delay while tracking how many calls overlap.
#[derive(Debug, Default)]
struct Counting {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl UpstreamPort for Counting {
    async fn stream_into(&self, _request: ChatRequest, tx: mpsc::Sender<StreamFragment>) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = tx.send(StreamFragment::Content("ok".into())).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let _ = tx.send(StreamFragment::Done).await;
    }
}

/// Never produces anything.
#[derive(Debug)]
struct Stalled;

#[async_trait]
impl UpstreamPort for Stalled {
    async fn stream_into(&self, _request: ChatRequest, _tx: mpsc::Sender<StreamFragment>) {
        std::future::pending::<()>().await;
    }
}

/// Accepts `budget` events, then reports the client as gone.
struct FlakySink {
    budget: usize,
    events: Vec<RelayEvent>,
}

#[async_trait]
impl FragmentSink for FlakySink {
    async fn send(&mut self, event: RelayEvent) -> Result<(), TransportError> {
        if self.budget == 0 {
            return Err(TransportError::Closed);
        }
        self.budget -= 1;
        self.events.push(event);
        Ok(())
    }
}

fn limiter(limit: usize, window: Duration) -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(RateLimitSettings::new(limit, window)).unwrap())
}

fn hi() -> ChatRequest {
    ChatRequest::from_user_text("hi").unwrap()
}

#[tokio::test]
async fn forwards_fragments_in_order_then_done() {
    let upstream = Arc::new(Scripted(vec![
        StreamFragment::Content("he".into()),
        StreamFragment::Content("llo".into()),
        StreamFragment::Done,
    ]));
    let relay = StreamRelay::new(limiter(6, Duration::from_secs(60)), upstream);

    let mut events = Vec::new();
    let outcome = relay.handle(hi(), &mut events).await;

    assert_eq!(outcome, TurnOutcome::Completed { fragments: 2 });
    assert_eq!(
        events,
        vec![
            RelayEvent::UserEcho {
                content: "hi".into()
            },
            RelayEvent::AssistantStart,
            RelayEvent::stream("he"),
            RelayEvent::stream("llo"),
            RelayEvent::Done,
        ]
    );
}

#[tokio::test]
async fn mid_stream_failure_yields_one_error_and_relay_stays_usable() {
    let failing = Arc::new(Scripted(vec![
        StreamFragment::Content("he".into()),
        StreamFragment::Error(UpstreamError::Stream("connection reset".into())),
    ]));
    let limiter = limiter(2, Duration::from_secs(60));
    let relay = StreamRelay::new(Arc::clone(&limiter), failing);

    let mut events = Vec::new();
    let outcome = relay.handle(hi(), &mut events).await;

    assert!(matches!(outcome, TurnOutcome::Failed(RelayError::Upstream(_))));
    assert_eq!(events[2], RelayEvent::stream("he"));
    let errors = events
        .iter()
        .filter(|e| matches!(e, RelayEvent::Error { .. }))
        .count();
    assert_eq!(errors, 1);
    assert!(matches!(events.last(), Some(RelayEvent::Error { .. })));
    assert!(!events.contains(&RelayEvent::Done));
    assert_eq!(limiter.snapshot().active_requests, 0);

    // The same session carries on with the next turn.
    let healthy = StreamRelay::new(
        limiter,
        Arc::new(Scripted(vec![StreamFragment::Content("again".into())])),
    );
    let mut next = Vec::new();
    assert_eq!(
        healthy.handle(hi(), &mut next).await,
        TurnOutcome::Completed { fragments: 1 }
    );
}

#[tokio::test(start_paused = true)]
async fn twenty_turns_never_exceed_six_in_flight() {
    let upstream = Arc::new(Counting::default());
    let relay = Arc::new(StreamRelay::new(
        limiter(6, Duration::from_secs(1)),
        Arc::clone(&upstream) as Arc<dyn UpstreamPort>,
    ));

    let mut turns = Vec::new();
    for _ in 0..20 {
        let relay = Arc::clone(&relay);
        turns.push(tokio::spawn(async move {
            let mut events = Vec::new();
            relay.handle(hi(), &mut events).await
        }));
    }

    for turn in turns {
        assert_eq!(
            turn.await.unwrap(),
            TurnOutcome::Completed { fragments: 1 }
        );
    }

    assert_eq!(upstream.calls.load(Ordering::SeqCst), 20);
    assert!(upstream.peak.load(Ordering::SeqCst) <= 6);
    assert_eq!(relay.limiter().snapshot().active_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_turn_releases_its_permit() {
    let limit = 2;
    let limiter = limiter(limit, Duration::from_millis(100));
    let stalled = StreamRelay::new(Arc::clone(&limiter), Arc::new(Stalled));

    let (tx, mut rx) = mpsc::channel(16);
    let turn = tokio::spawn(async move {
        let mut sink = tx;
        stalled.handle(hi(), &mut sink).await
    });

    // Wait for the start marker, then give the turn time to be admitted.
    assert!(matches!(rx.recv().await, Some(RelayEvent::UserEcho { .. })));
    assert_eq!(rx.recv().await, Some(RelayEvent::AssistantStart));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(limiter.snapshot().active_requests, 1);

    // The transport drops the turn when the client disconnects.
    turn.abort();
    let _ = turn.await;
    assert_eq!(limiter.snapshot().active_requests, 0);

    let relay = StreamRelay::new(
        Arc::clone(&limiter),
        Arc::new(Scripted(vec![StreamFragment::Done])),
    );
    for _ in 0..=limit {
        let mut events = Vec::new();
        let outcome = tokio::time::timeout(Duration::from_secs(5), relay.handle(hi(), &mut events))
            .await
            .expect("turn after a disconnect must not starve");
        assert_eq!(outcome, TurnOutcome::Completed { fragments: 0 });
    }
}

#[tokio::test(start_paused = true)]
async fn quiet_upstream_times_out_with_retry_hint() {
    let limiter = limiter(1, Duration::from_secs(60));
    let relay = StreamRelay::new(Arc::clone(&limiter), Arc::new(Stalled))
        .with_fragment_timeout(Some(Duration::from_secs(30)));

    let mut events = Vec::new();
    let outcome = relay.handle(hi(), &mut events).await;

    assert!(matches!(
        outcome,
        TurnOutcome::Failed(RelayError::Timeout { stage: "upstream", .. })
    ));
    match events.last() {
        Some(RelayEvent::Error { message }) => assert!(message.contains("try again")),
        other => panic!("expected error event, got {other:?}"),
    }
    assert_eq!(limiter.snapshot().active_requests, 0);
}

#[tokio::test]
async fn write_failure_mid_stream_stops_the_turn() {
    let limiter = limiter(1, Duration::from_secs(60));
    let relay = StreamRelay::new(
        Arc::clone(&limiter),
        Arc::new(Scripted(vec![
            StreamFragment::Content("a".into()),
            StreamFragment::Content("b".into()),
            StreamFragment::Done,
        ])),
    );

    // echo + start + first fragment, then the client is gone
    let mut sink = FlakySink {
        budget: 3,
        events: Vec::new(),
    };
    let outcome = relay.handle(hi(), &mut sink).await;

    assert_eq!(outcome, TurnOutcome::ClientGone);
    assert_eq!(sink.events.len(), 3);
    assert_eq!(limiter.snapshot().active_requests, 0);
}

#[tokio::test]
async fn closed_limiter_reports_error_event() {
    let limiter = limiter(1, Duration::from_secs(60));
    limiter.close();
    let relay = StreamRelay::new(limiter, Arc::new(Scripted(vec![])));

    let mut events = Vec::new();
    let outcome = relay.handle(hi(), &mut events).await;

    assert_eq!(outcome, TurnOutcome::Failed(RelayError::ShuttingDown));
    assert_eq!(events.len(), 3);
    assert!(matches!(events[2], RelayEvent::Error { .. }));
}
