//! Upstream completion port.
//!
//! The provider is modelled as a producer task writing [`StreamFragment`]s
//! into a bounded channel. The relay consumes the other end through a
//! [`FragmentStream`], which owns the producer and aborts it when dropped.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::domain::{ChatRequest, StreamFragment};
use crate::error::UpstreamError;

/// Buffered fragments between the producer and the relay.
pub const FRAGMENT_CHANNEL_CAPACITY: usize = 64;

/// Port for a streaming text-generation provider.
#[async_trait]
pub trait UpstreamPort: Send + Sync + fmt::Debug {
    /// Issue one streaming completion call and push its fragments into `tx`.
    ///
    /// Implementations must:
    /// - send fragments in arrival order and skip empty content
    /// - end with `Done` or a single `Error` (returning early is read as `Done`)
    /// - stop as soon as `tx.send` fails, since the receiver is gone
    async fn stream_into(&self, request: ChatRequest, tx: mpsc::Sender<StreamFragment>);
}

/// Consumer half of one upstream call. Not restartable.
#[derive(Debug)]
pub struct FragmentStream {
    rx: mpsc::Receiver<StreamFragment>,
    producer: JoinHandle<()>,
    finished: bool,
}

impl FragmentStream {
    /// Next fragment, or `None` after the terminal one has been returned.
    pub async fn next(&mut self) -> Option<StreamFragment> {
        if self.finished {
            return None;
        }

        loop {
            match self.rx.recv().await {
                Some(StreamFragment::Content(text)) if text.is_empty() => {}
                Some(fragment) => {
                    self.finished = fragment.is_terminal();
                    return Some(fragment);
                }
                None => {
                    self.finished = true;
                    // Channel closed without a terminal fragment: either the
                    // producer returned early or it panicked.
                    return match (&mut self.producer).await {
                        Err(e) if e.is_panic() => {
                            warn!("Upstream producer panicked");
                            Some(StreamFragment::Error(UpstreamError::Stream(
                                "upstream task failed".to_string(),
                            )))
                        }
                        _ => Some(StreamFragment::Done),
                    };
                }
            }
        }
    }
}

impl Drop for FragmentStream {
    fn drop(&mut self) {
        self.producer.abort();
    }
}

/// Start a completion call on its own task.
#[must_use]
pub fn spawn_completion(upstream: Arc<dyn UpstreamPort>, request: ChatRequest) -> FragmentStream {
    let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);
    let producer = tokio::spawn(async move {
        upstream.stream_into(request, tx).await;
    });

    FragmentStream {
        rx,
        producer,
        finished: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

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

    #[derive(Debug, Default)]
    struct Endless {
        started: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl UpstreamPort for Endless {
        async fn stream_into(&self, _request: ChatRequest, _tx: mpsc::Sender<StreamFragment>) {
            let _guard = SetOnDrop(Arc::clone(&self.dropped));
            self.started.store(true, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::from_user_text("hi").unwrap()
    }

    #[tokio::test]
    async fn test_empty_content_skipped_and_order_kept() {
        let upstream = Arc::new(Scripted(vec![
            StreamFragment::Content("a".into()),
            StreamFragment::Content(String::new()),
            StreamFragment::Content("b".into()),
            StreamFragment::Done,
        ]));
        let mut stream = spawn_completion(upstream, request());

        assert_eq!(stream.next().await, Some(StreamFragment::Content("a".into())));
        assert_eq!(stream.next().await, Some(StreamFragment::Content("b".into())));
        assert_eq!(stream.next().await, Some(StreamFragment::Done));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_exhaustion_without_done_reports_done() {
        let upstream = Arc::new(Scripted(vec![StreamFragment::Content("x".into())]));
        let mut stream = spawn_completion(upstream, request());

        assert_eq!(stream.next().await, Some(StreamFragment::Content("x".into())));
        assert_eq!(stream.next().await, Some(StreamFragment::Done));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_nothing_after_error() {
        let upstream = Arc::new(Scripted(vec![
            StreamFragment::Error(UpstreamError::Provider("boom".into())),
            StreamFragment::Content("late".into()),
        ]));
        let mut stream = spawn_completion(upstream, request());

        assert!(matches!(stream.next().await, Some(StreamFragment::Error(_))));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_drop_aborts_producer() {
        let upstream = Arc::new(Endless::default());
        let started = Arc::clone(&upstream.started);
        let dropped = Arc::clone(&upstream.dropped);

        let stream = spawn_completion(upstream, request());
        while !started.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        drop(stream);

        tokio::time::timeout(Duration::from_secs(1), async {
            while !dropped.load(Ordering::SeqCst) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("producer should be aborted");
    }
}
