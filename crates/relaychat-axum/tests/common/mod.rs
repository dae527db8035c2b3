//! Stub upstreams shared by the router and session tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use relaychat_axum::AxumContext;
use relaychat_core::{
    ChatRequest, RateLimitSettings, RateLimiter, StreamFragment, StreamRelay, UpstreamError,
    UpstreamPort,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Plays back a fixed script on every call.
#[derive(Debug)]
pub struct Scripted(pub Vec<StreamFragment>);

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

/// Fails mid-stream on the first call, succeeds afterwards.
#[derive(Debug, Default)]
pub struct FailsOnce {
    calls: AtomicUsize,
}

#[async_trait]
impl UpstreamPort for FailsOnce {
    async fn stream_into(&self, _request: ChatRequest, tx: mpsc::Sender<StreamFragment>) {
        let script = if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            vec![
                StreamFragment::Content("he".into()),
                StreamFragment::Error(UpstreamError::Stream("connection reset".into())),
            ]
        } else {
            vec![StreamFragment::Content("ok".into()), StreamFragment::Done]
        };
        for fragment in script {
            let _ = tx.send(fragment).await;
        }
    }
}

/// Emits one fragment, then never finishes.
#[derive(Debug)]
pub struct Hangs;

#[async_trait]
impl UpstreamPort for Hangs {
    async fn stream_into(&self, _request: ChatRequest, tx: mpsc::Sender<StreamFragment>) {
        let _ = tx.send(StreamFragment::Content("thinking".into())).await;
        std::future::pending::<()>().await;
    }
}

pub fn hello() -> Arc<Scripted> {
    Arc::new(Scripted(vec![
        StreamFragment::Content("he".into()),
        StreamFragment::Content("llo".into()),
        StreamFragment::Done,
    ]))
}

pub fn relay(upstream: Arc<dyn UpstreamPort>, limit: usize) -> StreamRelay {
    let limiter = RateLimiter::new(RateLimitSettings::new(limit, Duration::from_secs(60))).unwrap();
    StreamRelay::new(Arc::new(limiter), upstream)
}

pub fn context(upstream: Arc<dyn UpstreamPort>) -> AxumContext {
    AxumContext::new(relay(upstream, 6), CancellationToken::new())
}
