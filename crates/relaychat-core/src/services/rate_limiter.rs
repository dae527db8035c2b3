//! Admission control for upstream calls.
//!
//! Two mechanisms bound the load placed on the provider:
//!
//! 1. A concurrency gate: at most `limit` admitted calls are in flight.
//! 2. A sliding window: at most `limit` admissions start within any
//!    `window`-long interval.
//!
//! A caller first takes a concurrency permit, then enters the window's
//! critical section. The window mutex is held across any wait, so the
//! evict/check/append sequence runs for one caller at a time.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ConfigError, RelayError};
use crate::services::health::HealthSnapshot;
use crate::settings::RateLimitSettings;

/// Held for the whole upstream call. Dropping it frees the concurrency slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
    admitted_at: Instant,
}

impl AdmissionPermit {
    #[must_use]
    pub const fn admitted_at(&self) -> Instant {
        self.admitted_at
    }
}

/// Process-wide rate limiter. Construct once and share through an `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    admission_timeout: Option<Duration>,
    permits: Arc<Semaphore>,
    recent: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Result<Self, ConfigError> {
        settings.validate()?;

        Ok(Self {
            limit: settings.limit,
            window: settings.window,
            admission_timeout: settings.admission_timeout,
            permits: Arc::new(Semaphore::new(settings.limit)),
            recent: Mutex::new(VecDeque::with_capacity(settings.limit)),
        })
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a new upstream call may start, then reserve it.
    ///
    /// # Errors
    ///
    /// `RelayError::Timeout` when an admission timeout is configured and
    /// exceeded, `RelayError::ShuttingDown` after [`close`](Self::close).
    pub async fn admit(&self) -> Result<AdmissionPermit, RelayError> {
        match self.admission_timeout {
            Some(limit) => tokio::time::timeout(limit, self.admit_unbounded())
                .await
                .map_err(|_| RelayError::Timeout {
                    stage: "admission",
                    detail: format!("no capacity within {}ms", limit.as_millis()),
                })?,
            None => self.admit_unbounded().await,
        }
    }

    async fn admit_unbounded(&self) -> Result<AdmissionPermit, RelayError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| RelayError::ShuttingDown)?;

        let mut recent = self.recent.lock().await;
        self.evict(&mut recent, Instant::now());

        if recent.len() >= self.limit
            && let Some(&oldest) = recent.front()
        {
            let wait = (oldest + self.window).saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                debug!(
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    "Rate window full, delaying admission"
                );
                tokio::time::sleep(wait).await;
            }
            self.evict(&mut recent, Instant::now());
        }

        let admitted_at = Instant::now();
        recent.push_back(admitted_at);

        Ok(AdmissionPermit {
            _permit: permit,
            admitted_at,
        })
    }

    /// Drop timestamps that have left the window.
    fn evict(&self, recent: &mut VecDeque<Instant>, now: Instant) {
        while recent
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) >= self.window)
        {
            recent.pop_front();
        }
    }

    /// Current load. Never waits and never changes limiter state.
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        let available = self.permits.available_permits().min(self.limit);
        HealthSnapshot::new(self.limit - available, self.limit, self.window.as_secs())
    }

    /// Refuse all pending and future admissions. Permits already handed out
    /// stay valid until dropped.
    pub fn close(&self) {
        self.permits.close();
    }
}
