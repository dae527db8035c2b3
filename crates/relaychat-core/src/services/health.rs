//! Load/capacity snapshot served by the health endpoints.

use serde::Serialize;

/// Point-in-time view of the rate limiter.
///
/// Best-effort: concurrent admissions may already have moved on by the time
/// the snapshot is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    pub active_requests: usize,
    pub rate_limit: usize,
    pub window_seconds: u64,
    pub available_capacity: usize,
}

/// Coarse service state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// At least one concurrency slot is free.
    Ok,
    /// Every slot is taken; new turns will queue.
    Saturated,
}

impl HealthSnapshot {
    #[must_use]
    pub const fn new(active_requests: usize, rate_limit: usize, window_seconds: u64) -> Self {
        let available_capacity = rate_limit.saturating_sub(active_requests);
        let status = if available_capacity == 0 {
            HealthStatus::Saturated
        } else {
            HealthStatus::Ok
        };

        Self {
            status,
            active_requests,
            rate_limit,
            window_seconds,
            available_capacity,
        }
    }
}
