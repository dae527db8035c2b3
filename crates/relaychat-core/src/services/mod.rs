//! Services built on the ports: admission control, the relay, health.

pub mod health;
pub mod rate_limiter;
pub mod relay;

pub use health::{HealthSnapshot, HealthStatus};
pub use rate_limiter::{AdmissionPermit, RateLimiter};
pub use relay::{StreamRelay, TurnOutcome};
