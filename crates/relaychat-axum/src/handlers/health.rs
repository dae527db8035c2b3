//! Load snapshot endpoints.

use axum::Json;
use axum::extract::State;
use relaychat_core::HealthSnapshot;

use crate::state::AppState;

/// `GET /health` and `GET /metrics`.
///
/// Reads the limiter without waiting on the admission path.
pub async fn snapshot(State(state): State<AppState>) -> Json<HealthSnapshot> {
    Json(state.relay.limiter().snapshot())
}
