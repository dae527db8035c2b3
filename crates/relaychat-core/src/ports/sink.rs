//! Client-facing sink port.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::RelayEvent;
use crate::error::TransportError;

/// Destination of the events of one chat turn.
///
/// Each transport frames events for its own protocol; a variant the
/// protocol has no record for is simply not written.
#[async_trait]
pub trait FragmentSink: Send {
    /// Write one event. An error means the client can no longer be reached.
    async fn send(&mut self, event: RelayEvent) -> Result<(), TransportError>;
}

/// Forward events into a channel, for transports that drain on another task.
#[async_trait]
impl FragmentSink for mpsc::Sender<RelayEvent> {
    async fn send(&mut self, event: RelayEvent) -> Result<(), TransportError> {
        mpsc::Sender::send(self, event)
            .await
            .map_err(|_| TransportError::Closed)
    }
}

/// Collects events in memory.
#[async_trait]
impl FragmentSink for Vec<RelayEvent> {
    async fn send(&mut self, event: RelayEvent) -> Result<(), TransportError> {
        self.push(event);
        Ok(())
    }
}
