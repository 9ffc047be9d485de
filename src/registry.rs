//! Connected-viewer registry
//!
//! Counts viewers attached to the serve endpoint. The registry itself is a
//! plain struct: it lives inside the controller state so connect events and
//! state transitions share one mutual-exclusion domain (a `stop_streaming`
//! racing a connect must never leave the count inconsistent).

use crate::pipeline::ClientId;

/// Viewer count for the current streaming session
#[derive(Debug, Default)]
pub struct ClientRegistry {
    count: usize,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new viewer; returns the updated count
    pub fn connected(&mut self, client: &ClientId) -> usize {
        self.count += 1;
        tracing::info!(client = %client, viewers = self.count, "Client connected");
        self.count
    }

    /// Record a departed viewer; floored at 0 because disconnect events for
    /// a torn-down server are not guaranteed to arrive exactly once
    pub fn disconnected(&mut self, client: &ClientId) -> usize {
        self.count = self.count.saturating_sub(1);
        tracing::info!(client = %client, viewers = self.count, "Client disconnected");
        self.count
    }

    /// Forget all viewers (session stopped)
    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> usize {
        self.count
    }
}
