//! Dual-write delivery over two transports.
//!
//! The primary is best effort: its outcome is logged and then discarded. The secondary is
//! authoritative and its outcome is the dispatcher's outcome. Swapping which backend sits on
//! which side therefore migrates delivery without callers seeing any change in contract.

use crate::error::DeliveryOutcome;
use crate::event::LogEvent;
use crate::transport::MessageTransport;
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DualWriteDispatcher {
    primary: Arc<dyn MessageTransport>,
    secondary: Arc<dyn MessageTransport>,
}

impl DualWriteDispatcher {
    pub fn new(primary: Arc<dyn MessageTransport>, secondary: Arc<dyn MessageTransport>) -> Self {
        Self { primary, secondary }
    }

    pub fn primary(&self) -> &Arc<dyn MessageTransport> {
        &self.primary
    }

    pub fn secondary(&self) -> &Arc<dyn MessageTransport> {
        &self.secondary
    }
}

#[async_trait]
impl MessageTransport for DualWriteDispatcher {
    fn name(&self) -> &str {
        "dual-write"
    }

    async fn send(&self, event: &LogEvent) -> DeliveryOutcome {
        if let Err(err) = self.primary.send(event).await {
            tracing::warn!(
                primary = self.primary.name(),
                request_id = event.request_id(),
                error = %err,
                "best-effort primary delivery failed"
            );
        }
        self.secondary.send(event).await
    }

    /// Children that are themselves dispatchers are left untouched.
    fn set_lower_priority(&self) {
        for child in [&self.primary, &self.secondary] {
            if !child.is_dual_write() {
                child.set_lower_priority();
            }
        }
    }

    fn is_dual_write(&self) -> bool {
        true
    }
}
