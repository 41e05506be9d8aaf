//! Single-backend delivery.
//!
//! Every backend (queue, stream, HTTP) implements [`MessageTransport`]. Backends live in the
//! companion crates (`tollgate-kafka`, `tollgate-nats`, `tollgate-http`); this module holds the
//! contract plus an in-memory transport for tests and local development.
//!
//! Contract:
//! - `send` retries internally (see [`RetryPolicy`](crate::RetryPolicy)) and returns the final
//!   outcome as a value. It never panics on ordinary failures.
//! - Implementations are shared across concurrent `send` calls and must be safe for that.
//! - `set_lower_priority` switches a leaf to its degraded-priority destination, if it has one.

use crate::error::{DeliveryError, DeliveryOutcome};
use crate::event::LogEvent;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A delivery backend.
#[async_trait]
pub trait MessageTransport: Send + Sync + std::fmt::Debug {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    /// Deliver one event, retrying within the transport's budget.
    async fn send(&self, event: &LogEvent) -> DeliveryOutcome;

    /// Route subsequent sends to the lower-priority destination. No-op by default.
    fn set_lower_priority(&self) {}

    /// True for composite transports that forward priority changes themselves.
    fn is_dual_write(&self) -> bool {
        false
    }
}

/// Which destination a leaf transport currently writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    Lower,
}

/// Shared priority switch for leaf transports.
#[derive(Debug, Default)]
pub struct PriorityFlag(AtomicBool);

impl PriorityFlag {
    pub fn lower(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn get(&self) -> Priority {
        if self.0.load(Ordering::Acquire) {
            Priority::Lower
        } else {
            Priority::Normal
        }
    }
}

/// A transport that keeps delivered events in memory.
///
/// Failures can be scripted: `fail_next(n)` makes the next `n` sends fail, `always_fail()` makes
/// every send fail. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    name: String,
    inner: Arc<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    delivered: Mutex<VecDeque<(Priority, LogEvent)>>,
    attempts: AtomicUsize,
    fail_next: AtomicUsize,
    always_fail: AtomicBool,
    priority: PriorityFlag,
}

impl MemoryTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), inner: Arc::new(MemoryInner::default()) }
    }

    pub fn fail_next(&self, n: usize) {
        self.inner.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn always_fail(&self) {
        self.inner.always_fail.store(true, Ordering::SeqCst);
    }

    /// Events delivered so far, in order.
    pub fn events(&self) -> Vec<LogEvent> {
        self.delivered().into_iter().map(|(_, e)| e).collect()
    }

    /// Events delivered so far, with the priority they were written at.
    pub fn delivered(&self) -> Vec<(Priority, LogEvent)> {
        self.inner.delivered.lock().map(|d| d.iter().cloned().collect()).unwrap_or_default()
    }

    /// Total `send` calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn priority(&self) -> Priority {
        self.inner.priority.get()
    }

    fn should_fail(&self) -> bool {
        if self.inner.always_fail.load(Ordering::SeqCst) {
            return true;
        }
        self.inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, event: &LogEvent) -> DeliveryOutcome {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        if self.should_fail() {
            return Err(DeliveryError::transport(format!("{} unavailable", self.name)));
        }
        let mut delivered = self
            .inner
            .delivered
            .lock()
            .map_err(|_| DeliveryError::transport("memory transport poisoned"))?;
        delivered.push_back((self.inner.priority.get(), event.clone()));
        Ok(())
    }

    fn set_lower_priority(&self) {
        self.inner.priority.lower();
    }
}
