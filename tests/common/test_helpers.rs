#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tollgate::{
    DeliveryOutcome, InstantSleeper, LogEvent, MemoryTransport, MessageTransport, RetryPolicy,
};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
pub struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl SharedWriter {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

pub struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route this thread's tracing output into a buffer until the guard drops.
pub fn capture_logs() -> (SharedWriter, DefaultGuard) {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(writer.clone()))
        .with_max_level(tracing::Level::DEBUG)
        .with_target(true)
        .without_time()
        .with_ansi(false)
        .finish();
    (writer, tracing::subscriber::set_default(subscriber))
}

/// A memory transport that retries like a real backend.
#[derive(Debug, Clone)]
pub struct RetryingTransport {
    pub inner: MemoryTransport,
    retry: RetryPolicy,
}

impl RetryingTransport {
    pub fn new(name: &str) -> Self {
        let retry = RetryPolicy::builder().with_sleeper(InstantSleeper).build().unwrap();
        Self { inner: MemoryTransport::new(name), retry }
    }
}

#[async_trait]
impl MessageTransport for RetryingTransport {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(&self, event: &LogEvent) -> DeliveryOutcome {
        self.retry.deliver(self.inner.name(), |_| self.inner.send(event)).await
    }

    fn set_lower_priority(&self) {
        self.inner.set_lower_priority();
    }
}

pub fn event(id: &str) -> LogEvent {
    LogEvent::builder(id).organization("org-1").provider("openai").build()
}
