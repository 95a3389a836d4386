//! Status sinks: where per-benchmark outcomes are reported.
//!
//! Workers report concurrently and in no particular order, so every sink
//! must be safe to call from many tasks at once. Delivery is best-effort:
//! the runtime logs a failed report and moves on.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use evalhub_core::StatusEvent;

use crate::error::SinkError;

/// Receives benchmark status updates for an evaluation.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report_benchmark_status(
        &self,
        job_id: &str,
        event: &StatusEvent,
    ) -> Result<(), SinkError>;
}

/// Sink that only writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusSink;

#[async_trait]
impl StatusSink for LogStatusSink {
    async fn report_benchmark_status(
        &self,
        job_id: &str,
        event: &StatusEvent,
    ) -> Result<(), SinkError> {
        let message = event
            .error_message
            .as_ref()
            .map(|m| m.message.as_str())
            .unwrap_or_default();
        warn!(
            %job_id,
            provider_id = %event.provider_id,
            benchmark_id = %event.benchmark_id,
            status = ?event.status,
            %message,
            "benchmark status"
        );
        Ok(())
    }
}

/// In-memory sink that records every event (for testing).
#[derive(Debug, Default)]
pub struct MemoryStatusSink {
    events: Mutex<Vec<(String, StatusEvent)>>,
    reject: Option<String>,
}

impl MemoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records events but reports every delivery as failed.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            reject: Some(reason.into()),
        }
    }

    /// Every `(job_id, event)` received so far, in arrival order.
    pub async fn events(&self) -> Vec<(String, StatusEvent)> {
        self.events.lock().await.clone()
    }

    /// Events received for one evaluation.
    pub async fn events_for(&self, job_id: &str) -> Vec<StatusEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, event)| event.clone())
            .collect()
    }
}

#[async_trait]
impl StatusSink for MemoryStatusSink {
    async fn report_benchmark_status(
        &self,
        job_id: &str,
        event: &StatusEvent,
    ) -> Result<(), SinkError> {
        self.events
            .lock()
            .await
            .push((job_id.to_string(), event.clone()));
        match &self.reject {
            Some(reason) => Err(SinkError(reason.clone())),
            None => Ok(()),
        }
    }
}
