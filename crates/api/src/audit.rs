//! Admin audit trail.
//!
//! Handlers hand records to an [`AuditSink`] and move on. The queue-backed
//! sink buffers them on a bounded channel; a worker task drains the channel
//! and writes each record as a structured log event on the `audit` target.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// One audited admin action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub action: &'static str,
    pub resource_type: &'static str,
    pub resource_id: String,
    pub actor: Option<String>,
    pub details: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Creates a record stamped with the current time.
    pub fn new(
        action: &'static str,
        resource_type: &'static str,
        resource_id: impl ToString,
        actor: Option<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            action,
            resource_type,
            resource_id: resource_id.to_string(),
            actor,
            details,
            recorded_at: Utc::now(),
        }
    }
}

/// Fire-and-forget destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Accepts a record. Never blocks and never fails the caller.
    fn record(&self, record: AuditRecord);
}

/// Sink that queues records for a background worker.
#[derive(Debug, Clone)]
pub struct QueueAuditSink {
    tx: mpsc::Sender<AuditRecord>,
}

impl QueueAuditSink {
    /// Creates the sink and spawns its worker.
    ///
    /// The worker stops once every clone of the sink has been dropped and the
    /// queue is drained; await the handle to flush on shutdown.
    pub fn spawn(buffer_size: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let handle = tokio::spawn(run_worker(rx));
        (Self { tx }, handle)
    }
}

impl AuditSink for QueueAuditSink {
    fn record(&self, record: AuditRecord) {
        if let Err(e) = self.tx.try_send(record) {
            tracing::warn!(error = %e, "audit queue rejected record");
        }
    }
}

async fn run_worker(mut rx: mpsc::Receiver<AuditRecord>) {
    tracing::debug!("audit worker started");

    while let Some(record) = rx.recv().await {
        tracing::info!(
            target: "audit",
            action = record.action,
            resource_type = record.resource_type,
            resource_id = %record.resource_id,
            actor = record.actor.as_deref().unwrap_or("anonymous"),
            details = %record.details,
            recorded_at = %record.recorded_at.to_rfc3339(),
            "admin action"
        );
    }

    tracing::debug!("audit queue closed, worker stopping");
}

/// Sink that keeps records in memory, for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record accepted so far.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_worker_drains_and_stops_when_sink_dropped() {
        let (sink, handle) = QueueAuditSink::spawn(8);
        sink.record(AuditRecord::new(
            "flash_sale.delete",
            "flash_sale_activity",
            "a1",
            Some("ops".to_string()),
            serde_json::Value::Null,
        ));
        drop(sink);

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let sink = QueueAuditSink { tx };
        for i in 0..3 {
            sink.record(AuditRecord::new(
                "flash_sale.warmup",
                "flash_sale_activity",
                i,
                None,
                serde_json::Value::Null,
            ));
        }
    }

    #[test]
    fn in_memory_sink_keeps_records() {
        let sink = InMemoryAuditSink::new();
        sink.record(AuditRecord::new(
            "flash_sale.create",
            "flash_sale_activity",
            "a1",
            None,
            serde_json::json!({"title": "x"}),
        ));
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "flash_sale.create");
        assert_eq!(records[0].resource_id, "a1");
    }
}
