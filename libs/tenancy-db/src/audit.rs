//! Audit trail for bypass grants and uses.
//!
//! Recording never blocks request processing: [`QueuedAuditSink`] pushes onto
//! a bounded queue that an [`AuditDrain`] task empties into an
//! [`AuditWriter`]. When the queue is full the event is written straight to
//! the [`AUDIT_TARGET`] log target instead, so no use goes unrecorded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bypass::{BypassCallSite, BypassToken};
use crate::operation::OperationDescriptor;

/// `tracing` target for audit records.
pub const AUDIT_TARGET: &str = "tenancy::audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    Granted,
    Used,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub token_id: Uuid,
    pub kind: AuditEventKind,
    pub call_site: BypassCallSite,
    pub reason: &'static str,
    /// `file:line:column` of the grant.
    pub location: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Present on `Used` events.
    pub operation: Option<OperationDescriptor>,
}

impl AuditEvent {
    #[must_use]
    pub fn granted(token: &BypassToken) -> Self {
        Self::new(token, AuditEventKind::Granted, None)
    }

    #[must_use]
    pub fn used(token: &BypassToken, operation: OperationDescriptor) -> Self {
        Self::new(token, AuditEventKind::Used, Some(operation))
    }

    fn new(token: &BypassToken, kind: AuditEventKind, operation: Option<OperationDescriptor>) -> Self {
        Self {
            token_id: token.id(),
            kind,
            call_site: token.call_site(),
            reason: token.reason(),
            location: token.location().to_string(),
            timestamp: OffsetDateTime::now_utc(),
            operation,
        }
    }
}

/// Destination for audit events. Implementations must not block.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Long-term storage for audit events, fed by the [`AuditDrain`].
#[async_trait]
pub trait AuditWriter: Send + Sync + 'static {
    async fn write(&self, event: AuditEvent);
}

/// Writes audit events as structured log records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditWriter;

#[async_trait]
impl AuditWriter for TracingAuditWriter {
    async fn write(&self, event: AuditEvent) {
        log_event(&event, false);
    }
}

fn log_event(event: &AuditEvent, overflow: bool) {
    let operation = event.operation.as_ref().map(ToString::to_string);
    tracing::info!(
        target: AUDIT_TARGET,
        token_id = %event.token_id,
        kind = ?event.kind,
        call_site = event.call_site.id(),
        reason = event.reason,
        location = %event.location,
        timestamp = %event.timestamp,
        operation = operation.as_deref().unwrap_or("-"),
        overflow,
        "tenant-scoping bypass"
    );
}

/// Keeps events in memory. For tests and local tooling.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// `Used` events recorded for `token_id`.
    #[must_use]
    pub fn uses_of(&self, token_id: Uuid) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.token_id == token_id && e.kind == AuditEventKind::Used)
            .cloned()
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// Non-blocking sink backed by a bounded queue.
#[derive(Debug)]
pub struct QueuedAuditSink {
    tx: mpsc::Sender<AuditEvent>,
    overflowed: AtomicU64,
}

impl QueuedAuditSink {
    /// Creates the sink and spawns its drain on the current Tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn spawn<W: AuditWriter>(capacity: usize, writer: W) -> (Arc<Self>, AuditDrain) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(drain(rx, writer, cancel.clone()));
        let sink = Arc::new(Self {
            tx,
            overflowed: AtomicU64::new(0),
        });
        (sink, AuditDrain { cancel, handle })
    }

    /// Events that bypassed the queue because it was full or closed.
    #[must_use]
    pub fn overflowed(&self) -> u64 {
        self.overflowed.load(Ordering::Relaxed)
    }
}

impl AuditSink for QueuedAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Err(TrySendError::Full(event) | TrySendError::Closed(event)) = self.tx.try_send(event) {
            self.overflowed.fetch_add(1, Ordering::Relaxed);
            log_event(&event, true);
        }
    }
}

/// Handle to the task draining a [`QueuedAuditSink`].
#[derive(Debug)]
pub struct AuditDrain {
    cancel: CancellationToken,
    handle: JoinHandle<u64>,
}

impl AuditDrain {
    /// Stops accepting new events, writes what is queued, and returns the
    /// total number of events the drain wrote.
    pub async fn shutdown(self) -> u64 {
        self.cancel.cancel();
        match self.handle.await {
            Ok(written) => written,
            Err(err) => {
                tracing::error!(error = %err, "audit drain task failed");
                0
            }
        }
    }
}

async fn drain<W: AuditWriter>(
    mut rx: mpsc::Receiver<AuditEvent>,
    writer: W,
    cancel: CancellationToken,
) -> u64 {
    let mut written = 0_u64;
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => {
                    writer.write(event).await;
                    written += 1;
                }
                None => return written,
            },
        }
    }

    rx.close();
    while let Some(event) = rx.recv().await {
        writer.write(event).await;
        written += 1;
    }
    tracing::debug!(written, "audit drain stopped");
    written
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::bypass::BypassAuthority;

    #[derive(Clone, Default)]
    struct CollectingWriter(Arc<Mutex<Vec<AuditEvent>>>);

    #[async_trait]
    impl AuditWriter for CollectingWriter {
        async fn write(&self, event: AuditEvent) {
            self.0.lock().push(event);
        }
    }

    #[tokio::test]
    async fn queued_events_reach_the_writer() {
        let writer = CollectingWriter::default();
        let (sink, drain) = QueuedAuditSink::spawn(16, writer.clone());
        let authority = BypassAuthority::new(sink.clone());

        let token = authority.grant(BypassCallSite::TenantProvisioning, "seed tenant");
        sink.record(AuditEvent::used(
            &token,
            OperationDescriptor {
                model: "Tenant".to_owned(),
                kind: crate::OperationKind::Create,
            },
        ));

        assert_eq!(drain.shutdown().await, 2);
        assert_eq!(sink.overflowed(), 0);

        let events = writer.0.lock().clone();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, AuditEventKind::Granted);
        assert_eq!(events[1].kind, AuditEventKind::Used);
        assert!(events[0].timestamp <= events[1].timestamp);
    }

    #[tokio::test]
    async fn full_queue_overflows_to_log_instead_of_blocking() {
        let writer = CollectingWriter::default();
        let (sink, drain) = QueuedAuditSink::spawn(1, writer.clone());
        let authority = BypassAuthority::new(sink.clone());

        // The drain cannot run before this task yields, so the queue fills.
        for reason in ["one", "two", "three"] {
            drop(authority.grant(BypassCallSite::PlatformAdmin, reason));
        }
        assert_eq!(sink.overflowed(), 2);

        assert_eq!(drain.shutdown().await, 1);
        assert_eq!(writer.0.lock()[0].reason, "one");
    }

    #[tokio::test]
    async fn events_after_shutdown_are_still_logged() {
        let writer = CollectingWriter::default();
        let (sink, drain) = QueuedAuditSink::spawn(8, writer.clone());
        assert_eq!(drain.shutdown().await, 0);

        drop(BypassAuthority::new(sink.clone()).grant(BypassCallSite::PlatformAdmin, "late"));

        assert_eq!(sink.overflowed(), 1);
        assert!(writer.0.lock().is_empty());
    }

    #[test]
    fn event_serializes_with_rfc3339_timestamp() {
        let sink = Arc::new(MemoryAuditSink::default());
        drop(BypassAuthority::new(sink.clone()).grant(BypassCallSite::SchemaMigration, "backfill"));

        let json = serde_json::to_value(&sink.events()[0]).unwrap();
        assert_eq!(json["kind"], "granted");
        assert_eq!(json["call_site"], "schema_migration");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
    }
}
