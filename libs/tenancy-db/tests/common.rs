#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tenancy_db::{
    InMemoryDriver, MemoryAuditSink, QueryInterceptor, Record, ScopedModel, ScopedModelSet,
    ScopedStore, TenantScoped,
};
use tenancy_security::{ActorId, TenantContext, TenantId, establish, request_scope};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TenantScoped)]
#[tenancy(tenant_col = "tenant_id")]
pub struct Ticket {
    pub id: String,
    pub tenant_id: TenantId,
    pub subject: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TenantScoped)]
#[tenancy(unrestricted)]
pub struct Region {
    pub id: String,
    pub code: String,
}

pub struct Harness {
    pub store: ScopedStore<InMemoryDriver>,
    pub driver: Arc<InMemoryDriver>,
    pub audit: Arc<MemoryAuditSink>,
}

pub fn harness() -> Harness {
    let registry =
        ScopedModelSet::from_descriptors([Ticket::DESCRIPTOR, Region::DESCRIPTOR]).unwrap();
    let audit = Arc::new(MemoryAuditSink::default());
    let interceptor = QueryInterceptor::new(Arc::new(registry), audit.clone());
    let driver = Arc::new(InMemoryDriver::new());
    Harness {
        store: ScopedStore::new(Arc::new(interceptor), Arc::clone(&driver)),
        driver,
        audit,
    }
}

pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

pub fn ticket_row(id: &str, tenant: TenantId, subject: &str) -> Record {
    record(json!({
        "id": id,
        "tenant_id": tenant.to_string(),
        "subject": subject,
        "status": "open",
    }))
}

/// Runs `fut` as a request authenticated for `tenant`.
pub async fn as_tenant<F: Future>(tenant: TenantId, fut: F) -> F::Output {
    request_scope(async move {
        establish(TenantContext::new(tenant, ActorId::random())).unwrap();
        fut.await
    })
    .await
    .unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    pub level: tracing::Level,
    pub target: String,
    pub message: String,
}

/// `tracing` layer that keeps every event it sees.
#[derive(Clone, Default)]
pub struct Capture {
    pub events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl Capture {
    pub fn at(&self, level: tracing::Level) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    pub fn on_target(&self, target: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.target == target)
            .cloned()
            .collect()
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Capture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.events.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_owned(),
            message: visitor.0,
        });
    }
}

struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}
