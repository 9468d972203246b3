//! Startup wiring of the tenancy layer.

use std::sync::Arc;

use tenancy_security::TenantContextResolver;

use crate::audit::{AuditDrain, QueuedAuditSink, TracingAuditWriter};
use crate::bypass::BypassAuthority;
use crate::config::TenancyConfig;
use crate::interceptor::QueryInterceptor;
use crate::registry::ScopedModelSet;
use crate::store::{ScopedStore, StorageDriver};

/// The wired components of one process.
///
/// Hand [`Self::store`] handles to services, [`Self::resolver`] to the
/// request boundary and [`Self::bypass_authority`] only to system-level
/// components.
#[derive(Debug)]
pub struct TenancyRuntime {
    resolver: TenantContextResolver,
    interceptor: Arc<QueryInterceptor>,
    audit: Arc<QueuedAuditSink>,
    drain: AuditDrain,
}

impl TenancyRuntime {
    /// Wires resolver, audit queue and drain, bypass authority and
    /// interceptor. Must be called inside a Tokio runtime.
    #[must_use]
    pub fn start(config: &TenancyConfig, registry: Arc<ScopedModelSet>) -> Self {
        let (audit, drain) = QueuedAuditSink::spawn(config.audit.queue_capacity, TracingAuditWriter);
        tracing::info!(
            models = registry.len(),
            scoped = registry.scoped().count(),
            unknown_models = ?config.unknown_models,
            audit_queue = config.audit.queue_capacity,
            "tenancy runtime started"
        );
        let interceptor = QueryInterceptor::new(registry, audit.clone())
            .with_unknown_model_policy(config.unknown_models);

        Self {
            resolver: TenantContextResolver::new(config.resolver.clone()),
            interceptor: Arc::new(interceptor),
            audit,
            drain,
        }
    }

    #[must_use]
    pub fn resolver(&self) -> &TenantContextResolver {
        &self.resolver
    }

    #[must_use]
    pub fn interceptor(&self) -> Arc<QueryInterceptor> {
        Arc::clone(&self.interceptor)
    }

    #[must_use]
    pub fn bypass_authority(&self) -> BypassAuthority {
        self.interceptor.bypass_authority()
    }

    /// A store over `driver` sharing this runtime's interceptor.
    #[must_use]
    pub fn store<D: StorageDriver>(&self, driver: Arc<D>) -> ScopedStore<D> {
        ScopedStore::new(self.interceptor(), driver)
    }

    /// Audit events logged directly because the queue was full.
    #[must_use]
    pub fn audit_overflowed(&self) -> u64 {
        self.audit.overflowed()
    }

    /// Flushes queued audit events. Returns the number the drain wrote.
    pub async fn shutdown(self) -> u64 {
        let written = self.drain.shutdown().await;
        tracing::info!(
            written,
            overflowed = self.audit.overflowed(),
            "tenancy runtime stopped"
        );
        written
    }
}
