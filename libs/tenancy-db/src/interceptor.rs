//! Classification and rewriting of every outbound operation.
//!
//! The interceptor is a pure transform: one task-local read, no I/O, no
//! locks, no suspension point. Its output, [`ScopedOperation`], cannot be
//! built anywhere else, so a storage driver only ever sees operations that
//! passed through here.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tenancy_security::{TenantContext, TenantId};

use crate::audit::{AuditEvent, AuditSink};
use crate::bypass::BypassAuthority;
use crate::config::UnknownModelPolicy;
use crate::error::ScopeError;
use crate::operation::{Action, Filter, ModelName, Operation, OperationDescriptor, OperationKind, Record};
use crate::policy::ScopingState;
use crate::registry::{Coverage, DEFAULT_PRIMARY_KEY, ScopedModelSet};

/// An operation admitted by the [`QueryInterceptor`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedOperation {
    target: ModelName,
    action: Action,
    state: ScopingState,
    primary_key: &'static str,
    tenant: Option<(&'static str, TenantId)>,
}

impl ScopedOperation {
    #[must_use]
    pub fn target(&self) -> &ModelName {
        &self.target
    }

    /// The action as it must be executed, tenant constraints included.
    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.action.kind()
    }

    #[must_use]
    pub fn state(&self) -> ScopingState {
        self.state
    }

    /// Primary key field of the target model.
    #[must_use]
    pub fn primary_key(&self) -> &'static str {
        self.primary_key
    }

    /// Tenant the operation was scoped to, if it was scoped.
    #[must_use]
    pub fn tenant(&self) -> Option<TenantId> {
        self.tenant.map(|(_, tenant)| tenant)
    }

    /// Field holding the tenant id, for operations that were scoped.
    #[must_use]
    pub fn tenant_field(&self) -> Option<&'static str> {
        self.tenant.map(|(field, _)| field)
    }

    #[must_use]
    pub fn describe(&self) -> OperationDescriptor {
        OperationDescriptor {
            model: self.target.to_string(),
            kind: self.kind(),
        }
    }

    #[must_use]
    pub fn into_parts(self) -> (ModelName, Action) {
        (self.target, self.action)
    }
}

/// Enforces tenant scoping on operations before they reach storage.
#[derive(Clone)]
pub struct QueryInterceptor {
    registry: Arc<ScopedModelSet>,
    audit: Arc<dyn AuditSink>,
    unknown_models: UnknownModelPolicy,
}

impl fmt::Debug for QueryInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryInterceptor")
            .field("models", &self.registry.len())
            .field("unknown_models", &self.unknown_models)
            .finish_non_exhaustive()
    }
}

impl QueryInterceptor {
    #[must_use]
    pub fn new(registry: Arc<ScopedModelSet>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            registry,
            audit,
            unknown_models: UnknownModelPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_unknown_model_policy(mut self, policy: UnknownModelPolicy) -> Self {
        self.unknown_models = policy;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &ScopedModelSet {
        &self.registry
    }

    /// The only way to obtain a [`BypassAuthority`]. Its grants are audited
    /// to this interceptor's sink.
    #[must_use]
    pub fn bypass_authority(&self) -> BypassAuthority {
        BypassAuthority::new(Arc::clone(&self.audit))
    }

    /// Scopes `op` to the tenant established for the current request.
    ///
    /// # Errors
    /// See [`Self::intercept_with`].
    pub fn intercept(&self, op: Operation) -> Result<ScopedOperation, ScopeError> {
        self.intercept_with(op, tenancy_security::current())
    }

    /// Scopes `op` to an explicitly supplied context.
    ///
    /// # Errors
    /// - [`ScopeError::MissingTenantContext`] for a tenant-scoped target with
    ///   no context and no bypass token.
    /// - [`ScopeError::TenantFieldConflict`] if the filter constrains the
    ///   tenant field to any other tenant.
    /// - [`ScopeError::TenantReassignment`] if an update patch moves rows.
    /// - [`ScopeError::UnregisteredModel`] for unknown models under
    ///   [`UnknownModelPolicy::Reject`].
    pub fn intercept_with(
        &self,
        op: Operation,
        context: Option<TenantContext>,
    ) -> Result<ScopedOperation, ScopeError> {
        let (target, action, bypass) = op.into_parts();
        let coverage = self.registry.coverage(target.as_str());
        let primary_key = coverage
            .descriptor()
            .map_or(DEFAULT_PRIMARY_KEY, |d| d.primary_key);
        let state = ScopingState::classify(&coverage, bypass.is_some(), context.is_some()).next();
        if !state.admits() {
            tracing::warn!(
                model = %target,
                kind = %action.kind(),
                state = ?state,
                "rejecting tenant-scoped operation without tenant context"
            );
            return Err(missing_context(&target));
        }
        let admitted = |action, tenant| ScopedOperation {
            target: target.clone(),
            action,
            state,
            primary_key,
            tenant,
        };

        if let Some(token) = bypass {
            let descriptor = OperationDescriptor {
                model: target.to_string(),
                kind: action.kind(),
            };
            tracing::debug!(
                operation = %descriptor,
                call_site = token.call_site().id(),
                token_id = %token.id(),
                "tenant scoping bypassed"
            );
            self.audit.record(AuditEvent::used(&token, descriptor));
            return Ok(admitted(action, None));
        }

        match coverage {
            Coverage::Scoped(descriptor) => {
                // Admitted and scoped means the context is present.
                let ctx = context.ok_or_else(|| missing_context(&target))?;
                let field = descriptor.tenant_field().unwrap_or("tenant_id");
                let tenant = ctx.tenant_id();
                let action = scope_action(&target, action, field, tenant)?;
                tracing::trace!(model = %target, kind = %action.kind(), tenant_id = %tenant, "operation scoped");
                Ok(admitted(action, Some((field, tenant))))
            }
            Coverage::Unrestricted(_) => {
                tracing::trace!(model = %target, kind = %action.kind(), "unrestricted model, passing through");
                Ok(admitted(action, None))
            }
            Coverage::Unknown => match self.unknown_models {
                UnknownModelPolicy::Allow => {
                    tracing::trace!(model = %target, kind = %action.kind(), "unknown model, passing through");
                    Ok(admitted(action, None))
                }
                UnknownModelPolicy::Warn => {
                    tracing::warn!(
                        model = %target,
                        kind = %action.kind(),
                        "model is not in the tenancy manifest; operation is not tenant-scoped"
                    );
                    Ok(admitted(action, None))
                }
                UnknownModelPolicy::Reject => {
                    tracing::warn!(model = %target, kind = %action.kind(), "rejecting operation on unknown model");
                    Err(ScopeError::UnregisteredModel {
                        model: target.to_string(),
                    })
                }
            },
        }
    }
}

fn missing_context(model: &ModelName) -> ScopeError {
    ScopeError::MissingTenantContext {
        model: model.to_string(),
    }
}

fn tenant_value(tenant: TenantId) -> Value {
    Value::String(tenant.to_string())
}

fn scope_action(
    model: &ModelName,
    action: Action,
    field: &str,
    tenant: TenantId,
) -> Result<Action, ScopeError> {
    let value = tenant_value(tenant);
    let filter = |filter: Filter| scope_filter(model, filter, field, &value);
    let patch = |patch: Record| scope_patch(model, patch, field, &value);

    Ok(match action {
        Action::ReadOne { filter: f } => Action::ReadOne { filter: filter(f)? },
        Action::ReadMany { filter: f } => Action::ReadMany { filter: filter(f)? },
        Action::Create { payload } => Action::Create {
            payload: stamp_payload(model, payload, field, &value),
        },
        Action::Update { id, filter: f, patch: p } => Action::Update {
            id,
            filter: filter(f)?,
            patch: patch(p)?,
        },
        Action::UpdateMany { filter: f, patch: p } => Action::UpdateMany {
            filter: filter(f)?,
            patch: patch(p)?,
        },
        Action::Delete { id, filter: f } => Action::Delete { id, filter: filter(f)? },
        Action::DeleteMany { filter: f } => Action::DeleteMany { filter: filter(f)? },
    })
}

/// AND-merges the tenant predicate. Caller clauses on the tenant field are
/// only tolerated when they already select the active tenant alone.
fn scope_filter(model: &ModelName, filter: Filter, field: &str, tenant: &Value) -> Result<Filter, ScopeError> {
    if filter.widens(field, tenant) {
        tracing::warn!(model = %model, field, "rejecting filter that constrains the tenant field");
        return Err(ScopeError::TenantFieldConflict {
            model: model.to_string(),
            field: field.to_owned(),
        });
    }
    Ok(Filter::eq(field, tenant.clone()).and(filter))
}

fn stamp_payload(model: &ModelName, mut payload: Record, field: &str, tenant: &Value) -> Record {
    if let Some(supplied) = payload.insert(field.to_owned(), tenant.clone())
        && &supplied != tenant
    {
        tracing::warn!(
            model = %model,
            field,
            supplied = %supplied,
            "overwrote caller-supplied tenant value on create"
        );
    }
    payload
}

fn scope_patch(model: &ModelName, mut patch: Record, field: &str, tenant: &Value) -> Result<Record, ScopeError> {
    match patch.remove(field) {
        Some(requested) if &requested != tenant => {
            tracing::warn!(model = %model, field, "rejecting update that reassigns tenant");
            Err(ScopeError::TenantReassignment {
                model: model.to_string(),
            })
        }
        _ => Ok(patch),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::audit::{AuditEventKind, MemoryAuditSink};
    use crate::bypass::BypassCallSite;
    use crate::registry::ModelDescriptor;
    use serde_json::json;
    use std::collections::HashMap;
    use tenancy_security::ActorId;
    use tracing_subscriber::layer::SubscriberExt;

    /// Records the fields of every warning.
    #[derive(Clone, Default)]
    struct Capture(Arc<parking_lot::Mutex<Vec<HashMap<String, String>>>>);

    impl Capture {
        fn warnings(&self) -> Vec<HashMap<String, String>> {
            self.0.lock().clone()
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Capture {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                let mut fields = FieldMap::default();
                event.record(&mut fields);
                self.0.lock().push(fields.0);
            }
        }
    }

    #[derive(Default)]
    struct FieldMap(HashMap<String, String>);

    impl tracing::field::Visit for FieldMap {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.0.insert(field.name().to_owned(), format!("{value:?}"));
        }
    }

    const ORDER: ModelDescriptor = ModelDescriptor::tenant_scoped("WorkOrder", "tenant_id", "id");
    const TENANT: ModelDescriptor = ModelDescriptor::unrestricted("Tenant", "id");

    fn setup() -> (QueryInterceptor, Arc<MemoryAuditSink>) {
        let registry = ScopedModelSet::from_descriptors([ORDER, TENANT]).unwrap();
        let sink = Arc::new(MemoryAuditSink::default());
        (QueryInterceptor::new(Arc::new(registry), sink.clone()), sink)
    }

    fn ctx() -> TenantContext {
        TenantContext::new(TenantId::random(), ActorId::random())
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test records are objects"),
        }
    }

    fn tenant_eq(ctx: &TenantContext) -> Filter {
        Filter::eq("tenant_id", ctx.tenant_id().to_string())
    }

    #[test]
    fn read_many_gets_tenant_predicate() {
        let (interceptor, _) = setup();
        let ctx = ctx();
        let op = Operation::named("WorkOrder", Action::ReadMany {
            filter: Filter::eq("status", "open"),
        });

        let scoped = interceptor.intercept_with(op, Some(ctx)).unwrap();

        assert_eq!(scoped.state(), ScopingState::ScopedContextPresent);
        assert_eq!(scoped.tenant(), Some(ctx.tenant_id()));
        assert_eq!(scoped.tenant_field(), Some("tenant_id"));
        assert_eq!(
            scoped.action(),
            &Action::ReadMany {
                filter: Filter::All(vec![tenant_eq(&ctx), Filter::eq("status", "open")]),
            }
        );
    }

    #[test]
    fn match_all_reduces_to_tenant_predicate() {
        let (interceptor, _) = setup();
        let ctx = ctx();
        let op = Operation::named("WorkOrder", Action::DeleteMany { filter: Filter::all() });

        let scoped = interceptor.intercept_with(op, Some(ctx)).unwrap();
        assert_eq!(scoped.action().predicate(), Some(&tenant_eq(&ctx)));
    }

    #[test]
    fn by_id_mutations_are_constrained_to_tenant() {
        let (interceptor, _) = setup();
        let ctx = ctx();

        let delete = Operation::named("WorkOrder", Action::Delete {
            id: json!("wo-1"),
            filter: Filter::all(),
        });
        let scoped = interceptor.intercept_with(delete, Some(ctx)).unwrap();
        assert_eq!(
            scoped.action(),
            &Action::Delete {
                id: json!("wo-1"),
                filter: tenant_eq(&ctx),
            }
        );

        let update = Operation::named("WorkOrder", Action::Update {
            id: json!("wo-1"),
            filter: Filter::all(),
            patch: record(json!({ "status": "closed" })),
        });
        let scoped = interceptor.intercept_with(update, Some(ctx)).unwrap();
        assert_eq!(scoped.action().predicate(), Some(&tenant_eq(&ctx)));
        assert_eq!(scoped.primary_key(), "id");
    }

    #[test]
    fn create_overwrites_supplied_tenant() {
        let (interceptor, _) = setup();
        let ctx = ctx();
        let other = TenantId::random();
        let op = Operation::named("WorkOrder", Action::Create {
            payload: record(json!({ "tenant_id": other.to_string(), "title": "x" })),
        });

        let scoped = interceptor.intercept_with(op, Some(ctx)).unwrap();
        let payload = scoped.action().payload().unwrap();
        assert_eq!(payload["tenant_id"], json!(ctx.tenant_id().to_string()));
        assert_eq!(payload["title"], json!("x"));
    }

    #[test]
    fn filter_naming_another_tenant_is_rejected() {
        let (interceptor, _) = setup();
        let ctx = ctx();

        let widening = [
            Filter::eq("tenant_id", TenantId::random().to_string()),
            Filter::any([Filter::eq("status", "open"), Filter::ne("tenant_id", "x")]),
            tenant_eq(&ctx).negate(),
        ];
        for filter in widening {
            let op = Operation::named("WorkOrder", Action::ReadMany { filter });
            let err = interceptor.intercept_with(op, Some(ctx)).unwrap_err();
            assert!(matches!(err, ScopeError::TenantFieldConflict { ref field, .. } if field == "tenant_id"));
        }

        let redundant = Operation::named("WorkOrder", Action::ReadOne { filter: tenant_eq(&ctx) });
        assert!(interceptor.intercept_with(redundant, Some(ctx)).is_ok());
    }

    #[test]
    fn patch_cannot_move_rows() {
        let (interceptor, _) = setup();
        let ctx = ctx();

        let moving = Operation::named("WorkOrder", Action::UpdateMany {
            filter: Filter::all(),
            patch: record(json!({ "tenant_id": TenantId::random().to_string() })),
        });
        let err = interceptor.intercept_with(moving, Some(ctx)).unwrap_err();
        assert!(matches!(err, ScopeError::TenantReassignment { .. }));

        let same = Operation::named("WorkOrder", Action::UpdateMany {
            filter: Filter::all(),
            patch: record(json!({ "tenant_id": ctx.tenant_id().to_string(), "status": "closed" })),
        });
        let scoped = interceptor.intercept_with(same, Some(ctx)).unwrap();
        let patch = scoped.action().payload().unwrap();
        assert!(!patch.contains_key("tenant_id"));
        assert_eq!(patch.len(), 1);
    }

    #[test]
    fn scoped_model_without_context_is_rejected() {
        let (interceptor, _) = setup();
        let op = Operation::named("WorkOrder", Action::ReadMany { filter: Filter::all() });
        let err = interceptor.intercept(op).unwrap_err();
        assert!(matches!(err, ScopeError::MissingTenantContext { ref model } if model == "WorkOrder"));
    }

    #[test]
    fn only_admitting_states_leave_the_interceptor() {
        let (interceptor, _) = setup();
        let read = |model| Operation::named(model, Action::ReadMany { filter: Filter::all() });

        for model in ["WorkOrder", "Tenant", "Scratch"] {
            for context in [Some(ctx()), None] {
                match interceptor.intercept_with(read(model), context) {
                    Ok(scoped) => assert!(scoped.state().admits(), "{model}: {:?}", scoped.state()),
                    Err(err) => {
                        assert_eq!((model, context), ("WorkOrder", None));
                        assert!(matches!(err, ScopeError::MissingTenantContext { .. }));
                    }
                }
            }
        }
    }

    #[test]
    fn rejection_is_logged_in_the_rejected_state() {
        let capture = Capture::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));
        let (interceptor, _) = setup();

        let op = Operation::named("WorkOrder", Action::ReadMany { filter: Filter::all() });
        assert!(interceptor.intercept_with(op, None).is_err());

        let warnings = capture.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].get("state").map(String::as_str), Some("Rejected"));
    }

    #[test]
    fn unrestricted_models_pass_unchanged() {
        let (interceptor, _) = setup();
        let action = Action::ReadMany { filter: Filter::eq("slug", "acme") };
        let scoped = interceptor
            .intercept_with(Operation::named("Tenant", action.clone()), None)
            .unwrap();
        assert_eq!(scoped.action(), &action);
        assert_eq!(scoped.state(), ScopingState::Unscoped);
        assert!(scoped.tenant().is_none());
        assert!(scoped.tenant_field().is_none());
    }

    #[test]
    fn unknown_models_follow_policy() {
        let (interceptor, _) = setup();
        let op = || Operation::named("Scratch", Action::ReadMany { filter: Filter::all() });

        assert!(interceptor.intercept_with(op(), None).is_ok());

        let strict = interceptor.with_unknown_model_policy(UnknownModelPolicy::Reject);
        let err = strict.intercept_with(op(), Some(ctx())).unwrap_err();
        assert!(matches!(err, ScopeError::UnregisteredModel { .. }));
    }

    #[test]
    fn bypass_passes_unchanged_and_records_use() {
        let (interceptor, sink) = setup();
        let authority = interceptor.bypass_authority();
        let token = authority.grant(BypassCallSite::PlatformAdmin, "cross-tenant report");
        let token_id = token.id();

        let action = Action::ReadMany { filter: Filter::all() };
        let op = Operation::named("WorkOrder", action.clone()).with_bypass(token);
        let scoped = interceptor.intercept_with(op, None).unwrap();

        assert_eq!(scoped.state(), ScopingState::Bypassed);
        assert_eq!(scoped.action(), &action);

        let uses = sink.uses_of(token_id);
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].kind, AuditEventKind::Used);
        assert_eq!(
            sink.events().iter().filter(|e| e.token_id == token_id).map(|e| e.kind).collect::<Vec<_>>(),
            [AuditEventKind::Granted, AuditEventKind::Used]
        );
        assert_eq!(uses[0].operation.as_ref().map(ToString::to_string).as_deref(), Some("WorkOrder.ReadMany"));
    }
}
