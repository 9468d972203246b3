//! Request-scoped, write-once propagation of the [`TenantContext`].
//!
//! The identity lives in a Tokio task-local slot that is opened per request
//! with [`request_scope`]. Nothing is keyed by thread or worker identity, so
//! a pooled worker that later polls another request's task sees that
//! request's slot and nothing else. Scopes do not nest: code already running
//! inside a request cannot open a fresh cell and establish another tenant.
//!
//! ```ignore
//! request_scope(async {
//!     establish(ctx)?;
//!     // Any code polled by this task, however deep, can read it:
//!     assert_eq!(current().map(|c| c.tenant_id()), Some(ctx.tenant_id()));
//!
//!     // Sub-tasks must opt in to inherit the request's identity.
//!     spawn_propagated(async { current() }).await
//! })
//! .await?;
//! ```

use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio::task::JoinHandle;

use crate::context::TenantContext;
use crate::error::ChannelError;

tokio::task_local! {
    static REQUEST_TENANT: RequestCell;
}

/// Write-once cell shared by every sub-task of one request.
#[derive(Clone, Default)]
struct RequestCell(Arc<OnceLock<TenantContext>>);

impl RequestCell {
    fn get(&self) -> Option<TenantContext> {
        self.0.get().copied()
    }

    fn set(&self, ctx: TenantContext) -> Result<(), ChannelError> {
        self.0
            .set(ctx)
            .map_err(|_| ChannelError::AlreadyEstablished)
    }
}

/// Runs `fut` as one request with a fresh, empty tenant cell.
///
/// Dropping the returned future (cancellation) discards the cell.
///
/// # Errors
/// [`ChannelError::NestedScope`] when the calling task already runs inside a
/// request scope. `fut` is not polled in that case.
pub async fn request_scope<F>(fut: F) -> Result<F::Output, ChannelError>
where
    F: Future,
{
    if in_request_scope() {
        tracing::warn!("refusing to open a request scope inside another request");
        return Err(ChannelError::NestedScope);
    }
    Ok(REQUEST_TENANT.scope(RequestCell::default(), fut).await)
}

/// Publishes the request's identity. Callable once per request.
///
/// # Errors
/// - [`ChannelError::NoRequestScope`] when called outside [`request_scope`]
/// - [`ChannelError::AlreadyEstablished`] on a second call within one request
pub fn establish(ctx: TenantContext) -> Result<(), ChannelError> {
    REQUEST_TENANT
        .try_with(|cell| cell.set(ctx))
        .map_err(|_| ChannelError::NoRequestScope)??;
    tracing::debug!(
        tenant_id = %ctx.tenant_id(),
        actor_id = %ctx.actor_id(),
        "tenant context established"
    );
    Ok(())
}

/// The identity of the request polling the current task, if any.
#[must_use]
pub fn current() -> Option<TenantContext> {
    REQUEST_TENANT.try_with(RequestCell::get).ok().flatten()
}

/// Returns `true` when the current task runs inside a request scope,
/// whether or not its identity has been established yet.
#[must_use]
pub fn in_request_scope() -> bool {
    REQUEST_TENANT.try_with(|_| ()).is_ok()
}

/// Wraps `fut` so that it observes the calling request's cell wherever it is
/// polled. Outside a request scope `fut` is returned to run without one.
pub fn propagate<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let cell = REQUEST_TENANT.try_with(Clone::clone).ok();
    async move {
        match cell {
            Some(cell) => REQUEST_TENANT.scope(cell, fut).await,
            None => fut.await,
        }
    }
}

/// [`tokio::spawn`] for sub-operations of the current request.
pub fn spawn_propagated<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(propagate(fut))
}

/// Wraps a synchronous closure (e.g. for `spawn_blocking`) so that it
/// observes the calling request's cell.
pub fn propagate_blocking<F, R>(f: F) -> impl FnOnce() -> R
where
    F: FnOnce() -> R,
{
    let cell = REQUEST_TENANT.try_with(Clone::clone).ok();
    move || match cell {
        Some(cell) => REQUEST_TENANT.sync_scope(cell, f),
        None => f(),
    }
}
