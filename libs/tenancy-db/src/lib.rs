#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Tenant-isolation enforcement for the shared multi-tenant store.
//!
//! Service code never talks to the storage driver directly. It builds an
//! [`Operation`] and hands it to a [`ScopedStore`], which runs it through the
//! [`QueryInterceptor`] first:
//!
//! ```ignore
//! use tenancy_db::{Filter, Operation, ScopedStore};
//!
//! // Inside a request scope established by `TenantContextResolver::run_scoped`
//! let orders: Vec<WorkOrder> = store.find_many::<WorkOrder>(Filter::all()).await?;
//! ```
//!
//! # Policy
//!
//! | Target | Context | Result |
//! |--------|---------|--------|
//! | carries a `BypassToken` | any | forwarded as-is, audited |
//! | unrestricted / not in manifest | any | forwarded as-is |
//! | tenant-scoped | present | tenant predicate AND-merged / payload stamped |
//! | tenant-scoped | absent | rejected, never forwarded |

// The derive expands to `::tenancy_db::...` paths, which must also resolve
// inside this crate's own tests.
extern crate self as tenancy_db;

pub mod audit;
pub mod bypass;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod memory;
pub mod operation;
pub mod policy;
pub mod registry;
pub mod runtime;
pub mod store;

pub use audit::{
    AUDIT_TARGET, AuditDrain, AuditEvent, AuditEventKind, AuditSink, AuditWriter,
    MemoryAuditSink, QueuedAuditSink, TracingAuditWriter,
};
pub use bypass::{BypassAuthority, BypassCallSite, BypassToken};
pub use config::{AuditConfig, TenancyConfig, UnknownModelPolicy};
pub use error::{ConfigError, RegistryError, ScopeError, StorageError};
pub use interceptor::{QueryInterceptor, ScopedOperation};
pub use memory::InMemoryDriver;
pub use operation::{Action, Filter, ModelName, Operation, OperationDescriptor, OperationKind, Record};
pub use policy::ScopingState;
pub use registry::{Coverage, ModelDescriptor, ScopedModel, ScopedModelSet, Scoping};
pub use runtime::TenancyRuntime;
pub use store::{Outcome, ScopedStore, StorageDriver};

pub use tenancy_db_macros::TenantScoped;

#[doc(hidden)]
pub mod __private {
    pub use inventory;
}
