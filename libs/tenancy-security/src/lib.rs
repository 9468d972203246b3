#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Request-scoped tenant identity.
//!
//! A verified credential is turned into a [`TenantContext`] by the
//! [`TenantContextResolver`] at the request boundary and published onto the
//! propagation [`channel`], where the data-access layer reads it without any
//! explicit parameter threading.

pub mod channel;
pub mod context;
pub mod credential;
pub mod error;
pub mod ids;

pub use channel::{current, establish, propagate, propagate_blocking, request_scope, spawn_propagated};
pub use context::TenantContext;
pub use credential::{ResolverConfig, TenantContextResolver, VerifiedCredential};
pub use error::{AuthenticationError, ChannelError, RequestError};
pub use ids::{ActorId, TenantId};
