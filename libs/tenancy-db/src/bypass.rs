//! Audited escape hatch for system-level operations.
//!
//! A [`BypassToken`] is a capability for exactly one [`Operation`]: it is not
//! `Clone`, can only be minted by [`BypassAuthority::grant`], and is moved
//! into the operation it exempts. Nothing ambient is set, so a bypass cannot
//! leak into other operations or other requests.
//!
//! [`Operation`]: crate::Operation

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};

/// The compiled-in allow-list of places allowed to skip tenant scoping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BypassCallSite {
    /// Credential lookup before any tenant is known.
    Authentication,
    /// Creating a tenant and seeding its first rows.
    TenantProvisioning,
    /// Platform operator tooling working across tenants.
    PlatformAdmin,
    /// Schema and data migrations.
    SchemaMigration,
}

impl BypassCallSite {
    pub const ALL: [Self; 4] = [
        Self::Authentication,
        Self::TenantProvisioning,
        Self::PlatformAdmin,
        Self::SchemaMigration,
    ];

    /// Stable identifier recorded in audit events.
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            Self::Authentication => "auth.credential-lookup",
            Self::TenantProvisioning => "tenant.provisioning",
            Self::PlatformAdmin => "platform.admin",
            Self::SchemaMigration => "schema.migration",
        }
    }
}

impl fmt::Display for BypassCallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Single-use permission to run one operation without tenant scoping.
pub struct BypassToken {
    id: Uuid,
    call_site: BypassCallSite,
    reason: &'static str,
    location: &'static Location<'static>,
    granted_at: OffsetDateTime,
}

impl BypassToken {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn call_site(&self) -> BypassCallSite {
        self.call_site
    }

    #[must_use]
    pub fn reason(&self) -> &'static str {
        self.reason
    }

    /// Source location that requested the grant.
    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    #[must_use]
    pub fn granted_at(&self) -> OffsetDateTime {
        self.granted_at
    }
}

impl fmt::Debug for BypassToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BypassToken")
            .field("id", &self.id)
            .field("call_site", &self.call_site)
            .field("reason", &self.reason)
            .field("location", &format_args!("{}", self.location))
            .field("granted_at", &self.granted_at)
            .finish()
    }
}

/// Issues bypass tokens and audits every grant.
///
/// Handed only to system-level components (authentication, provisioning,
/// platform administration); tenant-facing services never receive one.
/// Obtained from [`QueryInterceptor::bypass_authority`], so grants land in
/// the same sink as the uses that interceptor records.
///
/// [`QueryInterceptor::bypass_authority`]: crate::QueryInterceptor::bypass_authority
#[derive(Clone)]
pub struct BypassAuthority {
    audit: Arc<dyn AuditSink>,
}

impl fmt::Debug for BypassAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BypassAuthority").finish_non_exhaustive()
    }
}

impl BypassAuthority {
    #[must_use]
    pub(crate) fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self { audit }
    }

    /// Grants a token for one operation from `call_site`.
    ///
    /// The caller's source location is captured and recorded alongside the
    /// call-site id and reason.
    #[track_caller]
    #[must_use]
    pub fn grant(&self, call_site: BypassCallSite, reason: &'static str) -> BypassToken {
        let token = BypassToken {
            id: Uuid::new_v4(),
            call_site,
            reason,
            location: Location::caller(),
            granted_at: OffsetDateTime::now_utc(),
        };
        self.audit.record(AuditEvent::granted(&token));
        token
    }
}
