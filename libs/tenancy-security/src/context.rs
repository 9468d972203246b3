use time::OffsetDateTime;

use crate::ids::{ActorId, TenantId};

/// Identity of the tenant and actor a request runs on behalf of.
///
/// One instance exists per request. It has no setters: once the resolver has
/// produced it the only way to get a different identity is a different request.
/// Never persisted, so not serializable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
    actor_id: ActorId,
    established_at: OffsetDateTime,
}

impl TenantContext {
    /// Creates a context stamped with the current UTC time.
    #[must_use]
    pub fn new(tenant_id: TenantId, actor_id: ActorId) -> Self {
        Self {
            tenant_id,
            actor_id,
            established_at: OffsetDateTime::now_utc(),
        }
    }

    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    #[must_use]
    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    /// When the request boundary established this identity.
    #[must_use]
    pub fn established_at(&self) -> OffsetDateTime {
        self.established_at
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn carries_identity_and_timestamp() {
        let before = OffsetDateTime::now_utc();
        let tenant = TenantId::random();
        let actor = ActorId::random();

        let ctx = TenantContext::new(tenant, actor);

        assert_eq!(ctx.tenant_id(), tenant);
        assert_eq!(ctx.actor_id(), actor);
        assert!(ctx.established_at() >= before);
        assert!(ctx.established_at() <= OffsetDateTime::now_utc());
    }
}
