use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::channel;
use crate::context::TenantContext;
use crate::error::{AuthenticationError, RequestError};
use crate::ids::{ActorId, TenantId};

/// Claim set of a credential that the authentication layer has already
/// verified (signature, expiry, audience). This crate only reads identity
/// out of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifiedCredential {
    claims: Map<String, Value>,
}

impl VerifiedCredential {
    #[must_use]
    pub fn new(claims: Map<String, Value>) -> Self {
        Self { claims }
    }

    /// Convenience constructor for the common two-claim shape.
    #[must_use]
    pub fn from_ids(tenant_claim: &str, tenant: Uuid, actor_claim: &str, actor: Uuid) -> Self {
        let mut claims = Map::new();
        claims.insert(tenant_claim.to_owned(), Value::String(tenant.to_string()));
        claims.insert(actor_claim.to_owned(), Value::String(actor.to_string()));
        Self { claims }
    }

    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

/// Names of the claims that carry tenant and actor identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    pub tenant_claim: String,
    pub actor_claim: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tenant_claim: "tenant_id".to_owned(),
            actor_claim: "sub".to_owned(),
        }
    }
}

/// Turns a verified credential into the request's [`TenantContext`].
#[derive(Debug, Clone, Default)]
pub struct TenantContextResolver {
    config: ResolverConfig,
}

impl TenantContextResolver {
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Extracts `{tenant_id, actor_id}` from the credential.
    ///
    /// # Errors
    /// Returns [`AuthenticationError`] if either claim is absent, is not a
    /// UUID string, or is the nil UUID.
    pub fn resolve(&self, credential: &VerifiedCredential) -> Result<TenantContext, AuthenticationError> {
        let tenant = parse_uuid_claim(credential, &self.config.tenant_claim)?;
        let actor = parse_uuid_claim(credential, &self.config.actor_claim)?;

        let tenant_id = TenantId::new(tenant).ok_or_else(|| AuthenticationError::NilIdentifier {
            claim: self.config.tenant_claim.clone(),
        })?;
        let actor_id = ActorId::new(actor).ok_or_else(|| AuthenticationError::NilIdentifier {
            claim: self.config.actor_claim.clone(),
        })?;

        Ok(TenantContext::new(tenant_id, actor_id))
    }

    /// Request boundary: opens a request scope, resolves and publishes the
    /// identity, then runs `handler` inside that scope.
    ///
    /// The handler is never polled when authentication fails or when the
    /// caller already runs inside a request.
    ///
    /// # Errors
    /// - [`RequestError::Authentication`] from [`Self::resolve`]
    /// - [`RequestError::Channel`] with [`ChannelError::NestedScope`] when
    ///   called from within another request
    ///
    /// [`ChannelError::NestedScope`]: crate::ChannelError::NestedScope
    pub async fn run_scoped<F>(
        &self,
        credential: &VerifiedCredential,
        handler: F,
    ) -> Result<F::Output, RequestError>
    where
        F: Future,
    {
        let ctx = match self.resolve(credential) {
            Ok(ctx) => ctx,
            Err(err) => {
                tracing::warn!(error = %err, "rejecting request without tenant identity");
                return Err(err.into());
            }
        };

        let scoped = channel::request_scope(async move {
            channel::establish(ctx)?;
            Ok::<_, RequestError>(handler.await)
        })
        .await??;
        Ok(scoped)
    }
}

fn parse_uuid_claim(credential: &VerifiedCredential, claim: &str) -> Result<Uuid, AuthenticationError> {
    let value = credential
        .claim(claim)
        .ok_or_else(|| AuthenticationError::MissingClaim {
            claim: claim.to_owned(),
        })?;

    let raw = value.as_str().ok_or_else(|| AuthenticationError::MalformedClaim {
        claim: claim.to_owned(),
        reason: "expected a string".to_owned(),
    })?;

    Uuid::parse_str(raw).map_err(|e| AuthenticationError::MalformedClaim {
        claim: claim.to_owned(),
        reason: e.to_string(),
    })
}
