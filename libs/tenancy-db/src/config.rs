//! Runtime configuration for the tenancy layer.
//!
//! Layering: defaults, then an optional YAML file, then `HVAC_TENANCY__*`
//! environment variables (`__` separates nesting levels, e.g.
//! `HVAC_TENANCY__AUDIT__QUEUE_CAPACITY=4096`).
//!
//! The model manifest is not configuration; it is compiled in.

use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use tenancy_security::ResolverConfig;

use crate::error::ConfigError;

pub const ENV_PREFIX: &str = "HVAC_TENANCY__";

/// What to do with operations on models absent from the manifest.
///
/// They are never scoped; the policy only controls how visible that is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownModelPolicy {
    Allow,
    #[default]
    Warn,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Bound of the in-memory audit queue.
    pub queue_capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TenancyConfig {
    pub resolver: ResolverConfig,
    pub audit: AuditConfig,
    pub unknown_models: UnknownModelPolicy,
}

impl TenancyConfig {
    /// Loads the layered configuration.
    ///
    /// # Errors
    /// [`ConfigError::MissingFile`] if `path` is given but does not exist,
    /// otherwise any extraction or validation failure.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::MissingFile {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    /// Extracts and validates a config from an already layered figment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if extraction or validation fails.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        tracing::debug!(
            queue_capacity = config.audit.queue_capacity,
            unknown_models = ?config.unknown_models,
            "tenancy config loaded"
        );
        Ok(config)
    }

    /// # Errors
    /// Returns [`ConfigError::Invalid`] for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audit.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "audit.queue_capacity must be at least 1".to_owned(),
            ));
        }
        let claims = [
            ("resolver.tenant_claim", &self.resolver.tenant_claim),
            ("resolver.actor_claim", &self.resolver.actor_claim),
        ];
        for (key, claim) in claims {
            if claim.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{key} must not be empty")));
            }
        }
        if self.resolver.tenant_claim == self.resolver.actor_claim {
            return Err(ConfigError::Invalid(
                "resolver.tenant_claim and resolver.actor_claim must differ".to_owned(),
            ));
        }
        Ok(())
    }
}
