use std::path::PathBuf;

use crate::operation::OperationKind;

/// Errors raised while scoping or executing an operation.
///
/// Every scoping variant is terminal: the operation was not (or must not be)
/// executed, and retrying it cannot succeed.
#[derive(thiserror::Error, Debug)]
pub enum ScopeError {
    /// A tenant-scoped operation arrived with no established tenant context.
    #[error("no tenant context for operation on tenant-scoped model `{model}`")]
    MissingTenantContext { model: String },

    /// No row matched in the current tenant. Also returned when the row exists
    /// under another tenant, so the two cases are indistinguishable.
    #[error("{model} not found")]
    NotFound { model: String },

    /// The caller's predicate constrains the tenant field to something other
    /// than the active tenant.
    #[error("filter on `{model}` constrains tenant field `{field}`")]
    TenantFieldConflict { model: String, field: String },

    /// An update patch tries to move a row to another tenant.
    #[error("update of `{model}` would reassign its tenant")]
    TenantReassignment { model: String },

    /// The model is not in the manifest and unknown models are rejected.
    #[error("model `{model}` is not declared in the tenancy manifest")]
    UnregisteredModel { model: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ScopeError {
    /// `true` for scoping violations, which are never retried.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Storage(StorageError::Driver(_)))
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors reported by a storage driver.
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("driver error: {0}")]
    Driver(String),

    #[error("duplicate primary key in `{model}`")]
    DuplicateKey { model: String },

    #[error("driver returned an unexpected outcome for {kind}")]
    UnexpectedOutcome { kind: OperationKind },

    #[error("row codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Errors building the tenancy manifest. Fatal at startup.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("model `{name}` is declared more than once")]
    DuplicateModel { name: String },

    #[error("invalid descriptor for model `{name}`: {reason}")]
    InvalidDescriptor { name: String, reason: String },
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to load tenancy config: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("config file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("invalid tenancy config: {0}")]
    Invalid(String),
}
