//! The tenancy manifest: which models are tenant-scoped.
//!
//! Models declare themselves with `#[derive(TenantScoped)]`, which submits a
//! [`ModelDescriptor`] at link time. The set is read once at startup and is
//! immutable afterwards, so changing coverage always means a redeploy.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::Serialize;

use crate::error::RegistryError;

/// Primary key field assumed for models absent from the manifest.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Scoping decision declared for a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "scoping", rename_all = "snake_case")]
pub enum Scoping {
    /// Every row belongs to exactly one tenant, stored in `tenant_field`.
    TenantScoped { tenant_field: &'static str },
    /// Global data (tenant directory, platform settings).
    Unrestricted,
}

/// Manifest entry for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelDescriptor {
    pub name: &'static str,
    pub primary_key: &'static str,
    #[serde(flatten)]
    pub scoping: Scoping,
}

impl ModelDescriptor {
    #[must_use]
    pub const fn tenant_scoped(
        name: &'static str,
        tenant_field: &'static str,
        primary_key: &'static str,
    ) -> Self {
        Self {
            name,
            primary_key,
            scoping: Scoping::TenantScoped { tenant_field },
        }
    }

    #[must_use]
    pub const fn unrestricted(name: &'static str, primary_key: &'static str) -> Self {
        Self {
            name,
            primary_key,
            scoping: Scoping::Unrestricted,
        }
    }

    #[must_use]
    pub const fn tenant_field(&self) -> Option<&'static str> {
        match self.scoping {
            Scoping::TenantScoped { tenant_field } => Some(tenant_field),
            Scoping::Unrestricted => None,
        }
    }

    #[must_use]
    pub const fn is_scoped(&self) -> bool {
        matches!(self.scoping, Scoping::TenantScoped { .. })
    }
}

inventory::collect!(ModelDescriptor);

/// Implemented by `#[derive(TenantScoped)]`. Only types implementing this
/// can be named by the typed [`Operation`](crate::Operation) constructors.
pub trait ScopedModel {
    const DESCRIPTOR: ModelDescriptor;
}

/// How the manifest covers a model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage<'a> {
    Scoped(&'a ModelDescriptor),
    Unrestricted(&'a ModelDescriptor),
    /// Not declared at all. Treated as unscoped (allow-list semantics).
    Unknown,
}

impl<'a> Coverage<'a> {
    #[must_use]
    pub fn descriptor(&self) -> Option<&'a ModelDescriptor> {
        match *self {
            Coverage::Scoped(d) | Coverage::Unrestricted(d) => Some(d),
            Coverage::Unknown => None,
        }
    }
}

/// Immutable set of declared models, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopedModelSet {
    models: BTreeMap<&'static str, ModelDescriptor>,
}

static MANIFEST: OnceLock<Result<ScopedModelSet, RegistryError>> = OnceLock::new();

impl ScopedModelSet {
    /// Builds a set from explicit descriptors.
    ///
    /// # Errors
    /// Returns [`RegistryError`] on duplicate names or malformed descriptors.
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = ModelDescriptor>,
    {
        let mut models = BTreeMap::new();
        for descriptor in descriptors {
            validate_descriptor(&descriptor)?;
            if models.insert(descriptor.name, descriptor).is_some() {
                return Err(RegistryError::DuplicateModel {
                    name: descriptor.name.to_owned(),
                });
            }
        }
        Ok(Self { models })
    }

    /// Builds a set from every descriptor linked into this binary.
    ///
    /// # Errors
    /// Returns [`RegistryError`] on duplicate names or malformed descriptors.
    pub fn from_manifest() -> Result<Self, RegistryError> {
        let set = Self::from_descriptors(inventory::iter::<ModelDescriptor>.into_iter().copied())?;
        tracing::info!(
            models = set.len(),
            scoped = set.scoped().count(),
            "tenancy manifest loaded"
        );
        Ok(set)
    }

    /// Process-wide manifest, built on first access.
    ///
    /// # Errors
    /// Returns the [`RegistryError`] from the first build on every call.
    pub fn global() -> Result<&'static Self, RegistryError> {
        MANIFEST
            .get_or_init(Self::from_manifest)
            .as_ref()
            .map_err(Clone::clone)
    }

    #[must_use]
    pub fn is_scoped(&self, model: &str) -> bool {
        self.models.get(model).is_some_and(ModelDescriptor::is_scoped)
    }

    #[must_use]
    pub fn coverage(&self, model: &str) -> Coverage<'_> {
        match self.models.get(model) {
            Some(d) if d.is_scoped() => Coverage::Scoped(d),
            Some(d) => Coverage::Unrestricted(d),
            None => Coverage::Unknown,
        }
    }

    #[must_use]
    pub fn get(&self, model: &str) -> Option<&ModelDescriptor> {
        self.models.get(model)
    }

    /// All declared models, ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    pub fn scoped(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.iter().filter(|d| d.is_scoped())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn validate_descriptor(descriptor: &ModelDescriptor) -> Result<(), RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidDescriptor {
        name: descriptor.name.to_owned(),
        reason: reason.to_owned(),
    };

    if descriptor.name.trim().is_empty() {
        return Err(invalid("model name is empty"));
    }
    if descriptor.primary_key.is_empty() {
        return Err(invalid("primary key is empty"));
    }
    if let Some(field) = descriptor.tenant_field() {
        if field.is_empty() {
            return Err(invalid("tenant field is empty"));
        }
        if field == descriptor.primary_key {
            return Err(invalid("tenant field cannot be the primary key"));
        }
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    const WORK_ORDER: ModelDescriptor = ModelDescriptor::tenant_scoped("WorkOrder", "tenant_id", "id");
    const TENANT: ModelDescriptor = ModelDescriptor::unrestricted("Tenant", "id");

    #[derive(crate::TenantScoped)]
    #[tenancy(tenant_col = "tenant_id", name = "RegistryProbe")]
    #[allow(dead_code)]
    struct RegistryProbe {
        id: u64,
        tenant_id: String,
    }

    #[test]
    fn allow_list_semantics() {
        let set = ScopedModelSet::from_descriptors([WORK_ORDER, TENANT]).unwrap();

        assert!(set.is_scoped("WorkOrder"));
        assert!(!set.is_scoped("Tenant"));
        assert!(!set.is_scoped("NeverDeclared"));

        assert_eq!(set.coverage("WorkOrder"), Coverage::Scoped(&WORK_ORDER));
        assert_eq!(set.coverage("Tenant"), Coverage::Unrestricted(&TENANT));
        assert_eq!(set.coverage("NeverDeclared"), Coverage::Unknown);
    }

    #[test]
    fn names_are_case_sensitive() {
        let set = ScopedModelSet::from_descriptors([WORK_ORDER]).unwrap();
        assert!(!set.is_scoped("workorder"));
    }

    #[test]
    fn duplicate_names_fail_startup() {
        let err = ScopedModelSet::from_descriptors([WORK_ORDER, WORK_ORDER]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateModel {
                name: "WorkOrder".to_owned()
            }
        );
    }

    #[test]
    fn malformed_descriptors_fail_startup() {
        let bad = ModelDescriptor::tenant_scoped("Broken", "id", "id");
        assert!(matches!(
            ScopedModelSet::from_descriptors([bad]),
            Err(RegistryError::InvalidDescriptor { .. })
        ));

        let unnamed = ModelDescriptor::unrestricted(" ", "id");
        assert!(ScopedModelSet::from_descriptors([unnamed]).is_err());
    }

    #[test]
    fn derived_models_reach_the_manifest() {
        assert_eq!(
            <RegistryProbe as ScopedModel>::DESCRIPTOR,
            ModelDescriptor::tenant_scoped("RegistryProbe", "tenant_id", "id")
        );

        let manifest = ScopedModelSet::global().unwrap();
        assert!(manifest.is_scoped("RegistryProbe"));
    }

    #[test]
    fn listing_is_ordered_by_name() {
        let set = ScopedModelSet::from_descriptors([WORK_ORDER, TENANT]).unwrap();
        let names: Vec<_> = set.iter().map(|d| d.name).collect();
        assert_eq!(names, ["Tenant", "WorkOrder"]);
        assert_eq!(set.scoped().count(), 1);
    }
}
