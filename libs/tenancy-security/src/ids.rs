use std::fmt;

use uuid::Uuid;

/// Identifier of the tenant (customer organization) that owns a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TenantId(Uuid);

/// Identifier of the user or service acting on behalf of a tenant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ActorId(Uuid);

macro_rules! uuid_newtype {
    ($ty:ident) => {
        impl $ty {
            /// Wraps a raw UUID. Returns `None` for the nil UUID, which never
            /// identifies anyone.
            #[must_use]
            pub fn new(id: Uuid) -> Option<Self> {
                (!id.is_nil()).then_some(Self(id))
            }

            /// Generates a fresh random identifier.
            #[must_use]
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            #[must_use]
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$ty> for Uuid {
            fn from(value: $ty) -> Self {
                value.0
            }
        }
    };
}

uuid_newtype!(TenantId);
uuid_newtype!(ActorId);
