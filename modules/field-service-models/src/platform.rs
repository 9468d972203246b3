//! Platform-level records.
//!
//! `Tenant` and `PlatformSetting` are global and unrestricted. Writing them
//! is reserved for provisioning and platform-admin call sites, which carry
//! a bypass token anyway. `UserAccount` is tenant-scoped; credential lookup
//! before a tenant is known goes through the authentication bypass.

use serde::{Deserialize, Serialize};
use tenancy_db::TenantScoped;
use tenancy_security::TenantId;
use time::OffsetDateTime;
use uuid::Uuid;

/// The tenant directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TenantScoped)]
#[tenancy(unrestricted)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub plan: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TenantScoped)]
#[tenancy(unrestricted, primary_key = "key")]
pub struct PlatformSetting {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TenantScoped)]
#[tenancy(tenant_col = "tenant_id")]
pub struct UserAccount {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub email: String,
    pub role: String,
    pub active: bool,
}
