use serde::{Deserialize, Serialize};
use tenancy_db::TenantScoped;
use tenancy_security::TenantId;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TenantScoped)]
#[tenancy(tenant_col = "tenant_id")]
pub struct Customer {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub display_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Commercial accounts get net-30 invoicing.
    pub commercial: bool,
}

/// A service address belonging to a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TenantScoped)]
#[tenancy(tenant_col = "tenant_id")]
pub struct Site {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub customer_id: Uuid,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub access_notes: Option<String>,
}
