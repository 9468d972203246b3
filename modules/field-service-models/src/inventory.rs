use serde::{Deserialize, Serialize};
use tenancy_db::TenantScoped;
use tenancy_security::TenantId;
use uuid::Uuid;

/// An installed unit at a site (furnace, condenser, air handler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TenantScoped)]
#[tenancy(tenant_col = "tenant_id")]
pub struct Equipment {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub site_id: Uuid,
    pub kind: String,
    pub manufacturer: String,
    pub model_number: String,
    pub serial_number: Option<String>,
    pub refrigerant: Option<String>,
    pub capacity_tons: Option<f64>,
}

/// Stock held in a warehouse or on a truck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TenantScoped)]
#[tenancy(tenant_col = "tenant_id", primary_key = "sku")]
pub struct InventoryItem {
    pub sku: String,
    pub tenant_id: TenantId,
    pub description: String,
    pub location: String,
    pub quantity_on_hand: u32,
    pub reorder_point: u32,
    pub unit_cost_cents: u64,
}
