//! Data models of the HVAC field-service platform.
//!
//! This crate is the tenancy manifest: each model declares its scoping with
//! `#[derive(TenantScoped)]`, and linking the crate into a binary is what
//! registers those declarations. A struct carrying a `tenant_id` field cannot
//! be declared `unrestricted`, so a tenant-partitioned model cannot ship
//! unscoped.
//!
//! Binaries that only need the registrations link it with
//! `use field_service_models as _;`.

pub mod crm;
pub mod inventory;
pub mod platform;
pub mod work;

pub use crm::{Customer, Site};
pub use inventory::{Equipment, InventoryItem};
pub use platform::{PlatformSetting, Tenant, UserAccount};
pub use work::{
    Estimate, Invoice, LineItem, Note, Technician, WorkOrder, WorkOrderPriority, WorkOrderStatus,
};

/// Every model name this crate declares, for coverage checks.
pub const MODEL_NAMES: [&str; 12] = [
    "Customer",
    "Equipment",
    "Estimate",
    "InventoryItem",
    "Invoice",
    "PlatformSetting",
    "Site",
    "Technician",
    "Tenant",
    "UserAccount",
    "WorkOrder",
    "WorkOrderNote",
];
