use serde::{Deserialize, Serialize};
use tenancy_db::TenantScoped;
use tenancy_security::TenantId;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    #[default]
    Open,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderPriority {
    Low,
    #[default]
    Normal,
    Emergency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TenantScoped)]
#[tenancy(tenant_col = "tenant_id")]
pub struct WorkOrder {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub title: String,
    #[serde(default)]
    pub status: WorkOrderStatus,
    #[serde(default)]
    pub priority: WorkOrderPriority,
    pub customer_id: Option<Uuid>,
    pub site_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_for: Option<OffsetDateTime>,
}

impl WorkOrder {
    /// A new open work order. `tenant_id` is replaced with the request's
    /// tenant when the order is created through a scoped store.
    #[must_use]
    pub fn new(tenant_id: TenantId, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            title: title.into(),
            status: WorkOrderStatus::Open,
            priority: WorkOrderPriority::Normal,
            customer_id: None,
            site_id: None,
            technician_id: None,
            scheduled_for: None,
        }
    }
}

/// Technician's running log on a work order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TenantScoped)]
#[tenancy(tenant_col = "tenant_id", name = "WorkOrderNote")]
pub struct Note {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub work_order_id: Uuid,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TenantScoped)]
#[tenancy(tenant_col = "tenant_id")]
pub struct Technician {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub full_name: String,
    pub certifications: Vec<String>,
    pub on_call: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: u32,
    pub unit_price_cents: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TenantScoped)]
#[tenancy(tenant_col = "tenant_id")]
pub struct Estimate {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub customer_id: Uuid,
    pub lines: Vec<LineItem>,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TenantScoped)]
#[tenancy(tenant_col = "tenant_id")]
pub struct Invoice {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub customer_id: Uuid,
    pub work_order_id: Option<Uuid>,
    pub lines: Vec<LineItem>,
    pub paid: bool,
}

impl Invoice {
    #[must_use]
    pub fn total_cents(&self) -> u64 {
        self.lines
            .iter()
            .map(|l| u64::from(l.quantity) * l.unit_price_cents)
            .sum()
    }
}
