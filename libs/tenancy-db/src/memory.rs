//! Reference [`StorageDriver`] keeping tables in process memory.
//!
//! Evaluates [`Filter`]s exactly as a SQL backend would apply the equivalent
//! `WHERE` clause. Meant for tests and local development.
//!
//! Primary keys of tenant-scoped tables are unique per tenant, like a
//! composite `(tenant, key)` unique index. A create whose key another tenant
//! already uses succeeds and tells the caller nothing about that row.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::error::StorageError;
use crate::interceptor::ScopedOperation;
use crate::operation::{Action, Filter, Record};
use crate::store::{Outcome, StorageDriver};

#[derive(Debug, Default)]
pub struct InMemoryDriver {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    calls: AtomicU64,
}

impl InMemoryDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts rows directly, outside any scoping. Test and dev setup only.
    pub fn seed(&self, model: &str, rows: impl IntoIterator<Item = Record>) {
        self.tables
            .write()
            .entry(model.to_owned())
            .or_default()
            .extend(rows);
    }

    /// Snapshot of a table, unscoped.
    #[must_use]
    pub fn rows(&self, model: &str) -> Vec<Record> {
        self.tables.read().get(model).cloned().unwrap_or_default()
    }

    /// Number of operations this driver has executed.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn apply(&self, op: ScopedOperation) -> Result<Outcome, StorageError> {
        let pk = op.primary_key();
        let tenant_field = op.tenant_field();
        let (target, action) = op.into_parts();
        let model = target.as_str();

        let outcome = match action {
            Action::ReadOne { filter } => {
                let tables = self.tables.read();
                let row = tables
                    .get(model)
                    .and_then(|rows| rows.iter().find(|r| filter.matches(r)))
                    .cloned();
                Outcome::Row(row)
            }
            Action::ReadMany { filter } => {
                let tables = self.tables.read();
                let rows = tables.get(model).map_or_else(Vec::new, |rows| {
                    rows.iter().filter(|r| filter.matches(r)).cloned().collect()
                });
                Outcome::Rows(rows)
            }
            Action::Create { mut payload } => {
                let mut tables = self.tables.write();
                let rows = tables.entry(model.to_owned()).or_default();
                match payload.get(pk) {
                    None | Some(Value::Null) => {
                        payload.insert(pk.to_owned(), Value::String(Uuid::new_v4().to_string()));
                    }
                    Some(id) => {
                        let same_partition =
                            |r: &Record| tenant_field.is_none_or(|field| r.get(field) == payload.get(field));
                        if rows.iter().any(|r| r.get(pk) == Some(id) && same_partition(r)) {
                            return Err(StorageError::DuplicateKey {
                                model: model.to_owned(),
                            });
                        }
                    }
                }
                rows.push(payload.clone());
                Outcome::Created(payload)
            }
            Action::Update { id, filter, patch } => {
                let by_id = Filter::eq(pk, id).and(filter);
                Outcome::Affected(self.update_where(model, &by_id, &patch))
            }
            Action::UpdateMany { filter, patch } => {
                Outcome::Affected(self.update_where(model, &filter, &patch))
            }
            Action::Delete { id, filter } => {
                let by_id = Filter::eq(pk, id).and(filter);
                Outcome::Affected(self.delete_where(model, &by_id))
            }
            Action::DeleteMany { filter } => Outcome::Affected(self.delete_where(model, &filter)),
        };
        Ok(outcome)
    }

    fn update_where(&self, model: &str, filter: &Filter, patch: &Record) -> u64 {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(model) else {
            return 0;
        };
        let mut affected = 0;
        for row in rows.iter_mut().filter(|r| filter.matches(r)) {
            for (field, value) in patch {
                row.insert(field.clone(), value.clone());
            }
            affected += 1;
        }
        affected
    }

    fn delete_where(&self, model: &str, filter: &Filter) -> u64 {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(model) else {
            return 0;
        };
        let mut affected = 0;
        rows.retain(|r| {
            let hit = filter.matches(r);
            affected += u64::from(hit);
            !hit
        });
        affected
    }
}

#[async_trait]
impl StorageDriver for InMemoryDriver {
    async fn execute(&self, op: ScopedOperation) -> Result<Outcome, StorageError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(model = %op.target(), kind = %op.kind(), state = ?op.state(), "in-memory execute");
        self.apply(op)
    }
}
