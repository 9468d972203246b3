//! The only data-access entry point handed to service code.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ScopeError, StorageError};
use crate::interceptor::{QueryInterceptor, ScopedOperation};
use crate::operation::{Filter, Operation, OperationKind, Record};
use crate::registry::ScopedModel;

/// Result of executing one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Row(Option<Record>),
    Rows(Vec<Record>),
    Created(Record),
    Affected(u64),
}

impl Outcome {
    fn unexpected(kind: OperationKind) -> StorageError {
        StorageError::UnexpectedOutcome { kind }
    }

    /// # Errors
    /// [`StorageError::UnexpectedOutcome`] if this is not a `Row`.
    pub fn into_row(self, kind: OperationKind) -> Result<Option<Record>, StorageError> {
        match self {
            Self::Row(row) => Ok(row),
            _ => Err(Self::unexpected(kind)),
        }
    }

    /// # Errors
    /// [`StorageError::UnexpectedOutcome`] if this is not `Rows`.
    pub fn into_rows(self, kind: OperationKind) -> Result<Vec<Record>, StorageError> {
        match self {
            Self::Rows(rows) => Ok(rows),
            _ => Err(Self::unexpected(kind)),
        }
    }

    /// # Errors
    /// [`StorageError::UnexpectedOutcome`] if this is not `Created`.
    pub fn into_created(self, kind: OperationKind) -> Result<Record, StorageError> {
        match self {
            Self::Created(row) => Ok(row),
            _ => Err(Self::unexpected(kind)),
        }
    }

    /// # Errors
    /// [`StorageError::UnexpectedOutcome`] if this is not `Affected`.
    pub fn into_affected(self, kind: OperationKind) -> Result<u64, StorageError> {
        match self {
            Self::Affected(n) => Ok(n),
            _ => Err(Self::unexpected(kind)),
        }
    }
}

/// Storage collaborator. Accepts only operations the interceptor admitted.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// # Errors
    /// Returns [`StorageError`] if the backend fails to execute `op`.
    async fn execute(&self, op: ScopedOperation) -> Result<Outcome, StorageError>;
}

/// Storage handle that scopes every operation before forwarding it.
///
/// ```ignore
/// let open: Vec<WorkOrder> = store.find_many::<WorkOrder>(Filter::eq("status", "open")).await?;
/// store.delete::<WorkOrder>(id).await?; // NotFound if the row is not this tenant's
/// ```
pub struct ScopedStore<D> {
    interceptor: Arc<QueryInterceptor>,
    driver: Arc<D>,
}

impl<D> Clone for ScopedStore<D> {
    fn clone(&self) -> Self {
        Self {
            interceptor: Arc::clone(&self.interceptor),
            driver: Arc::clone(&self.driver),
        }
    }
}

impl<D> fmt::Debug for ScopedStore<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedStore")
            .field("interceptor", &self.interceptor)
            .finish_non_exhaustive()
    }
}

impl<D: StorageDriver> ScopedStore<D> {
    #[must_use]
    pub fn new(interceptor: Arc<QueryInterceptor>, driver: Arc<D>) -> Self {
        Self { interceptor, driver }
    }

    #[must_use]
    pub fn interceptor(&self) -> &QueryInterceptor {
        &self.interceptor
    }

    #[must_use]
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Scopes and forwards one operation.
    ///
    /// A by-id `Update`/`Delete` that affects no row is reported as
    /// [`ScopeError::NotFound`], whether the row is missing or belongs to
    /// another tenant.
    ///
    /// # Errors
    /// Any [`ScopeError`] from interception (storage is not called), or a
    /// storage failure.
    pub async fn execute(&self, op: Operation) -> Result<Outcome, ScopeError> {
        let scoped = self.interceptor.intercept(op)?;
        let kind = scoped.kind();
        let model = scoped.target().to_string();

        let outcome = self.driver.execute(scoped).await?;

        if kind.is_by_id() && outcome == Outcome::Affected(0) {
            tracing::debug!(model = %model, kind = %kind, "by-id mutation matched no row in scope");
            return Err(ScopeError::NotFound { model });
        }
        Ok(outcome)
    }

    /// # Errors
    /// See [`Self::execute`]; also fails if the row does not decode as `M`.
    pub async fn find_one<M>(&self, filter: Filter) -> Result<Option<M>, ScopeError>
    where
        M: ScopedModel + DeserializeOwned,
    {
        let row = self
            .execute(Operation::read_one::<M>(filter))
            .await?
            .into_row(OperationKind::ReadOne)?;
        row.map(decode).transpose()
    }

    /// # Errors
    /// See [`Self::execute`]; also fails if a row does not decode as `M`.
    pub async fn find_many<M>(&self, filter: Filter) -> Result<Vec<M>, ScopeError>
    where
        M: ScopedModel + DeserializeOwned,
    {
        self.execute(Operation::read_many::<M>(filter))
            .await?
            .into_rows(OperationKind::ReadMany)?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Persists `model` and returns the row as stored, tenant stamped.
    ///
    /// # Errors
    /// See [`Self::execute`].
    pub async fn create<M>(&self, model: &M) -> Result<M, ScopeError>
    where
        M: ScopedModel + Serialize + DeserializeOwned,
    {
        let created = self
            .execute(Operation::create::<M>(encode(model)?))
            .await?
            .into_created(OperationKind::Create)?;
        decode(created)
    }

    /// # Errors
    /// [`ScopeError::NotFound`] if no row with `id` exists in scope.
    pub async fn update<M: ScopedModel>(&self, id: impl Into<Value>, patch: Record) -> Result<(), ScopeError> {
        self.execute(Operation::update::<M>(id, patch)).await.map(drop)
    }

    /// Returns the number of rows updated.
    ///
    /// # Errors
    /// See [`Self::execute`].
    pub async fn update_many<M: ScopedModel>(&self, filter: Filter, patch: Record) -> Result<u64, ScopeError> {
        let affected = self
            .execute(Operation::update_many::<M>(filter, patch))
            .await?
            .into_affected(OperationKind::UpdateMany)?;
        Ok(affected)
    }

    /// # Errors
    /// [`ScopeError::NotFound`] if no row with `id` exists in scope.
    pub async fn delete<M: ScopedModel>(&self, id: impl Into<Value>) -> Result<(), ScopeError> {
        self.execute(Operation::delete::<M>(id)).await.map(drop)
    }

    /// Returns the number of rows deleted.
    ///
    /// # Errors
    /// See [`Self::execute`].
    pub async fn delete_many<M: ScopedModel>(&self, filter: Filter) -> Result<u64, ScopeError> {
        let affected = self
            .execute(Operation::delete_many::<M>(filter))
            .await?
            .into_affected(OperationKind::DeleteMany)?;
        Ok(affected)
    }
}

fn encode<M: Serialize>(model: &M) -> Result<Record, ScopeError> {
    let value = serde_json::to_value(model).map_err(StorageError::from)?;
    serde_json::from_value(value).map_err(|e| StorageError::from(e).into())
}

fn decode<M: DeserializeOwned>(row: Record) -> Result<M, ScopeError> {
    serde_json::from_value(Value::Object(row)).map_err(|e| StorageError::from(e).into())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn outcome_shape_mismatch_is_reported() {
        let err = Outcome::Affected(1).into_rows(OperationKind::ReadMany).unwrap_err();
        assert!(matches!(err, StorageError::UnexpectedOutcome { kind: OperationKind::ReadMany }));
        assert_eq!(Outcome::Affected(2).into_affected(OperationKind::DeleteMany).unwrap(), 2);
    }
}
