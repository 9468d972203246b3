//! Data operations issued by service code.
//!
//! [`Operation`] is a closed set of actions. Each variant carries exactly the
//! parts that kind of operation has (predicate, payload, primary key), so the
//! interceptor's classification is an exhaustive `match`.

use std::borrow::Cow;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::bypass::BypassToken;
use crate::registry::ScopedModel;

/// A row as seen by the storage boundary.
pub type Record = serde_json::Map<String, Value>;

/// Name of the model an operation targets, as used in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelName(Cow<'static, str>);

impl ModelName {
    #[must_use]
    pub fn of<M: ScopedModel>() -> Self {
        Self(Cow::Borrowed(M::DESCRIPTOR.name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&'static str> for ModelName {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl From<String> for ModelName {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Row predicate. Closed expression tree evaluated by the storage driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Conjunction; an empty `All` matches every row.
    All(Vec<Filter>),
    /// Disjunction; an empty `Any` matches nothing.
    Any(Vec<Filter>),
    Not(Box<Filter>),
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    /// Matches every row.
    #[must_use]
    pub fn all() -> Self {
        Self::All(Vec::new())
    }

    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    #[must_use]
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne(field.into(), value.into())
    }

    #[must_use]
    pub fn is_in<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn any(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self::Any(filters.into_iter().collect())
    }

    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Conjunction of `self` and `other`. A match-all operand is dropped.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (a, b) if b.is_match_all() => a,
            (a, b) if a.is_match_all() => b,
            (Self::All(mut parts), b) => {
                parts.push(b);
                Self::All(parts)
            }
            (a, b) => Self::All(vec![a, b]),
        }
    }

    #[must_use]
    pub fn is_match_all(&self) -> bool {
        matches!(self, Self::All(parts) if parts.is_empty())
    }

    /// Evaluates the predicate against a row. Missing fields compare unequal.
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All(parts) => parts.iter().all(|p| p.matches(record)),
            Self::Any(parts) => parts.iter().any(|p| p.matches(record)),
            Self::Not(inner) => !inner.matches(record),
            Self::Eq(field, value) => record.get(field) == Some(value),
            Self::Ne(field, value) => record.get(field) != Some(value),
            Self::In(field, values) => record.get(field).is_some_and(|v| values.contains(v)),
        }
    }

    /// Returns `true` if any clause reads `field`.
    #[must_use]
    pub fn references(&self, field: &str) -> bool {
        match self {
            Self::All(parts) | Self::Any(parts) => parts.iter().any(|p| p.references(field)),
            Self::Not(inner) => inner.references(field),
            Self::Eq(f, _) | Self::Ne(f, _) | Self::In(f, _) => f == field,
        }
    }

    /// Returns `true` if some clause on `field` could select rows other than
    /// those equal to `allowed`. Only a non-negated `Eq(field, allowed)` (or an
    /// `In` listing nothing but `allowed`) is compatible.
    pub(crate) fn widens(&self, field: &str, allowed: &Value) -> bool {
        self.widens_inner(field, allowed, false)
    }

    fn widens_inner(&self, field: &str, allowed: &Value, negated: bool) -> bool {
        match self {
            Self::All(parts) | Self::Any(parts) => {
                parts.iter().any(|p| p.widens_inner(field, allowed, negated))
            }
            Self::Not(inner) => inner.widens_inner(field, allowed, !negated),
            Self::Eq(f, v) => f == field && (negated || v != allowed),
            Self::In(f, vs) => f == field && (negated || vs.iter().any(|v| v != allowed)),
            Self::Ne(f, _) => f == field,
        }
    }
}

/// Kind of data operation, used for classification and audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    ReadOne,
    ReadMany,
    Create,
    Update,
    UpdateMany,
    Delete,
    DeleteMany,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOne => "ReadOne",
            Self::ReadMany => "ReadMany",
            Self::Create => "Create",
            Self::Update => "Update",
            Self::UpdateMany => "UpdateMany",
            Self::Delete => "Delete",
            Self::DeleteMany => "DeleteMany",
        }
    }

    /// Single-row mutation addressed by primary key.
    #[must_use]
    pub fn is_by_id(self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the operation does, with the parts that kind carries.
///
/// `Update`/`Delete` address a row by primary key; their `filter` starts as
/// match-all and receives the tenant predicate during interception.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ReadOne { filter: Filter },
    ReadMany { filter: Filter },
    Create { payload: Record },
    Update { id: Value, filter: Filter, patch: Record },
    UpdateMany { filter: Filter, patch: Record },
    Delete { id: Value, filter: Filter },
    DeleteMany { filter: Filter },
}

impl Action {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::ReadOne { .. } => OperationKind::ReadOne,
            Self::ReadMany { .. } => OperationKind::ReadMany,
            Self::Create { .. } => OperationKind::Create,
            Self::Update { .. } => OperationKind::Update,
            Self::UpdateMany { .. } => OperationKind::UpdateMany,
            Self::Delete { .. } => OperationKind::Delete,
            Self::DeleteMany { .. } => OperationKind::DeleteMany,
        }
    }

    #[must_use]
    pub fn predicate(&self) -> Option<&Filter> {
        match self {
            Self::ReadOne { filter }
            | Self::ReadMany { filter }
            | Self::Update { filter, .. }
            | Self::UpdateMany { filter, .. }
            | Self::Delete { filter, .. }
            | Self::DeleteMany { filter } => Some(filter),
            Self::Create { .. } => None,
        }
    }

    /// Create payload or update patch.
    #[must_use]
    pub fn payload(&self) -> Option<&Record> {
        match self {
            Self::Create { payload } => Some(payload),
            Self::Update { patch, .. } | Self::UpdateMany { patch, .. } => Some(patch),
            Self::ReadOne { .. } | Self::ReadMany { .. } | Self::Delete { .. } | Self::DeleteMany { .. } => None,
        }
    }
}

/// Loggable summary of an operation, without row data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationDescriptor {
    pub model: String,
    pub kind: OperationKind,
}

impl fmt::Display for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.model, self.kind)
    }
}

/// One data operation against one model, built once and consumed once by
/// the interceptor.
#[derive(Debug)]
#[must_use]
pub struct Operation {
    target: ModelName,
    action: Action,
    bypass: Option<BypassToken>,
}

impl Operation {
    /// Operation against a model named at runtime.
    pub fn named(target: impl Into<ModelName>, action: Action) -> Self {
        Self {
            target: target.into(),
            action,
            bypass: None,
        }
    }

    pub fn read_one<M: ScopedModel>(filter: Filter) -> Self {
        Self::named(ModelName::of::<M>(), Action::ReadOne { filter })
    }

    pub fn read_many<M: ScopedModel>(filter: Filter) -> Self {
        Self::named(ModelName::of::<M>(), Action::ReadMany { filter })
    }

    pub fn create<M: ScopedModel>(payload: Record) -> Self {
        Self::named(ModelName::of::<M>(), Action::Create { payload })
    }

    pub fn update<M: ScopedModel>(id: impl Into<Value>, patch: Record) -> Self {
        Self::named(
            ModelName::of::<M>(),
            Action::Update {
                id: id.into(),
                filter: Filter::all(),
                patch,
            },
        )
    }

    pub fn update_many<M: ScopedModel>(filter: Filter, patch: Record) -> Self {
        Self::named(ModelName::of::<M>(), Action::UpdateMany { filter, patch })
    }

    pub fn delete<M: ScopedModel>(id: impl Into<Value>) -> Self {
        Self::named(
            ModelName::of::<M>(),
            Action::Delete {
                id: id.into(),
                filter: Filter::all(),
            },
        )
    }

    pub fn delete_many<M: ScopedModel>(filter: Filter) -> Self {
        Self::named(ModelName::of::<M>(), Action::DeleteMany { filter })
    }

    /// Attaches a bypass capability. The token is consumed with the operation.
    pub fn with_bypass(mut self, token: BypassToken) -> Self {
        self.bypass = Some(token);
        self
    }

    #[must_use]
    pub fn target(&self) -> &ModelName {
        &self.target
    }

    #[must_use]
    pub fn action(&self) -> &Action {
        &self.action
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.action.kind()
    }

    #[must_use]
    pub fn has_bypass(&self) -> bool {
        self.bypass.is_some()
    }

    #[must_use]
    pub fn describe(&self) -> OperationDescriptor {
        OperationDescriptor {
            model: self.target.to_string(),
            kind: self.kind(),
        }
    }

    pub(crate) fn into_parts(self) -> (ModelName, Action, Option<BypassToken>) {
        (self.target, self.action, self.bypass)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test rows are objects"),
        }
    }

    #[test]
    fn filter_evaluation() {
        let r = row(json!({ "id": 1, "status": "open", "priority": 3 }));

        assert!(Filter::all().matches(&r));
        assert!(!Filter::any([]).matches(&r));
        assert!(Filter::eq("status", "open").matches(&r));
        assert!(!Filter::eq("status", "closed").matches(&r));
        assert!(Filter::ne("status", "closed").matches(&r));
        assert!(Filter::is_in("priority", [1, 3]).matches(&r));
        assert!(!Filter::eq("missing", "x").matches(&r));
        assert!(Filter::eq("status", "closed").negate().matches(&r));
        assert!(
            Filter::any([Filter::eq("status", "closed"), Filter::eq("priority", 3)]).matches(&r)
        );
    }

    #[test]
    fn and_drops_match_all_and_flattens() {
        let a = Filter::eq("a", 1);
        let b = Filter::eq("b", 2);

        assert_eq!(Filter::all().and(a.clone()), a);
        assert_eq!(a.clone().and(Filter::all()), a);
        assert_eq!(
            Filter::All(vec![a.clone()]).and(b.clone()),
            Filter::All(vec![a, b])
        );
    }

    #[test]
    fn widening_detection() {
        let t1 = json!("t1");

        assert!(!Filter::eq("status", "open").widens("tenant_id", &t1));
        assert!(!Filter::eq("tenant_id", "t1").widens("tenant_id", &t1));
        assert!(!Filter::is_in("tenant_id", ["t1"]).widens("tenant_id", &t1));

        assert!(Filter::eq("tenant_id", "t2").widens("tenant_id", &t1));
        assert!(Filter::is_in("tenant_id", ["t1", "t2"]).widens("tenant_id", &t1));
        assert!(Filter::ne("tenant_id", "t1").widens("tenant_id", &t1));
        assert!(Filter::eq("tenant_id", "t1").negate().widens("tenant_id", &t1));
        assert!(
            Filter::any([Filter::eq("status", "open"), Filter::eq("tenant_id", "t2")])
                .widens("tenant_id", &t1)
        );
    }

    #[test]
    fn action_parts() {
        let update = Action::Update {
            id: json!(7),
            filter: Filter::all(),
            patch: row(json!({ "status": "closed" })),
        };
        assert_eq!(update.kind(), OperationKind::Update);
        assert!(update.kind().is_by_id());
        assert_eq!(update.predicate(), Some(&Filter::all()));
        assert_eq!(update.payload().map(Record::len), Some(1));

        let create = Action::Create { payload: Record::new() };
        assert!(create.predicate().is_none());
        assert!(!create.kind().is_by_id());
    }

    #[test]
    fn descriptor_display() {
        let op = Operation::named("WorkOrder", Action::DeleteMany { filter: Filter::all() });
        assert_eq!(op.describe().to_string(), "WorkOrder.DeleteMany");
        assert!(!op.has_bypass());
    }
}
