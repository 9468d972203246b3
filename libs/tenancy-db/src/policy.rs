//! Fail-safe policy applied to every operation.
//!
//! ```text
//!   Bypassed                      (token attached, audited)
//!   Unscoped                      (unrestricted or not in the manifest)
//!   ScopedContextPresent  ->  tenant predicate / payload enforced
//!   ScopedContextAbsent   ->  Rejected (terminal)
//! ```

use serde::Serialize;

use crate::registry::Coverage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopingState {
    Unscoped,
    Bypassed,
    ScopedContextPresent,
    ScopedContextAbsent,
    Rejected,
}

impl ScopingState {
    /// Initial state of an operation, decided before any rewriting.
    #[must_use]
    pub fn classify(coverage: &Coverage<'_>, has_bypass: bool, context_present: bool) -> Self {
        if has_bypass {
            return Self::Bypassed;
        }
        match coverage {
            Coverage::Scoped(_) if context_present => Self::ScopedContextPresent,
            Coverage::Scoped(_) => Self::ScopedContextAbsent,
            Coverage::Unrestricted(_) | Coverage::Unknown => Self::Unscoped,
        }
    }

    /// The state an operation moves to; states other than
    /// `ScopedContextAbsent` are final.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::ScopedContextAbsent => Self::Rejected,
            other => other,
        }
    }

    /// `true` once no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self.next() == self
    }

    /// Operations in this state may be forwarded to storage.
    #[must_use]
    pub fn admits(self) -> bool {
        matches!(self, Self::Unscoped | Self::Bypassed | Self::ScopedContextPresent)
    }
}
