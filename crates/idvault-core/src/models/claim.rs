//! Claim model.

use serde::{Deserialize, Serialize};

/// A (kind, value) assertion attached to a user or role.
///
/// Claims live in companion tables keyed by the owning entity, not on the
/// entity row itself; uniqueness is the (owner, kind, value) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    pub kind: String,
    pub value: String,
}

impl Claim {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}
