//! Role domain model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A role users can be members of.
///
/// Membership is denormalized onto each holding user's `roles` set, so
/// renaming or deleting a role is a multi-row operation owned by the
/// backend (see the `RoleOps` trait).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: Option<String>,
    /// Canonicalized form of `name` used as the lookup key.
    pub normalized_name: Option<String>,
}

impl Role {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            name: None,
            normalized_name: None,
        }
    }
}
