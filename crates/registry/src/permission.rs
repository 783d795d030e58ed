//! Permission marker types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// An atomic capability marker.
///
/// Permissions carry no state; resolution never grants a permission that is
/// not present in some role's permission set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Insert,
    Update,
    Delete,
    Admin,
}

/// Set of granted permissions (ordered for deterministic iteration).
pub type PermissionSet = BTreeSet<Permission>;

impl Permission {
    pub const ALL: [Permission; 5] = [
        Permission::Read,
        Permission::Insert,
        Permission::Update,
        Permission::Delete,
        Permission::Admin,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Insert => "insert",
            Permission::Update => "update",
            Permission::Delete => "delete",
            Permission::Admin => "admin",
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}
