//! Principal: anything that can be a policy target or a membership node.

use serde::{Deserialize, Serialize};

use palisade_core::{ContainerId, PrincipalId};

/// Kind tag of a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalType {
    User,
    Group,
    Role,
    Module,
    Service,
}

impl PrincipalType {
    /// Single-character code as stored in the principals table.
    pub fn code(&self) -> char {
        match self {
            PrincipalType::User => 'u',
            PrincipalType::Group => 'g',
            PrincipalType::Role => 'r',
            PrincipalType::Module => 'm',
            PrincipalType::Service => 's',
        }
    }
}

/// An entity that can hold role assignments and participate in the
/// membership graph.
///
/// Values handed out by the store are defensive copies; callers never share
/// mutable state through them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub name: String,
    pub kind: PrincipalType,
    /// Owning container; `None` means site-wide.
    pub container: Option<ContainerId>,
    pub active: bool,
}

impl Principal {
    pub fn is_group(&self) -> bool {
        matches!(self.kind, PrincipalType::Group)
    }

    pub fn is_user(&self) -> bool {
        matches!(self.kind, PrincipalType::User)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_codes_are_distinct() {
        let codes = [
            PrincipalType::User,
            PrincipalType::Group,
            PrincipalType::Role,
            PrincipalType::Module,
            PrincipalType::Service,
        ]
        .map(|t| t.code());
        let set: std::collections::BTreeSet<char> = codes.into_iter().collect();
        assert_eq!(set.len(), codes.len());
    }
}
