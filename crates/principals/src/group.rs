//! Groups, including the fixed system groups.

use serde::{Deserialize, Serialize};

use palisade_core::{ContainerId, PrincipalId};

use crate::principal::{Principal, PrincipalType};

/// A principal of type GROUP.
///
/// System groups (Administrators, Users, Guests, Developers) occupy fixed
/// negative ids. They cannot be deleted or renamed, cannot be members of any
/// group, and never accept group members; Guests and Users accept no
/// explicit members at all (their membership is implicit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: PrincipalId,
    pub name: String,
    /// Owning container; `None` means site-wide/global.
    pub container: Option<ContainerId>,
}

impl Group {
    pub fn administrators() -> Self {
        Self {
            id: PrincipalId::ADMINISTRATORS,
            name: "Administrators".to_string(),
            container: None,
        }
    }

    pub fn users() -> Self {
        Self {
            id: PrincipalId::USERS,
            name: "Users".to_string(),
            container: None,
        }
    }

    pub fn guests() -> Self {
        Self {
            id: PrincipalId::GUESTS,
            name: "Guests".to_string(),
            container: None,
        }
    }

    pub fn developers() -> Self {
        Self {
            id: PrincipalId::DEVELOPERS,
            name: "Developers".to_string(),
            container: None,
        }
    }

    pub fn is_system(&self) -> bool {
        self.id.is_system_group()
    }

    /// Site-wide groups may be members of any group; project-scoped groups
    /// only of groups in the same project.
    pub fn is_site_scoped(&self) -> bool {
        self.container.is_none()
    }

    pub fn as_principal(&self) -> Principal {
        Principal {
            id: self.id,
            name: self.name.clone(),
            kind: PrincipalType::Group,
            container: self.container,
            active: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_groups_are_site_scoped() {
        for g in [
            Group::administrators(),
            Group::users(),
            Group::guests(),
            Group::developers(),
        ] {
            assert!(g.is_system());
            assert!(g.is_site_scoped());
        }
    }

    #[test]
    fn project_group_is_not_system() {
        let g = Group {
            id: PrincipalId::new(1001),
            name: "Analysts".to_string(),
            container: Some(ContainerId::new()),
        };
        assert!(!g.is_system());
        assert!(!g.is_site_scoped());
        assert!(g.as_principal().is_group());
    }
}
