//! The live permission registry.
//!
//! Permission checks run on every request, so registry misuse (querying a
//! permission that was never registered) must degrade to "not granted"
//! instead of failing the request. The degraded path warns at most once per
//! hour per permission.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::warn;

use crate::permission::{Permission, PermissionSet};
use crate::role::Role;

/// Catalog of permissions live in this deployment.
///
/// Test instances can be constructed with holes to exercise the
/// unregistered-permission path.
pub struct Registry {
    registered: PermissionSet,
    warned: Mutex<HashMap<Permission, Instant>>,
    warn_interval: Duration,
}

impl Registry {
    const WARN_INTERVAL: Duration = Duration::from_secs(60 * 60);

    /// Registry with every known permission registered.
    pub fn with_defaults() -> Self {
        Self {
            registered: Permission::ALL.into_iter().collect(),
            warned: Mutex::new(HashMap::new()),
            warn_interval: Self::WARN_INTERVAL,
        }
    }

    /// Registry missing `permission`, for exercising the degraded path.
    pub fn without(permission: Permission) -> Self {
        let mut r = Self::with_defaults();
        r.registered.remove(&permission);
        r
    }

    pub fn is_registered(&self, permission: Permission) -> bool {
        self.registered.contains(&permission)
    }

    /// Check registration, warning (rate-limited) when the permission is
    /// unknown. Callers treat an unregistered permission as never granted.
    pub fn check_registered(&self, permission: Permission) -> bool {
        if self.is_registered(permission) {
            return true;
        }

        let now = Instant::now();
        let mut warned = self.warned.lock().unwrap_or_else(PoisonError::into_inner);
        let due = warned
            .get(&permission)
            .map(|last| now.duration_since(*last) >= self.warn_interval)
            .unwrap_or(true);
        if due {
            warned.insert(permission, now);
            warn!(
                permission = permission.name(),
                "permission check against unregistered permission; treating as not granted"
            );
        }
        false
    }

    /// Roles that may appear in resource policies.
    pub fn assignable_roles(&self) -> Vec<Role> {
        Role::ALL.into_iter().filter(Role::is_assignable).collect()
    }

    pub fn role_by_name(&self, name: &str) -> Option<Role> {
        Role::by_name(name)
    }

    #[cfg(test)]
    fn with_warn_interval(mut self, interval: Duration) -> Self {
        self.warn_interval = interval;
        self
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
