//! `palisade-audit`: the audit collaborator boundary.
//!
//! The security core emits one event per effective role-assignment change
//! (never duplicated for a no-op save). Delivery, retention and formatting
//! are the collaborator's concern; this crate only defines the stream.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use palisade_core::{PrincipalId, ResourceId};
use palisade_registry::Role;

/// Whether an assignment appeared or disappeared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
}

/// One effective role-assignment change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub acting_user: PrincipalId,
    pub resource: ResourceId,
    pub principal: PrincipalId,
    pub role: Role,
    pub change: ChangeKind,
    pub at: DateTime<Utc>,
}

/// Consumer of the audit stream.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Sink that emits one structured log line per event.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "palisade::audit",
            acting_user = %event.acting_user,
            resource = %event.resource,
            principal = %event.principal,
            role = %event.role,
            change = ?event.change,
            "role assignment changed"
        );
    }
}

/// Capturing sink for tests.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
