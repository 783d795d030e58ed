//! Error taxonomy for the authorization core.

use thiserror::Error;

/// Result type used across the authorization core.
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Security-model error.
///
/// Mutating APIs (membership and policy changes) propagate these to the
/// caller. The resolution path never surfaces them to end users; lookup
/// failures there collapse into "no permission granted".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// A membership or policy invariant was violated (self-membership,
    /// system-group rules, scope mismatch, cycle, duplicate edge).
    /// Rejected before any mutation is applied.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Optimistic-concurrency mismatch on policy save. The caller must
    /// reload and retry; the stale write is never applied.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Attempt to change a privileged role assignment without elevated
    /// rights. Rejected before persistence.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Operation referenced a nonexistent group, resource, or principal.
    #[error("not found: {0}")]
    NotFound(String),

    /// Registry misuse (e.g. querying an unregistered permission). The
    /// resolution path degrades to "not granted" instead of raising this.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SecurityError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
