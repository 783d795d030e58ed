//! Invalidation/change notifications (observer mechanics only).
//!
//! Membership and policy mutations invalidate their own caches synchronously;
//! this bus exists so *dependents* (session caches, search indexers, admin
//! consoles) can observe changes without the security core knowing about
//! them. Delivery is best-effort broadcast; consumers must tolerate
//! duplicates and must not rely on the bus for cache correctness.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::id::{PrincipalId, ResourceId};

/// Direction of a membership edge change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    Added,
    Removed,
}

/// Change notifications emitted by the security core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityNotification {
    /// A direct membership edge was added or removed.
    MembershipChanged {
        group: PrincipalId,
        member: PrincipalId,
        change: MembershipChange,
    },
    /// A resource's policy was saved (assignments replaced).
    PolicyChanged { resource: ResourceId },
    /// A resource's policy was deleted; it reverts to inherited behavior.
    PolicyDeleted { resource: ResourceId },
    /// A principal (group) was deleted along with its edges and assignments.
    PrincipalDeleted { principal: PrincipalId },
}

/// A subscription to a notification stream.
///
/// Designed for single-threaded consumption; each subscription receives a
/// copy of every notification published after it was created.
#[derive(Debug)]
pub struct Subscription<M = SecurityNotification> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next notification is available.
    pub fn recv(&self) -> Result<M, mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a notification without blocking.
    pub fn try_recv(&self) -> Result<M, mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a notification.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently queued.
    pub fn drain(&self) -> Vec<M> {
        let mut out = Vec::new();
        while let Ok(m) = self.receiver.try_recv() {
            out.push(m);
        }
        out
    }
}

/// In-process broadcast bus.
///
/// - No IO / no async
/// - Best-effort fan-out; dead subscribers are pruned on publish
#[derive(Debug)]
pub struct NotificationBus<M = SecurityNotification> {
    subscribers: Mutex<Vec<mpsc::Sender<M>>>,
}

impl<M> NotificationBus<M> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<M> Default for NotificationBus<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl<M: Clone + Send + 'static> NotificationBus<M> {
    /// Broadcast to all live subscribers, dropping any that disconnected.
    pub fn publish(&self, message: M) {
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subs.retain(|tx| tx.send(message.clone()).is_ok());
    }

    pub fn subscribe(&self) -> Subscription<M> {
        let (tx, rx) = mpsc::channel();
        let mut subs = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subs.push(tx);
        Subscription::new(rx)
    }
}
