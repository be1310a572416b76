//! Liveness and readiness flags.
//!
//! Kubernetes asks two questions. podlab answers whatever you told it to.
//!
//! | Probe | Path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/ready` | Can the pod serve traffic? Failure → pulled from endpoints. |
//!
//! Both flags start `true` and can be flipped at runtime. The shutdown
//! sequencer holds a clone and forces readiness off when termination starts.
//!
//! The flags are relaxed atomics with no lock around read-then-respond. A
//! probe racing a toggle may report the old value; the next probe sees the
//! new one. Probes are eventually consistent signals anyway.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared liveness/readiness flags. Clones share the same flags.
#[derive(Debug, Clone)]
pub struct HealthState {
    inner: Arc<Flags>,
}

#[derive(Debug)]
struct Flags {
    alive: AtomicBool,
    ready: AtomicBool,
}

impl HealthState {
    /// Alive and ready.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Flags {
                alive: AtomicBool::new(true),
                ready: AtomicBool::new(true),
            }),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::Relaxed)
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Relaxed)
    }

    /// Flips liveness and returns the new value.
    pub fn toggle_alive(&self) -> bool {
        !self.inner.alive.fetch_xor(true, Ordering::Relaxed)
    }

    /// Flips readiness and returns the new value.
    pub fn toggle_ready(&self) -> bool {
        !self.inner.ready.fetch_xor(true, Ordering::Relaxed)
    }

    /// Marks the pod not ready, regardless of the current value.
    ///
    /// Called at the start of shutdown so the endpoints controller stops
    /// routing new requests here before the listener closes.
    pub fn force_unready(&self) {
        self.inner.ready.store(false, Ordering::Relaxed);
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_alive_and_ready() {
        let health = HealthState::new();
        assert!(health.is_alive());
        assert!(health.is_ready());
    }

    #[test]
    fn toggle_returns_new_value() {
        let health = HealthState::new();
        assert!(!health.toggle_alive());
        assert!(!health.is_alive());
        assert!(health.toggle_alive());
        assert!(health.is_alive());
    }

    #[test]
    fn toggle_ready_twice_restores_original() {
        let health = HealthState::new();
        let before = health.is_ready();
        health.toggle_ready();
        health.toggle_ready();
        assert_eq!(health.is_ready(), before);
    }

    #[test]
    fn force_unready_is_idempotent_and_leaves_liveness_alone() {
        let health = HealthState::new();
        health.force_unready();
        health.force_unready();
        assert!(!health.is_ready());
        assert!(health.is_alive());
    }

    #[test]
    fn clones_share_flags() {
        let health = HealthState::new();
        let probe_view = health.clone();
        health.toggle_ready();
        assert!(!probe_view.is_ready());
    }
}
