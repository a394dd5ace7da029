//! Detection of container registrations lost to a double mount/unmount pass.
//!
//! Some host frameworks deliberately run a component through
//! mount -> unmount -> mount as a diagnostic. The throwaway unmount runs the
//! container's cleanup, unregistering it, which would leave the second (real)
//! mount with no backing container. The guard reports when that has happened
//! so the binder can re-register.

use crate::registry::Registry;
use crate::types::ContainerId;
use std::sync::Arc;

/// Answers "is container X currently live?".
///
/// Injected into the guard rather than sniffing host-framework versions, so
/// the recovery logic is testable in isolation.
pub trait LivenessOracle: Send + Sync {
    fn is_live(&self, container_id: &ContainerId) -> bool;
}

impl LivenessOracle for Registry {
    fn is_live(&self, container_id: &ContainerId) -> bool {
        self.is_registered(container_id)
    }
}

/// Decides whether a container needs re-registration after a double-invoke
/// teardown.
#[derive(Clone)]
pub struct LifecycleGuard {
    oracle: Arc<dyn LivenessOracle>,
    /// Whether the host framework runs the diagnostic double-invoke pass.
    double_invoke_active: bool,
}

impl LifecycleGuard {
    pub fn new(oracle: Arc<dyn LivenessOracle>, double_invoke_active: bool) -> Self {
        Self {
            oracle,
            double_invoke_active,
        }
    }

    /// True only when the double-invoke pass is active AND the container is
    /// not presently live. Runs on every commit-phase effect, so it must
    /// stay cheap: one flag check and one map lookup, no allocation.
    pub fn needs_re_registration(&self, container_id: &ContainerId) -> bool {
        self.double_invoke_active && !self.oracle.is_live(container_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::RwLock;
    use std::collections::HashSet;

    struct StubOracle {
        live: RwLock<HashSet<String>>,
    }

    impl StubOracle {
        fn with(ids: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                live: RwLock::new(ids.iter().map(|s| s.to_string()).collect()),
            })
        }
    }

    impl LivenessOracle for StubOracle {
        fn is_live(&self, container_id: &ContainerId) -> bool {
            self.live.read().contains(container_id.as_str())
        }
    }

    #[test]
    fn test_requires_both_conditions() {
        let id = ContainerId::from("c1");

        let dead = LifecycleGuard::new(StubOracle::with(&[]), true);
        assert!(dead.needs_re_registration(&id));

        let live = LifecycleGuard::new(StubOracle::with(&["c1"]), true);
        assert!(!live.needs_re_registration(&id));

        let no_double_invoke = LifecycleGuard::new(StubOracle::with(&[]), false);
        assert!(!no_double_invoke.needs_re_registration(&id));
    }

    #[test]
    fn test_registry_is_an_oracle() {
        let registry = Arc::new(Registry::new());
        let guard = LifecycleGuard::new(registry.clone(), true);
        assert!(guard.needs_re_registration(&ContainerId::from("missing")));
    }
}
