//! Derived-value subscription: selector memoization with a value-equality
//! bail-out.
//!
//! The system cannot statically determine which paths a selector reads, so
//! the subscription listens to every change and suppresses re-renders by
//! comparing the freshly computed value against the stored one. The
//! comparison is deep structural equality over plain data: O(size of the
//! derived value) per notification, and derived values must not contain
//! cycles or non-comparable resources.

use crate::registry::{generate_unique_id, Registry};
use crate::types::{
    ChangeCallback, ChangeNotification, ContainerId, Interest, ListenerId, ListenerRegistration,
    State,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// A live derived-value subscription.
///
/// The selector is captured once at attach time and stays memoized for the
/// life of the subscription; callers must supply a selector whose behavior
/// is stable.
pub struct DerivedSubscription<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    registry: Arc<Registry>,
    container_id: ContainerId,
    listener_id: Option<ListenerId>,
    value: Arc<RwLock<T>>,
    renders: Arc<AtomicU64>,
    torn_down: Arc<AtomicBool>,
}

impl<T> DerivedSubscription<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Attach to a container and compute the initial derived value
    /// synchronously. An absent container reads as empty state.
    pub fn attach<F>(
        registry: Arc<Registry>,
        container_id: impl Into<ContainerId>,
        selector: F,
        late_invoke: bool,
    ) -> Self
    where
        F: Fn(&State) -> T + Send + Sync + 'static,
    {
        let container_id = container_id.into();
        let selector: Arc<dyn Fn(&State) -> T + Send + Sync> = Arc::new(selector);

        let initial_state = registry
            .snapshot(&container_id, true)
            .unwrap_or_default();
        let value = Arc::new(RwLock::new(selector(&initial_state)));
        let renders = Arc::new(AtomicU64::new(1));
        let torn_down = Arc::new(AtomicBool::new(false));

        let listener_id = ListenerId(generate_unique_id());
        let callback = {
            let value = Arc::clone(&value);
            let renders = Arc::clone(&renders);
            let torn_down = Arc::clone(&torn_down);
            let selector = Arc::clone(&selector);
            Arc::new(move |n: &ChangeNotification| {
                if torn_down.load(Ordering::Acquire) {
                    return;
                }
                let fresh = selector(&n.new_state);
                let mut stored = value.write();
                // Bail out unless the derived value actually differs.
                if *stored != fresh {
                    *stored = fresh;
                    renders.fetch_add(1, Ordering::Relaxed);
                }
            }) as ChangeCallback
        };

        let attached = registry.add_change_listener(ListenerRegistration {
            container_id: container_id.clone(),
            listener_id: listener_id.clone(),
            interest: Interest::all(),
            late_invoke,
            callback,
        });
        let listener_id = match attached {
            Ok(()) => Some(listener_id),
            Err(e) => {
                warn!(container = %container_id, error = %e, "derived subscription attached without listener");
                None
            }
        };

        Self {
            registry,
            container_id,
            listener_id,
            value,
            renders,
            torn_down,
        }
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    /// Current derived value.
    pub fn get(&self) -> T {
        self.value.read().clone()
    }

    /// Zero-argument accessor, decoupling subscription setup from value
    /// retrieval so the read can happen at a chosen point.
    pub fn accessor(&self) -> impl Fn() -> T + Send + Sync + 'static {
        let value = Arc::clone(&self.value);
        move || value.read().clone()
    }

    /// How many times the stored value has advanced, counting the initial
    /// synchronous computation.
    pub fn renders(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }

    /// Detach: set the torn-down flag first, then unregister the listener.
    pub fn detach(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(listener_id) = &self.listener_id {
            debug!(container = %self.container_id, listener = %listener_id, "derived subscription detached");
            self.registry
                .remove_change_listener(&self.container_id, listener_id);
        }
    }
}

impl<T> Drop for DerivedSubscription<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegisterContainer;
    use crate::types::{state_from, Action, Reducer};
    use serde_json::json;

    fn merge_reducer() -> Reducer {
        Arc::new(|state: &State, action: &Action| {
            let mut next = state.clone();
            if action.name == "set" {
                if let Some(obj) = action.payload.as_object() {
                    for (k, v) in obj {
                        next.insert(k.clone(), v.clone());
                    }
                }
            }
            next
        })
    }

    fn setup(registry: &Arc<Registry>, id: &str) -> ContainerId {
        let container_id = ContainerId::from(id);
        registry
            .register(RegisterContainer::new(
                container_id.clone(),
                state_from(json!({ "header": { "mana": 1000, "score": 500 } })),
                merge_reducer(),
            ))
            .unwrap();
        container_id
    }

    fn mana_selector(state: &State) -> i64 {
        state
            .get("header")
            .and_then(|h| h.get("mana"))
            .and_then(|m| m.as_i64())
            .unwrap_or(0)
    }

    fn set(registry: &Registry, id: &ContainerId, payload: serde_json::Value) {
        registry.dispatch(id, Action::new("set", payload)).unwrap();
        registry.drain_queue(id).unwrap();
    }

    #[test]
    fn test_initial_value_computed_synchronously() {
        let registry = Arc::new(Registry::new());
        let id = setup(&registry, "c1");

        let sub = DerivedSubscription::attach(registry.clone(), id, mana_selector, true);
        assert_eq!(sub.get(), 1000);
        assert_eq!(sub.renders(), 1);
    }

    #[test]
    fn test_updates_when_derived_value_changes() {
        let registry = Arc::new(Registry::new());
        let id = setup(&registry, "c1");
        let sub = DerivedSubscription::attach(registry.clone(), id.clone(), mana_selector, true);

        set(&registry, &id, json!({ "header": { "mana": 900, "score": 500 } }));
        assert_eq!(sub.get(), 900);
        assert_eq!(sub.renders(), 2);
    }

    #[test]
    fn test_bails_out_when_derived_value_is_equal() {
        let registry = Arc::new(Registry::new());
        let id = setup(&registry, "c1");
        let sub = DerivedSubscription::attach(registry.clone(), id.clone(), mana_selector, true);

        // The slice this selector reads is untouched; the notification still
        // arrives (wildcard listener) but the stored value must not advance.
        set(&registry, &id, json!({ "header": { "mana": 1000, "score": 9 } }));
        assert_eq!(sub.get(), 1000);
        assert_eq!(sub.renders(), 1);
    }

    #[test]
    fn test_absent_container_reads_as_empty_state() {
        let registry = Arc::new(Registry::new());
        let sub =
            DerivedSubscription::attach(registry.clone(), "missing", mana_selector, true);
        assert_eq!(sub.get(), 0);
        assert!(sub.listener_id.is_none());
    }

    #[test]
    fn test_accessor_reads_latest_value() {
        let registry = Arc::new(Registry::new());
        let id = setup(&registry, "c1");
        let sub = DerivedSubscription::attach(registry.clone(), id.clone(), mana_selector, true);

        let read_mana = sub.accessor();
        assert_eq!(read_mana(), 1000);

        set(&registry, &id, json!({ "header": { "mana": 250, "score": 500 } }));
        assert_eq!(read_mana(), 250);
    }

    #[test]
    fn test_detach_stops_updates() {
        let registry = Arc::new(Registry::new());
        let id = setup(&registry, "c1");
        let sub = DerivedSubscription::attach(registry.clone(), id.clone(), mana_selector, true);

        sub.detach();
        assert_eq!(registry.listener_count(&id), 0);

        set(&registry, &id, json!({ "header": { "mana": 1, "score": 500 } }));
        assert_eq!(sub.get(), 1000);
        assert_eq!(sub.renders(), 1);
    }

    #[test]
    fn test_structural_equality_over_composite_values() {
        let registry = Arc::new(Registry::new());
        let id = setup(&registry, "c1");

        // Selector returning a composite: equality must be structural.
        let sub = DerivedSubscription::attach(
            registry.clone(),
            id.clone(),
            |state: &State| state.get("header").cloned().unwrap_or(serde_json::Value::Null),
            true,
        );
        assert_eq!(sub.renders(), 1);

        // Rewrite the header with identical contents: equal structure, no
        // advance.
        set(&registry, &id, json!({ "header": { "mana": 1000, "score": 500 } }));
        assert_eq!(sub.renders(), 1);

        set(&registry, &id, json!({ "header": { "mana": 999, "score": 500 } }));
        assert_eq!(sub.renders(), 2);
    }
}
