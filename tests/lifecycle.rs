//! Integration tests for lifecycle edge cases: the diagnostic double
//! mount/unmount pass and detach racing an in-flight burst.

use parking_lot::Mutex;
use serde_json::json;
use statebridge::{
    state_from, Action, ContainerId, Interest, LifecycleGuard, PathSubscription, Reducer,
    Registry, RootBinder, RootBinderArgs, State, SubscribeOptions,
};
use std::sync::Arc;

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

fn mount_binder(registry: &Arc<Registry>, container_id: &str) -> RootBinder {
    RootBinder::mount(
        registry.clone(),
        LifecycleGuard::new(registry.clone(), true),
        RootBinderArgs::new(state_from(json!({ "sum": 0 })), merge_reducer())
            .with_container_id(container_id),
    )
    .expect("mount")
}

fn set_sum(registry: &Registry, id: &ContainerId, sum: i64) {
    registry
        .dispatch(id, Action::new("set", json!({ "sum": sum })))
        .expect("dispatch");
    registry.drain_queue(id).expect("drain");
}

// --- Double-Invoke Resilience ---

#[test]
fn double_invoke_leaves_one_registration_and_one_listener() {
    let registry = Arc::new(Registry::new());

    // First (throwaway) mount: render registers, effects attach.
    let binder = mount_binder(&registry, "strict");
    let ctx = binder.context();
    let sub = PathSubscription::attach(&ctx, Interest::path("sum"), SubscribeOptions::default())
        .expect("attach");

    // Throwaway unmount: effect cleanups run bottom-up.
    sub.detach();
    drop(sub);
    binder.unmount();
    assert!(!registry.is_registered(binder.container_id()));

    // Real mount: the subscription attaches first and finds the container
    // gone, so it triggers re-registration through the context before
    // attaching its listener.
    let sub = PathSubscription::attach(&ctx, Interest::path("sum"), SubscribeOptions::default())
        .expect("attach");
    binder.render();

    assert!(registry.is_registered(binder.container_id()));
    assert_eq!(registry.listener_count(binder.container_id()), 1);
    assert_eq!(sub.current().get("sum"), Some(&json!(0)));

    // One subsequent action delivers exactly one update, no duplicates.
    set_sum(&registry, binder.container_id(), 12);
    assert_eq!(sub.current().get("sum"), Some(&json!(12)));
    assert_eq!(sub.renders(), 2);
}

#[test]
fn binder_render_alone_heals_lost_registration() {
    let registry = Arc::new(Registry::new());
    let binder = mount_binder(&registry, "strict");

    binder.unmount();
    binder.render();

    assert!(registry.is_registered(binder.container_id()));
    let state = registry
        .snapshot(binder.container_id(), false)
        .expect("snapshot");
    assert_eq!(state.get("sum"), Some(&json!(0)));
}

#[test]
fn final_teardown_drops_everything() {
    let registry = Arc::new(Registry::new());
    let id;
    {
        let binder = mount_binder(&registry, "strict");
        id = binder.container_id().clone();
        let _sub =
            PathSubscription::attach(&binder.context(), Interest::all(), SubscribeOptions::default())
                .expect("attach");
        assert_eq!(registry.listener_count(&id), 1);
    }
    // Binder and subscription both dropped: nothing survives.
    assert!(!registry.is_registered(&id));
    assert_eq!(registry.listener_count(&id), 0);
}

// --- Unmount Race Safety ---

#[test]
fn detach_before_drain_delivers_nothing() {
    let registry = Arc::new(Registry::new());
    let binder = mount_binder(&registry, "race");
    let sub = PathSubscription::attach(
        &binder.context(),
        Interest::all(),
        SubscribeOptions::default(),
    )
    .expect("attach");

    // Actions are in flight (queued) at the moment of detach.
    let dispatcher = binder.dispatcher();
    for i in 0..5 {
        dispatcher
            .dispatch(Action::new("set", json!({ "sum": i })))
            .expect("dispatch");
    }
    sub.detach();
    dispatcher.drain().expect("drain");

    // Zero callback invocations after detach completed.
    assert_eq!(sub.renders(), 1);
    assert_eq!(sub.current().get("sum"), Some(&json!(0)));
}

#[test]
fn self_detach_mid_burst_stops_further_deliveries() {
    let registry = Arc::new(Registry::new());
    let binder = mount_binder(&registry, "race");

    // The subscription tears itself down from its own observer on the first
    // delivery; later actions in the same burst must not reach it.
    let slot: Arc<Mutex<Option<PathSubscription>>> = Arc::new(Mutex::new(None));
    let trigger = Arc::clone(&slot);
    let sub = PathSubscription::attach(
        &binder.context(),
        Interest::all(),
        SubscribeOptions::default()
            .immediate()
            .with_observer(Arc::new(move |_n| {
                if let Some(sub) = trigger.lock().as_ref() {
                    sub.detach();
                }
            })),
    )
    .expect("attach");

    let renders = {
        let dispatcher = binder.dispatcher();
        for i in 1..=3 {
            dispatcher
                .dispatch(Action::new("set", json!({ "sum": i })))
                .expect("dispatch");
        }
        *slot.lock() = Some(sub);
        dispatcher.drain().expect("drain");
        let guard = slot.lock();
        let sub = guard.as_ref().expect("sub");
        assert_eq!(sub.current().get("sum"), Some(&json!(1)));
        sub.renders()
    };

    // Initial read plus the single delivery that ran the detach.
    assert_eq!(renders, 2);
    assert_eq!(registry.listener_count(binder.container_id()), 0);
}

#[test]
fn reattach_after_detach_gets_fresh_identity() {
    let registry = Arc::new(Registry::new());
    let binder = mount_binder(&registry, "rebirth");
    let ctx = binder.context();

    let first = PathSubscription::attach(&ctx, Interest::all(), SubscribeOptions::default())
        .expect("attach");
    let first_id = first.listener_id().expect("listener").clone();
    first.detach();

    let second = PathSubscription::attach(&ctx, Interest::all(), SubscribeOptions::default())
        .expect("attach");
    let second_id = second.listener_id().expect("listener").clone();

    // Reborn subscription, fresh identity, exactly one live listener.
    assert_ne!(first_id, second_id);
    assert_eq!(registry.listener_count(binder.container_id()), 1);
}
