//! # statebridge
//!
//! A subscription/reconciliation bridge between a view-layer component tree
//! and a key-addressed state container. Components declare interest in a
//! subset of container state (by path or by derived selector) and re-render
//! exactly when that subset changes, even when the host framework mounts and
//! unmounts the same logical component twice in rapid succession.
//!
//! ## Core Concepts
//!
//! - **Registry**: process-scoped table of containers, each with state, a
//!   reducer, an action queue, and attached change listeners
//! - **Root Binder**: registers one container for a subtree and guarantees
//!   its teardown, healing registrations lost to double mount/unmount
//! - **Path-Filtered Subscription**: re-renders only when a declared path
//!   set intersects the changed paths of a committed transition
//! - **Derived-Value Subscription**: memoized selector with a deep-equality
//!   bail-out for selectors that read a small slice of a large state
//!
//! ## Example
//!
//! ```ignore
//! use statebridge::{
//!     Action, Interest, LifecycleGuard, PathSubscription, Registry, RootBinder,
//!     RootBinderArgs, SubscribeOptions,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(Registry::new());
//! let guard = LifecycleGuard::new(registry.clone(), true);
//!
//! let binder = RootBinder::mount(
//!     registry.clone(),
//!     guard,
//!     RootBinderArgs::new(
//!         statebridge::state_from(json!({ "sum": 0 })),
//!         Arc::new(|state, action| { /* reducer */ state.clone() }),
//!     ),
//! )?;
//!
//! let sub = PathSubscription::attach(
//!     &binder.context(),
//!     Interest::path("sum"),
//!     SubscribeOptions::default(),
//! )?;
//!
//! let dispatcher = binder.dispatcher();
//! dispatcher.dispatch(Action::new("add", json!(3)))?;
//! dispatcher.drain()?;
//! let current = sub.current();
//! ```

pub mod binding;
pub mod error;
pub mod registry;
pub mod types;

// Re-exports
pub use binding::{
    BinderContext, DerivedSubscription, LifecycleGuard, LivenessOracle, PathSubscription,
    RootBinder, RootBinderArgs, SubscribeOptions,
};
pub use error::{BridgeError, Result};
pub use registry::{generate_unique_id, Dispatcher, RegisterContainer, Registry};
pub use types::{
    state_from, Action, ChangeCallback, ChangeNotification, ContainerId, Interest, ListenerId,
    ListenerRegistration, Reducer, State,
};
