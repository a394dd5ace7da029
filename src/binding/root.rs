//! Root binder: owns exactly one container registration for a subtree.
//!
//! Registration happens synchronously during `mount`, not in a deferred
//! effect. The ordering is load-bearing: descendant subscriptions attach
//! during the same render pass and must find a live container.

use crate::error::Result;
use crate::registry::{generate_unique_id, Dispatcher, RegisterContainer, Registry};
use crate::types::{ContainerId, Reducer, State};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::guard::LifecycleGuard;

/// Arguments for mounting a root binder.
pub struct RootBinderArgs {
    /// Explicit container id; when absent one is generated once at mount
    /// and stays stable for the binder's lifetime.
    pub container_id: Option<ContainerId>,
    pub initial_state: State,
    pub reducer: Reducer,

    /// Opaque configuration pass-through to the container.
    pub config: Option<Value>,

    /// Opaque persistence pass-through to the container.
    pub persistence: Option<Value>,

    /// Optional pre-built dispatcher. When no explicit container id is
    /// given, the binder adopts the dispatcher's id.
    pub dispatcher: Option<Dispatcher>,
}

impl RootBinderArgs {
    pub fn new(initial_state: State, reducer: Reducer) -> Self {
        Self {
            container_id: None,
            initial_state,
            reducer,
            config: None,
            persistence: None,
            dispatcher: None,
        }
    }

    pub fn with_container_id(mut self, container_id: impl Into<ContainerId>) -> Self {
        self.container_id = Some(container_id.into());
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_persistence(mut self, persistence: Value) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }
}

/// Establishes one container registration and guarantees its teardown.
///
/// One binder per container id: the binder assumes it is the sole owner of
/// the registration it creates.
pub struct RootBinder {
    registry: Arc<Registry>,
    guard: LifecycleGuard,
    container_id: ContainerId,

    // Kept so a registration lost to a double-invoke teardown can be
    // rebuilt with the original arguments.
    initial_state: State,
    reducer: Reducer,
    config: Option<Value>,
    persistence: Option<Value>,
}

impl RootBinder {
    /// First render of an instance: register the container synchronously.
    pub fn mount(
        registry: Arc<Registry>,
        guard: LifecycleGuard,
        args: RootBinderArgs,
    ) -> Result<Self> {
        let RootBinderArgs {
            container_id,
            initial_state,
            reducer,
            config,
            persistence,
            dispatcher,
        } = args;

        let container_id = container_id
            .or_else(|| dispatcher.as_ref().map(|d| d.container_id().clone()))
            .unwrap_or_else(|| ContainerId(generate_unique_id()));

        let binder = Self {
            registry,
            guard,
            container_id,
            initial_state,
            reducer,
            config,
            persistence,
        };

        let mut registration = binder.registration();
        registration.dispatcher = dispatcher;
        binder.registry.register(registration)?;
        Ok(binder)
    }

    fn registration(&self) -> RegisterContainer {
        RegisterContainer {
            container_id: self.container_id.clone(),
            initial_state: self.initial_state.clone(),
            reducer: Arc::clone(&self.reducer),
            config: self.config.clone(),
            persistence: self.persistence.clone(),
            dispatcher: None,
        }
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    /// Subsequent render of the same instance.
    ///
    /// Normally a no-op; when the guard reports the registration vanished
    /// (double-invoke teardown ran), re-register with the original
    /// arguments before any descendant can observe an absent container.
    pub fn render(&self) {
        if self.guard.needs_re_registration(&self.container_id) {
            debug!(container = %self.container_id, "registration lost, re-registering");
            self.re_register();
        }
    }

    /// Force re-registration. Safe to call when the container is live
    /// (registration is idempotent).
    pub fn re_register(&self) {
        if let Err(e) = self.registry.register(self.registration()) {
            warn!(container = %self.container_id, error = %e, "re-registration failed");
        }
    }

    /// Teardown: unregister the container. Idempotent; also runs on drop so
    /// final teardown is guaranteed even without an explicit call.
    pub fn unmount(&self) {
        self.registry.unregister(&self.container_id);
    }

    /// Capabilities exposed to descendant subscriptions: the container
    /// identity and an out-of-band re-registration hook.
    pub fn context(&self) -> BinderContext {
        let registry = Arc::clone(&self.registry);
        let registration = self.registration();
        let container_id = registration.container_id.clone();
        let initial_state = registration.initial_state;
        let reducer = registration.reducer;
        let config = registration.config;
        let persistence = registration.persistence;
        let re_register_id = container_id.clone();
        BinderContext {
            registry: Arc::clone(&self.registry),
            container_id,
            re_register: Arc::new(move || {
                let registration = RegisterContainer {
                    container_id: re_register_id.clone(),
                    initial_state: initial_state.clone(),
                    reducer: Arc::clone(&reducer),
                    config: config.clone(),
                    persistence: persistence.clone(),
                    dispatcher: None,
                };
                if let Err(e) = registry.register(registration) {
                    warn!(container = %re_register_id, error = %e, "re-registration failed");
                }
            }),
        }
    }

    /// Enqueue handle for the bound container.
    pub fn dispatcher(&self) -> Dispatcher {
        self.registry.dispatcher(self.container_id.clone())
    }
}

impl Drop for RootBinder {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Cloneable view of a root binder handed to descendants.
#[derive(Clone)]
pub struct BinderContext {
    registry: Arc<Registry>,
    container_id: ContainerId,
    re_register: Arc<dyn Fn() + Send + Sync>,
}

impl BinderContext {
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    /// Re-register the container out of band, using the binder's original
    /// mount arguments. No-op when the container is live.
    pub fn re_register(&self) {
        (self.re_register)()
    }
}
