//! The container table: registration, snapshots, and listener bookkeeping.
//!
//! A single `Registry` models the process-scoped mapping from container id
//! to current state, reducer, action queue, and attached change listeners.
//! All mutation happens through short-lived lock sections; callbacks are
//! never invoked while a table lock is held.

use crate::error::{BridgeError, Result};
use crate::types::{
    Action, ContainerId, Interest, ListenerId, ListenerRegistration, Reducer, State,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::queue::Dispatcher;

/// Process-wide counter backing `generate_unique_id`.
static UNIQUE_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a process-unique id string.
///
/// Used for auto-generated container ids and for listener ids; uniqueness
/// is what rules out listener identity collisions.
pub fn generate_unique_id() -> String {
    format!("uid-{}", UNIQUE_ID.fetch_add(1, Ordering::Relaxed))
}

/// A registered change listener.
pub(crate) struct ListenerEntry {
    pub(crate) interest: Interest,
    pub(crate) late_invoke: bool,
    pub(crate) callback: crate::types::ChangeCallback,
}

/// One live container.
pub(crate) struct ContainerEntry {
    pub(crate) state: State,
    pub(crate) reducer: Reducer,
    /// Opaque configuration pass-through.
    #[allow(dead_code)]
    pub(crate) config: Option<Value>,
    /// Opaque persistence pass-through.
    #[allow(dead_code)]
    pub(crate) persistence: Option<Value>,
    pub(crate) queue: VecDeque<Action>,
    /// Reentrancy guard for queue processing.
    pub(crate) draining: bool,
    pub(crate) listeners: HashMap<ListenerId, ListenerEntry>,
}

/// Arguments for registering a container.
pub struct RegisterContainer {
    pub container_id: ContainerId,
    pub initial_state: State,
    pub reducer: Reducer,

    /// Opaque configuration parameters, passed through to the container.
    pub config: Option<Value>,

    /// Opaque persistence parameters, passed through to the container.
    pub persistence: Option<Value>,

    /// Optional pre-built dispatcher; must be bound to `container_id`.
    pub dispatcher: Option<Dispatcher>,
}

impl RegisterContainer {
    pub fn new(
        container_id: impl Into<ContainerId>,
        initial_state: State,
        reducer: Reducer,
    ) -> Self {
        Self {
            container_id: container_id.into(),
            initial_state,
            reducer,
            config: None,
            persistence: None,
            dispatcher: None,
        }
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

/// Process-scoped table of state containers.
pub struct Registry {
    pub(crate) containers: RwLock<HashMap<ContainerId, ContainerEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a container.
    ///
    /// Idempotent: registering an id that is already live is a silent no-op,
    /// so callers may guard-and-register without racing themselves.
    pub fn register(&self, args: RegisterContainer) -> Result<()> {
        if let Some(dispatcher) = &args.dispatcher {
            if dispatcher.container_id() != &args.container_id {
                return Err(BridgeError::DispatcherMismatch {
                    expected: args.container_id.clone(),
                    got: dispatcher.container_id().clone(),
                });
            }
        }

        let mut containers = self.containers.write();
        if containers.contains_key(&args.container_id) {
            debug!(container = %args.container_id, "register: already live, ignoring");
            return Ok(());
        }

        debug!(container = %args.container_id, "registering container");
        containers.insert(
            args.container_id,
            ContainerEntry {
                state: args.initial_state,
                reducer: args.reducer,
                config: args.config,
                persistence: args.persistence,
                queue: VecDeque::new(),
                draining: false,
                listeners: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Remove a container along with its queue and all listeners.
    ///
    /// Returns false if the id was not registered.
    pub fn unregister(&self, container_id: &ContainerId) -> bool {
        let removed = self.containers.write().remove(container_id);
        match removed {
            Some(entry) => {
                debug!(
                    container = %container_id,
                    listeners = entry.listeners.len(),
                    pending = entry.queue.len(),
                    "unregistered container"
                );
                true
            }
            None => {
                debug!(container = %container_id, "unregister: not registered");
                false
            }
        }
    }

    pub fn is_registered(&self, container_id: &ContainerId) -> bool {
        self.containers.read().contains_key(container_id)
    }

    /// Current state of a container.
    ///
    /// With `ignore_unregistered`, an absent container reads as empty state;
    /// otherwise the absence is surfaced to the caller.
    pub fn snapshot(&self, container_id: &ContainerId, ignore_unregistered: bool) -> Result<State> {
        match self.containers.read().get(container_id) {
            Some(entry) => Ok(entry.state.clone()),
            None if ignore_unregistered => Ok(State::new()),
            None => Err(BridgeError::NotRegistered(container_id.clone())),
        }
    }

    /// Attach a change listener to a live container.
    ///
    /// A duplicate listener id is a programming-contract violation (ids come
    /// from `generate_unique_id`) and is surfaced as an error rather than
    /// silently replacing the existing listener.
    pub fn add_change_listener(&self, registration: ListenerRegistration) -> Result<()> {
        let ListenerRegistration {
            container_id,
            listener_id,
            interest,
            late_invoke,
            callback,
        } = registration;

        let mut containers = self.containers.write();
        let entry = containers
            .get_mut(&container_id)
            .ok_or_else(|| BridgeError::NotRegistered(container_id.clone()))?;

        if entry.listeners.contains_key(&listener_id) {
            warn!(container = %container_id, listener = %listener_id, "listener id collision");
            return Err(BridgeError::ListenerCollision {
                container_id,
                listener_id,
            });
        }

        debug!(container = %container_id, listener = %listener_id, late_invoke, "listener attached");
        entry.listeners.insert(
            listener_id,
            ListenerEntry {
                interest,
                late_invoke,
                callback,
            },
        );
        Ok(())
    }

    /// Detach a change listener. Silent when the container or listener is
    /// already gone (teardown ordering makes that a normal case).
    pub fn remove_change_listener(
        &self,
        container_id: &ContainerId,
        listener_id: &ListenerId,
    ) -> bool {
        let mut containers = self.containers.write();
        let Some(entry) = containers.get_mut(container_id) else {
            debug!(container = %container_id, listener = %listener_id, "remove listener: container gone");
            return false;
        };
        if entry.listeners.remove(listener_id).is_some() {
            debug!(container = %container_id, listener = %listener_id, "listener detached");
            true
        } else {
            warn!(container = %container_id, listener = %listener_id, "remove listener: unknown id");
            false
        }
    }

    /// Number of listeners attached to a container (diagnostics).
    pub fn listener_count(&self, container_id: &ContainerId) -> usize {
        self.containers
            .read()
            .get(container_id)
            .map(|e| e.listeners.len())
            .unwrap_or(0)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
