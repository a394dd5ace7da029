//! Path-filtered subscription: the primary selector for reading container
//! state.
//!
//! The subscription registers a wildcard listener with the registry and
//! applies the caller's interest filter client-side, matching how the
//! re-render decision and the optional observer callback diverge: only the
//! re-render is path-filtered, the observer sees every notification.

use crate::error::{BridgeError, Result};
use crate::registry::{generate_unique_id, Registry};
use crate::types::{
    ChangeCallback, ContainerId, Interest, ListenerId, ListenerRegistration, State,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::root::BinderContext;

/// Options for attaching a path-filtered subscription.
#[derive(Clone)]
pub struct SubscribeOptions {
    /// Read an absent container as empty state instead of failing.
    pub ignore_unregistered: bool,

    /// Fire once after the action queue drains (true) or once per committed
    /// action (false).
    pub late_invoke: bool,

    /// Diagnostic prefix for the generated listener id.
    pub listener_tag: Option<String>,

    /// When true, no listener is registered at all and `current()` reads the
    /// live container snapshot on every call. Workaround for host-framework
    /// rules that forbid conditional attachment at call sites.
    pub switch_off: bool,

    /// Unconditional observer: invoked on every notification delivered to
    /// this subscription, whether or not the path filter matched.
    pub observer: Option<ChangeCallback>,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            ignore_unregistered: true,
            late_invoke: true,
            listener_tag: None,
            switch_off: false,
            observer: None,
        }
    }
}

impl SubscribeOptions {
    /// Fire per committed action instead of once per drained burst.
    pub fn immediate(mut self) -> Self {
        self.late_invoke = false;
        self
    }

    /// Surface an absent container as an error instead of empty state.
    pub fn strict(mut self) -> Self {
        self.ignore_unregistered = false;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.listener_tag = Some(tag.into());
        self
    }

    pub fn switched_off(mut self) -> Self {
        self.switch_off = true;
        self
    }

    pub fn with_observer(mut self, observer: ChangeCallback) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// A live path-filtered subscription.
///
/// Local render state advances only when a notification's changed paths
/// intersect the declared interest; the render counter counts the initial
/// synchronous read as the first render.
pub struct PathSubscription {
    registry: Arc<Registry>,
    container_id: ContainerId,
    listener_id: Option<ListenerId>,
    local_state: Arc<RwLock<State>>,
    renders: Arc<AtomicU64>,
    torn_down: Arc<AtomicBool>,
    switch_off: bool,
}

impl PathSubscription {
    /// Attach under a root binder. If the container registration was lost to
    /// a double-invoke teardown, it is rebuilt before the listener attaches.
    pub fn attach(ctx: &BinderContext, interest: Interest, options: SubscribeOptions) -> Result<Self> {
        Self::attach_inner(
            Arc::clone(ctx.registry()),
            ctx.container_id().clone(),
            Some(ctx),
            interest,
            options,
        )
    }

    /// Attach directly to a container id, with no re-registration path.
    pub fn attach_direct(
        registry: Arc<Registry>,
        container_id: impl Into<ContainerId>,
        interest: Interest,
        options: SubscribeOptions,
    ) -> Result<Self> {
        Self::attach_inner(registry, container_id.into(), None, interest, options)
    }

    fn attach_inner(
        registry: Arc<Registry>,
        container_id: ContainerId,
        ctx: Option<&BinderContext>,
        interest: Interest,
        options: SubscribeOptions,
    ) -> Result<Self> {
        let SubscribeOptions {
            ignore_unregistered,
            late_invoke,
            listener_tag,
            switch_off,
            observer,
        } = options;

        if switch_off {
            // Plain accessor mode: no listener, no cached state.
            return Ok(Self {
                registry,
                container_id,
                listener_id: None,
                local_state: Arc::new(RwLock::new(State::new())),
                renders: Arc::new(AtomicU64::new(1)),
                torn_down: Arc::new(AtomicBool::new(false)),
                switch_off: true,
            });
        }

        // Heal a registration lost to the double-invoke teardown before
        // anything reads or attaches.
        if !registry.is_registered(&container_id) {
            if let Some(ctx) = ctx {
                ctx.re_register();
            }
        }

        // Synchronous initial read: no frame renders placeholder data.
        let initial = registry.snapshot(&container_id, ignore_unregistered)?;

        let local_state = Arc::new(RwLock::new(initial));
        let renders = Arc::new(AtomicU64::new(1));
        let torn_down = Arc::new(AtomicBool::new(false));

        let listener_id = ListenerId::tagged(listener_tag.as_deref(), &generate_unique_id());
        let callback = {
            let local_state = Arc::clone(&local_state);
            let renders = Arc::clone(&renders);
            let torn_down = Arc::clone(&torn_down);
            let interest = interest.clone();
            Arc::new(move |n: &crate::types::ChangeNotification| {
                // The registry may momentarily hold a stale reference to a
                // detached subscription; drop such deliveries here.
                if torn_down.load(Ordering::Acquire) {
                    return;
                }
                if interest.matches(&n.changed_paths) {
                    *local_state.write() = n.new_state.clone();
                    renders.fetch_add(1, Ordering::Relaxed);
                }
                if let Some(observer) = &observer {
                    observer(n);
                }
            }) as ChangeCallback
        };

        let attached = registry.add_change_listener(ListenerRegistration {
            container_id: container_id.clone(),
            listener_id: listener_id.clone(),
            // Wildcard at the registry; the interest filter runs client-side
            // so the observer can see non-matching notifications.
            interest: Interest::all(),
            late_invoke,
            callback,
        });

        let listener_id = match attached {
            Ok(()) => Some(listener_id),
            Err(BridgeError::NotRegistered(_)) if ignore_unregistered => {
                warn!(container = %container_id, "subscription attached without listener: container absent");
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            registry,
            container_id,
            listener_id,
            local_state,
            renders,
            torn_down,
            switch_off: false,
        })
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    /// The listener id this subscription registered, if any.
    pub fn listener_id(&self) -> Option<&ListenerId> {
        self.listener_id.as_ref()
    }

    /// Local render state.
    ///
    /// In `switch_off` mode this re-reads the live container snapshot on
    /// every call instead of returning a cached value.
    pub fn current(&self) -> State {
        if self.switch_off {
            return self
                .registry
                .snapshot(&self.container_id, true)
                .unwrap_or_default();
        }
        self.local_state.read().clone()
    }

    /// How many times local render state has been (re)placed, counting the
    /// initial synchronous read.
    pub fn renders(&self) -> u64 {
        self.renders.load(Ordering::Relaxed)
    }

    /// Detach: set the torn-down flag first, then unregister the listener.
    /// Any notification already in flight is dropped by the flag check.
    pub fn detach(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(listener_id) = &self.listener_id {
            debug!(container = %self.container_id, listener = %listener_id, "subscription detached");
            self.registry
                .remove_change_listener(&self.container_id, listener_id);
        }
    }
}

impl std::fmt::Debug for PathSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathSubscription")
            .field("container_id", &self.container_id)
            .field("listener_id", &self.listener_id)
            .field("switch_off", &self.switch_off)
            .finish_non_exhaustive()
    }
}

impl Drop for PathSubscription {
    fn drop(&mut self) {
        self.detach();
    }
}
