//! Action queue processing and change-notification fan-out.
//!
//! `dispatch` only enqueues; all reducer applications happen inside
//! `drain_queue`, one action at a time, on the caller's thread. Listeners
//! registered with `late_invoke = false` fire once per committed action,
//! in dispatch order, before the next action is popped. Listeners with
//! `late_invoke = true` fire exactly once per drained burst, carrying the
//! cumulative changed-path set and the final state.

use crate::error::{BridgeError, Result};
use crate::types::{Action, ChangeCallback, ChangeNotification, ContainerId, State};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::trace;

use super::table::Registry;

/// Exactly the top-level keys whose value differs between old and new state.
///
/// Sorted so notification contents are deterministic.
fn diff_paths(old: &State, new: &State) -> Vec<String> {
    let mut changed = BTreeSet::new();
    for (key, value) in old {
        if new.get(key) != Some(value) {
            changed.insert(key.clone());
        }
    }
    for key in new.keys() {
        if !old.contains_key(key) {
            changed.insert(key.clone());
        }
    }
    changed.into_iter().collect()
}

/// One popped-and-committed action, ready for immediate delivery.
struct CommittedStep {
    notification: ChangeNotification,
    immediate: Vec<ChangeCallback>,
}

impl Registry {
    /// Enqueue an action for a container.
    ///
    /// Processing is deferred: nothing observes the action until
    /// `drain_queue` runs.
    pub fn dispatch(&self, container_id: &ContainerId, action: Action) -> Result<()> {
        let mut containers = self.containers.write();
        let entry = containers
            .get_mut(container_id)
            .ok_or_else(|| BridgeError::NotRegistered(container_id.clone()))?;
        trace!(container = %container_id, action = %action.name, "action enqueued");
        entry.queue.push_back(action);
        Ok(())
    }

    /// Number of actions waiting in a container's queue.
    pub fn pending_actions(&self, container_id: &ContainerId) -> usize {
        self.containers
            .read()
            .get(container_id)
            .map(|e| e.queue.len())
            .unwrap_or(0)
    }

    /// Process every queued action for a container, then deliver the
    /// coalesced late-invoke notification.
    ///
    /// Reentrant-safe: actions dispatched from inside a callback land on the
    /// queue and are processed before this drain completes, and a nested
    /// `drain_queue` call made while draining is a no-op.
    pub fn drain_queue(&self, container_id: &ContainerId) -> Result<()> {
        {
            let mut containers = self.containers.write();
            let entry = containers
                .get_mut(container_id)
                .ok_or_else(|| BridgeError::NotRegistered(container_id.clone()))?;
            if entry.draining || entry.queue.is_empty() {
                return Ok(());
            }
            entry.draining = true;
        }

        let mut burst_old: Option<State> = None;
        let mut cumulative: BTreeSet<String> = BTreeSet::new();
        let mut last_action: Option<Action> = None;

        loop {
            // Pop and commit one action under the lock; invoke callbacks
            // only after the lock is released.
            let step = {
                let mut containers = self.containers.write();
                let Some(entry) = containers.get_mut(container_id) else {
                    // Unregistered mid-drain; nothing left to deliver.
                    return Ok(());
                };
                match entry.queue.pop_front() {
                    None => {
                        entry.draining = false;
                        None
                    }
                    Some(action) => {
                        let old_state = entry.state.clone();
                        if burst_old.is_none() {
                            burst_old = Some(old_state.clone());
                        }

                        let (new_state, changed_paths) = if action.bypass_reducer {
                            (old_state.clone(), Vec::new())
                        } else {
                            let new_state = (entry.reducer)(&entry.state, &action);
                            let changed = diff_paths(&entry.state, &new_state);
                            entry.state = new_state.clone();
                            (new_state, changed)
                        };

                        trace!(
                            container = %container_id,
                            action = %action.name,
                            changed = ?changed_paths,
                            "action committed"
                        );
                        cumulative.extend(changed_paths.iter().cloned());

                        let immediate: Vec<ChangeCallback> = entry
                            .listeners
                            .values()
                            .filter(|l| !l.late_invoke && l.interest.matches(&changed_paths))
                            .map(|l| l.callback.clone())
                            .collect();

                        last_action = Some(action.clone());
                        Some(CommittedStep {
                            notification: ChangeNotification {
                                action,
                                changed_paths,
                                old_state,
                                new_state,
                            },
                            immediate,
                        })
                    }
                }
            };

            match step {
                None => break,
                Some(CommittedStep {
                    notification,
                    immediate,
                }) => {
                    for callback in immediate {
                        callback(&notification);
                    }
                }
            }
        }

        // Queue is empty: one coalesced delivery to late-invoke listeners.
        let (Some(action), Some(old_state)) = (last_action, burst_old) else {
            return Ok(());
        };
        let (late, notification) = {
            let containers = self.containers.read();
            let Some(entry) = containers.get(container_id) else {
                return Ok(());
            };
            let changed_paths: Vec<String> = cumulative.into_iter().collect();
            let late: Vec<ChangeCallback> = entry
                .listeners
                .values()
                .filter(|l| l.late_invoke && l.interest.matches(&changed_paths))
                .map(|l| l.callback.clone())
                .collect();
            let notification = ChangeNotification {
                action,
                changed_paths,
                old_state,
                new_state: entry.state.clone(),
            };
            (late, notification)
        };
        trace!(
            container = %container_id,
            listeners = late.len(),
            changed = ?notification.changed_paths,
            "late-invoke delivery"
        );
        for callback in late {
            callback(&notification);
        }
        Ok(())
    }

    /// A cloneable handle that enqueues actions against one container.
    pub fn dispatcher(self: &Arc<Self>, container_id: ContainerId) -> Dispatcher {
        Dispatcher {
            registry: Arc::clone(self),
            container_id,
        }
    }
}

/// Enqueue handle bound to one container.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    container_id: ContainerId,
}

impl Dispatcher {
    pub fn container_id(&self) -> &ContainerId {
        &self.container_id
    }

    /// Enqueue an action. Delivery is deferred to the next drain.
    pub fn dispatch(&self, action: Action) -> Result<()> {
        self.registry.dispatch(&self.container_id, action)
    }

    /// Drain the bound container's queue.
    pub fn drain(&self) -> Result<()> {
        self.registry.drain_queue(&self.container_id)
    }
}
