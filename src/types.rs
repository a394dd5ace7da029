//! Core types for the state bridge.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Opaque key identifying one state container instance.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        ContainerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContainerId({})", self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(s: &str) -> Self {
        ContainerId(s.to_string())
    }
}

impl From<String> for ContainerId {
    fn from(s: String) -> Self {
        ContainerId(s)
    }
}

/// Identifies one listener attachment on a container.
///
/// Unique per subscription instance; may carry a diagnostic `tag:` prefix.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(pub String);

impl ListenerId {
    /// Build a listener id from a generated unique suffix, optionally
    /// prefixed by a caller-supplied tag.
    pub fn tagged(tag: Option<&str>, unique: &str) -> Self {
        match tag {
            Some(t) => ListenerId(format!("{}:{}", t, unique)),
            None => ListenerId(unique.to_string()),
        }
    }
}

impl fmt::Debug for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerId({})", self.0)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Container state: a JSON object addressed by top-level keys ("paths").
pub type State = serde_json::Map<String, Value>;

/// Convert a JSON value into container state.
///
/// Non-object values yield empty state, matching how an absent container
/// reads under `ignore_unregistered`.
pub fn state_from(value: Value) -> State {
    match value {
        Value::Object(map) => map,
        _ => State::new(),
    }
}

/// An action dispatched against a container.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    /// Application-defined action name.
    pub name: String,

    /// Application-defined payload.
    #[serde(default)]
    pub payload: Value,

    /// When true, the action is dispatched (and observable by listeners)
    /// but never reaches the reducer, so it commits no state transition.
    #[serde(default)]
    pub bypass_reducer: bool,
}

impl Action {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            bypass_reducer: false,
        }
    }

    /// An action that skips the reducer entirely.
    pub fn bypassing_reducer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Value::Null,
            bypass_reducer: true,
        }
    }
}

/// Pure state transition function.
pub type Reducer = Arc<dyn Fn(&State, &Action) -> State + Send + Sync>;

/// A subscriber's statement of which top-level paths it cares about.
///
/// Tagged variant rather than a special "*" string, so the wildcard cannot
/// collide with a real path name.
#[derive(Clone, Debug)]
pub enum Interest {
    /// Every path.
    AllPaths,

    /// A finite set of named paths. Membership test is O(1).
    Paths(HashSet<String>),
}

impl Interest {
    /// Interest in every path.
    pub fn all() -> Self {
        Interest::AllPaths
    }

    /// Interest in a single path.
    pub fn path(path: impl Into<String>) -> Self {
        let mut set = HashSet::with_capacity(1);
        set.insert(path.into());
        Interest::Paths(set)
    }

    /// Interest in a set of paths. Order is irrelevant.
    pub fn paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Interest::Paths(paths.into_iter().map(Into::into).collect())
    }

    /// Whether any of the changed paths falls inside this interest set.
    pub fn matches(&self, changed_paths: &[String]) -> bool {
        match self {
            Interest::AllPaths => true,
            Interest::Paths(set) => changed_paths.iter().any(|p| set.contains(p)),
        }
    }
}

/// Emitted on a committed state transition (immediate mode) or once per
/// drained burst of actions (late-invoke mode).
#[derive(Clone, Debug)]
pub struct ChangeNotification {
    /// The dispatched action (for late-invoke delivery, the last action of
    /// the burst).
    pub action: Action,

    /// Exactly the top-level keys whose value differs between `old_state`
    /// and `new_state`. Sorted and deduplicated.
    pub changed_paths: Vec<String>,

    /// State before the transition (or before the burst).
    pub old_state: State,

    /// State after the transition (or after the burst).
    pub new_state: State,
}

/// Callback invoked with a change notification.
pub type ChangeCallback = Arc<dyn Fn(&ChangeNotification) + Send + Sync>;

/// Arguments for attaching a change listener to a container.
#[derive(Clone)]
pub struct ListenerRegistration {
    pub container_id: ContainerId,
    pub listener_id: ListenerId,

    /// Registry-side pre-filter. Subscriptions in this crate register with
    /// `Interest::AllPaths` and filter client-side, but the registry honors
    /// narrower interests too.
    pub interest: Interest,

    /// When true (the default for subscriptions), the callback fires once
    /// after the action queue has fully drained; when false, once per
    /// committed action.
    pub late_invoke: bool,

    pub callback: ChangeCallback,
}
