//! Error types for the state bridge.

use crate::types::{ContainerId, ListenerId};
use thiserror::Error;

/// Main error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Container not registered: {0}")]
    NotRegistered(ContainerId),

    #[error("Listener already registered: {listener_id} on {container_id}")]
    ListenerCollision {
        container_id: ContainerId,
        listener_id: ListenerId,
    },

    #[error("Dispatcher is bound to container {got}, expected {expected}")]
    DispatcherMismatch {
        expected: ContainerId,
        got: ContainerId,
    },
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
