//! Process-scoped container registry: the key-addressed state store the
//! binding layer attaches to.

mod queue;
mod table;

pub use queue::Dispatcher;
pub use table::{generate_unique_id, RegisterContainer, Registry};
