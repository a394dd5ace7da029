//! The subscription/reconciliation bridge between view components and the
//! container registry.

mod derived;
mod guard;
mod root;
mod selector;

pub use derived::DerivedSubscription;
pub use guard::{LifecycleGuard, LivenessOracle};
pub use root::{BinderContext, RootBinder, RootBinderArgs};
pub use selector::{PathSubscription, SubscribeOptions};
