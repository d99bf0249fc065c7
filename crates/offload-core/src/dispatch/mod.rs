//! Dispatchers and their lifecycles.
//!
//! A [`Dispatcher`] binds one callable to an execution context and exposes
//! the caller's view of it: a [`Status`], a [`PendingResult`] per dispatch,
//! and a kill switch. How long the context lives is set by the
//! [`Lifecycle`](crate::config::Lifecycle):
//!
//! - `eager` - spawned on attach, reused by every dispatch
//! - `per_call` - a fresh context per dispatch, retired after its reply
//! - `singleton` - one context shared by all dispatchers of a [`DispatcherFactory`]
//! - `gated` - driven by [`Dispatcher::set_trigger`]

mod dispatcher;
mod factory;
pub(crate) mod pending;
pub(crate) mod status;
mod trigger;

pub use dispatcher::Dispatcher;
pub use factory::{DispatcherFactory, SharedContext};
pub use pending::PendingResult;
pub use status::{Status, StatusCell};
pub use trigger::Trigger;
