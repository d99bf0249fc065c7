//! Core engine for offload: running callables on isolated execution contexts.
//!
//! This crate provides:
//! - A registry of capture-free callables and the name-based serializer
//!   that carries them across the context boundary
//! - The envelope protocol and channels between caller and context
//! - Execution contexts: dedicated threads with their own runtime
//! - Dispatchers with eager, per-call, singleton and gated lifecycles
//! - Configuration loaded from JSON and `OFFLOAD_*` environment variables

pub mod callable;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod execute;
pub mod ipc;

pub use callable::{
    Args, CallOutcome, Callable, CallableSource, CallableTable, Entry, encode_value,
};
pub use config::{ArgumentShape, ContextSettings, DispatcherConfig, Lifecycle};
pub use dispatch::{
    Dispatcher, DispatcherFactory, PendingResult, SharedContext, Status, Trigger,
};
pub use error::{Error, Result};
pub use execute::ContextHandle;
