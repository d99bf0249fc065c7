//! Execution contexts.
//!
//! An execution context is a dedicated OS thread with its own call stack
//! and its own current-thread tokio runtime. It shares no mutable state with
//! the caller: invocations go in and replies come out as encoded envelopes.
//!
//! # Architecture
//!
//! ```text
//! Dispatcher (caller runtime)
//!     │
//!     └── ContextHandle
//!             │
//!             ├── pending slot (one outstanding invocation)
//!             │
//!             ├── invocation queue ──▶ context thread
//!             │                          └── CallableTable lookup
//!             │                          └── run Blocking / Cancellable / Future
//!             │
//!             ├── reply pump ◀── reply / fault queue
//!             │       └── settles the pending slot, updates status
//!             │
//!             └── terminate: drop queue + cancel token (stop listening)
//! ```
//!
//! # Module Structure
//!
//! - `context` - Context thread bootstrap and invocation loop
//! - `handle` - Caller-side `ContextHandle` and reply pump
//! - `runtime` - Caller-side task spawning

mod context;
mod handle;
mod runtime;

pub use handle::ContextHandle;
