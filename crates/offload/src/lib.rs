//! Offload: run functions on isolated execution contexts.
//!
//! Offload moves a function off the caller's thread onto an execution
//! context with its own thread and runtime, and gives the caller:
//! - **A pending result** per dispatch, settled by the context's reply
//! - **A status** (`idle`, `running`, `error`) that can be watched
//! - **A kill switch** that stops listening immediately
//! - **Lifecycles**: eager, per-call, singleton and trigger-gated contexts
//!
//! For the building blocks (channels, envelopes, context handles), see the
//! `offload-core` crate.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use offload::prelude::*;
//!
//! #[offload::callable]
//! pub fn sum_range(n: u64) -> u64 {
//!     (0..n).sum()
//! }
//!
//! let table = CallableTable::new([SUM_RANGE])?;
//! let dispatcher = Dispatcher::new(table, DispatcherConfig::default())?;
//! dispatcher.attach(Some(SUM_RANGE))?;
//!
//! let total: u64 = dispatcher.dispatch(vec![json!(5)])?.into_typed().await?;
//! assert_eq!(total, 10);
//! ```
//!
//! # Callables
//!
//! A callable carries no captured state: only its registered name crosses
//! into the context, which looks it up in its own copy of the
//! [`CallableTable`]. Arguments and results travel as JSON values.

pub use offload_macros::callable;

pub use offload_core::{
    ArgumentShape, Args, CallOutcome, Callable, CallableTable, ContextSettings, Dispatcher,
    DispatcherConfig, DispatcherFactory, Entry, Error, Lifecycle, PendingResult, Result,
    SharedContext, Status, Trigger, encode_value,
};

pub use futures::future::LocalBoxFuture;
pub use serde_json::{Value, json};
pub use tokio_util::sync::CancellationToken;

pub mod prelude {
    //! Common imports for offload users.
    //!
    //! ```rust,ignore
    //! use offload::prelude::*;
    //! ```

    pub use crate::callable;
    pub use crate::{
        Args, CallOutcome, Callable, CallableTable, CancellationToken, Dispatcher,
        DispatcherConfig, DispatcherFactory, Lifecycle, PendingResult, Status, Trigger,
    };

    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
}
