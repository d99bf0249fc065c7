//! Callables and the function table shared with execution contexts.
//!
//! A [`Callable`] is a name plus a plain `fn` pointer. Function pointers
//! cannot capture their environment, so everything a callable reads has to
//! arrive through its [`Args`]. Both the dispatcher and every execution
//! context resolve callables through the same [`CallableTable`], which means
//! only the callable's name ever travels across the boundary.

mod serialize;

use std::fmt;
use std::sync::Arc;

use futures::future::LocalBoxFuture;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

pub use serialize::{CallableSource, reconstruct, serialize};

/// What a callable produces: a JSON value, or an error message.
///
/// Error identity and backtraces do not survive the boundary, only the text.
pub type CallOutcome = std::result::Result<Value, String>;

/// Entry point of a registered callable.
#[derive(Clone, Copy)]
pub enum Entry {
    /// Runs to completion on the execution context thread.
    Blocking(fn(Args) -> CallOutcome),
    /// Runs on the context thread and observes a token cancelled on kill.
    Cancellable(fn(Args, CancellationToken) -> CallOutcome),
    /// Asynchronous callable, awaited on the context's runtime.
    ///
    /// The future is dropped at its next await point when the context is killed.
    Future(fn(Args) -> LocalBoxFuture<'static, CallOutcome>),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Self::Blocking(_) => "blocking",
            Self::Cancellable(_) => "cancellable",
            Self::Future(_) => "future",
        }
    }
}

/// A capture-free unit of computation that can run in an execution context.
#[derive(Clone, Copy)]
pub struct Callable {
    name: &'static str,
    entry: Entry,
}

impl Callable {
    /// A synchronous callable.
    pub const fn blocking(name: &'static str, f: fn(Args) -> CallOutcome) -> Self {
        Self {
            name,
            entry: Entry::Blocking(f),
        }
    }

    /// A synchronous callable with cooperative cancellation.
    pub const fn cancellable(
        name: &'static str,
        f: fn(Args, CancellationToken) -> CallOutcome,
    ) -> Self {
        Self {
            name,
            entry: Entry::Cancellable(f),
        }
    }

    /// An asynchronous callable.
    pub const fn future(
        name: &'static str,
        f: fn(Args) -> LocalBoxFuture<'static, CallOutcome>,
    ) -> Self {
        Self {
            name,
            entry: Entry::Future(f),
        }
    }

    /// The name the callable is registered under.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The callable's entry point.
    pub const fn entry(&self) -> Entry {
        self.entry
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.name)
            .field("kind", &self.entry.kind())
            .finish()
    }
}

/// Ordered call arguments as they arrive in the execution context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args(Vec<Value>);

impl Args {
    /// Wrap a list of argument values.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw value of the argument at `index`.
    pub fn raw(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Decode the argument at `index`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> std::result::Result<T, String> {
        let value = self
            .0
            .get(index)
            .ok_or_else(|| format!("missing argument {} (got {})", index, self.0.len()))?;
        serde_json::from_value(value.clone()).map_err(|e| format!("argument {}: {}", index, e))
    }

    /// Decode the whole argument list, typically into a tuple.
    pub fn decode<T: DeserializeOwned>(self) -> std::result::Result<T, String> {
        serde_json::from_value(Value::Array(self.0)).map_err(|e| format!("arguments: {}", e))
    }

    /// Unwrap into the raw values.
    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Encode a callable's output for the reply envelope.
pub fn encode_value<T: Serialize>(value: &T) -> CallOutcome {
    serde_json::to_value(value).map_err(|e| format!("failed to encode result: {}", e))
}

/// Immutable name → callable table.
///
/// Cloning is cheap; every clone refers to the same entries. The table is
/// the only thing (besides encoded envelopes) a context receives from its
/// creator, and it is never mutated after construction.
#[derive(Clone, Default)]
pub struct CallableTable {
    entries: Arc<FxHashMap<&'static str, Callable>>,
}

impl CallableTable {
    /// Build a table from a set of callables.
    ///
    /// # Errors
    /// Returns `DuplicateCallable` if two callables share a name.
    pub fn new(callables: impl IntoIterator<Item = Callable>) -> Result<Self> {
        let mut entries = FxHashMap::default();
        for callable in callables {
            if entries.insert(callable.name, callable).is_some() {
                return Err(Error::DuplicateCallable(callable.name.to_string()));
            }
        }
        Ok(Self {
            entries: Arc::new(entries),
        })
    }

    /// Look up a callable by name.
    pub fn lookup(&self, name: &str) -> Option<Callable> {
        self.entries.get(name).copied()
    }

    /// Whether a callable is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Number of registered callables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CallableTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
