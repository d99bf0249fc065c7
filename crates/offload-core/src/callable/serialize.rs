//! Callable serialization across the isolation boundary.
//!
//! Executable code never crosses the boundary. A callable is shipped as its
//! registered name and rebuilt on the other side by looking that name up in
//! the context's copy of the [`CallableTable`].

use serde::{Deserialize, Serialize};

use super::{Callable, CallableTable, Entry};
use crate::error::{Error, Result};

/// Transmittable form of a callable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallableSource(String);

impl CallableSource {
    /// The callable name this source refers to.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CallableSource {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Serialize a callable for transmission to an execution context.
///
/// # Errors
/// Returns `SerializationUnsupported` when the callable is not registered in
/// `table`, or when a different function is registered under its name. In
/// both cases the context would run something other than what the caller
/// passed, so this fails before anything is sent.
pub fn serialize(callable: &Callable, table: &CallableTable) -> Result<CallableSource> {
    let registered = table
        .lookup(callable.name())
        .ok_or_else(|| Error::SerializationUnsupported {
            callable: callable.name().to_string(),
            reason: "not registered in the callable table".to_string(),
        })?;

    if !same_entry(&registered.entry(), &callable.entry()) {
        return Err(Error::SerializationUnsupported {
            callable: callable.name().to_string(),
            reason: "a different function is registered under this name".to_string(),
        });
    }

    Ok(CallableSource(callable.name().to_string()))
}

/// Rebuild a callable from its transmitted form.
pub fn reconstruct(source: &CallableSource, table: &CallableTable) -> Option<Callable> {
    table.lookup(source.name())
}

fn same_entry(a: &Entry, b: &Entry) -> bool {
    match (a, b) {
        (Entry::Blocking(f), Entry::Blocking(g)) => std::ptr::fn_addr_eq(*f, *g),
        (Entry::Cancellable(f), Entry::Cancellable(g)) => std::ptr::fn_addr_eq(*f, *g),
        (Entry::Future(f), Entry::Future(g)) => std::ptr::fn_addr_eq(*f, *g),
        _ => false,
    }
}
