//! Trigger values for the gated lifecycle.

use serde::{Deserialize, Serialize};

/// Value a gated dispatcher watches.
///
/// Zero is falsy and keeps the context down. Any other value arms the gate;
/// moving to a different non-zero value restarts the context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trigger(u64);

impl Trigger {
    /// The falsy trigger.
    pub const OFF: Trigger = Trigger(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// Whether this trigger keeps a context running.
    pub const fn is_armed(self) -> bool {
        self.0 != 0
    }
}

impl From<bool> for Trigger {
    fn from(value: bool) -> Self {
        Self(u64::from(value))
    }
}

impl From<u64> for Trigger {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<u32> for Trigger {
    fn from(value: u32) -> Self {
        Self(u64::from(value))
    }
}

impl From<usize> for Trigger {
    fn from(value: usize) -> Self {
        Self(value as u64)
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
