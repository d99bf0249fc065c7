//! Error types for offload-core.

use thiserror::Error;

/// Result type for offload-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in offload-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Dispatch attempted with no live execution context.
    #[error("execution context is not initialized")]
    NotInitialized,

    /// The callable cannot be shipped across the isolation boundary.
    #[error("callable `{callable}` cannot cross the execution boundary: {reason}")]
    SerializationUnsupported { callable: String, reason: String },

    /// The callable returned an error inside the execution context.
    ///
    /// Only the message text survives the boundary, so this displays as
    /// exactly that message.
    #[error("{0}")]
    Execution(String),

    /// The execution context failed outside normal reply delivery.
    #[error("execution context fault: {0}")]
    ChannelFault(String),

    /// The pending result was replaced by a newer dispatch before its reply arrived.
    #[error("invocation {invocation} was superseded by a newer dispatch")]
    Superseded { invocation: u64 },

    /// The execution context was torn down before replying.
    #[error("invocation abandoned: execution context was torn down")]
    Abandoned,

    /// A shared execution context cannot be shut down while others hold it.
    #[error("shared execution context is still held by {holders} dispatcher(s)")]
    SharedContextInUse { holders: usize },

    /// Two callables were registered under the same name.
    #[error("duplicate callable name: {0}")]
    DuplicateCallable(String),

    /// Attach was called without a callable bound to the dispatcher.
    #[error("no callable bound to dispatcher")]
    NoCallable,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The execution context thread or its runtime could not be created.
    #[error("failed to spawn execution context: {0}")]
    Spawn(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Operation not valid for the active lifecycle.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Recovery hint for the error, if one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some(
                "call `attach` (or raise the trigger of a gated dispatcher) before dispatching",
            ),
            Self::SerializationUnsupported { .. } => Some(
                "register the callable in the CallableTable shared with the execution context",
            ),
            Self::Superseded { .. } => Some(
                "await each pending result before dispatching again on the same context",
            ),
            Self::SharedContextInUse { .. } => {
                Some("kill or drop every dispatcher built from the factory first")
            }
            Self::NoCallable => Some(
                "pass a callable to `attach` or build the dispatcher from a factory",
            ),
            Self::Config(_) => Some(
                "check the dispatcher config file and OFFLOAD_* environment variables",
            ),
            _ => None,
        }
    }

    /// Format the error together with its recovery hint.
    pub fn with_hint(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{}\n  hint: {}", self, hint),
            None => self.to_string(),
        }
    }

    /// Whether the error was produced on the far side of the isolation boundary.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Execution(_) | Self::ChannelFault(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_displays_bare_message() {
        let err = Error::Execution("boom".to_string());
        assert_eq!(err.to_string(), "boom");
        assert!(err.is_remote());
    }

    #[test]
    fn test_with_hint() {
        let err = Error::NotInitialized;
        let text = err.with_hint();
        assert!(text.starts_with("execution context is not initialized"));
        assert!(text.contains("hint: call `attach`"));

        assert_eq!(Error::Abandoned.with_hint(), Error::Abandoned.to_string());
    }
}
