//! Communication between dispatchers and execution contexts.
//!
//! This module provides the envelope protocol and the ordered channel that
//! carries encoded envelopes across the isolation boundary.

pub mod channel;
pub mod protocol;

pub use channel::{CallerPort, ContextEvent, ContextPort, InvocationSender};
pub use protocol::{Invocation, Payload, Reply, ReplyBody, decode, encode};
