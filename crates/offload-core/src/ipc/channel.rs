//! Message channel between a dispatcher and its execution context.
//!
//! Two unbounded FIFO queues, one per direction. Each envelope is delivered
//! exactly once, in send order, with no retries. Closing either side is how
//! teardown is observed by the other: the context loop ends when the
//! invocation sender is dropped, and the reply pump ends when the context
//! thread exits and drops its event sender.

use tokio::sync::mpsc;

/// Event pushed by an execution context to its dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextEvent {
    /// An encoded [`Reply`](super::protocol::Reply).
    Reply(Vec<u8>),
    /// The context failed outside normal reply delivery.
    Fault {
        /// Invocation the fault belongs to, when it could be determined.
        id: Option<u64>,
        /// Human-readable description.
        message: String,
    },
}

/// Open a channel, returning the caller half and the context half.
pub fn open() -> (CallerPort, ContextPort) {
    let (invocation_tx, invocation_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    (
        CallerPort {
            invocations: InvocationSender { tx: invocation_tx },
            events: event_rx,
        },
        ContextPort {
            invocations: invocation_rx,
            events: event_tx,
        },
    )
}

/// Caller side of the channel.
pub struct CallerPort {
    invocations: InvocationSender,
    events: mpsc::UnboundedReceiver<ContextEvent>,
}

impl CallerPort {
    /// Split into the invocation sender and the event receiver.
    pub fn split(self) -> (InvocationSender, mpsc::UnboundedReceiver<ContextEvent>) {
        (self.invocations, self.events)
    }
}

/// Sending half for encoded invocations.
#[derive(Debug, Clone)]
pub struct InvocationSender {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl InvocationSender {
    /// Queue an encoded invocation.
    ///
    /// Returns the envelope back if the context has gone away.
    pub fn send(&self, envelope: Vec<u8>) -> Result<(), Vec<u8>> {
        self.tx.send(envelope).map_err(|e| e.0)
    }

    /// Whether the context side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Context side of the channel.
pub struct ContextPort {
    invocations: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedSender<ContextEvent>,
}

impl ContextPort {
    /// Wait for the next encoded invocation.
    ///
    /// Returns `None` once the caller has dropped its sender.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.invocations.recv().await
    }

    /// Send an encoded reply. Silently dropped if nobody is listening.
    pub fn reply(&self, envelope: Vec<u8>) {
        if self.events.send(ContextEvent::Reply(envelope)).is_err() {
            tracing::trace!("reply dropped: dispatcher stopped listening");
        }
    }

    /// Report a fault. Silently dropped if nobody is listening.
    pub fn fault(&self, id: Option<u64>, message: impl Into<String>) {
        let event = ContextEvent::Fault {
            id,
            message: message.into(),
        };
        if self.events.send(event).is_err() {
            tracing::trace!("fault dropped: dispatcher stopped listening");
        }
    }
}
