//! Execution context bootstrap.
//!
//! Each execution context is a dedicated OS thread running its own
//! current-thread tokio runtime. It owns the receiving end of the
//! invocation queue from the moment it is created, so an invocation sent
//! right after spawning is buffered rather than lost.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::callable::{Args, CallOutcome, Callable, CallableTable, Entry, reconstruct};
use crate::config::ContextSettings;
use crate::error::{Error, Result};
use crate::ipc::channel::ContextPort;
use crate::ipc::protocol::{self, Invocation, Reply};

/// Everything a context thread starts with.
pub(crate) struct Bootstrap {
    pub generation: u64,
    pub table: CallableTable,
    pub settings: ContextSettings,
    pub port: ContextPort,
    pub cancel: CancellationToken,
}

/// How one invocation ended inside the context.
enum Completion {
    Returned(CallOutcome),
    Panicked(String),
    Cancelled,
}

/// Spawn the context thread and wait until its runtime is up.
///
/// # Errors
/// Returns `Spawn` if the thread cannot be created or its runtime fails to build.
pub(crate) fn spawn(boot: Bootstrap) -> Result<std::thread::JoinHandle<()>> {
    let (init_tx, init_rx) = std::sync::mpsc::channel::<std::result::Result<(), String>>();

    let mut builder = std::thread::Builder::new().name(format!(
        "{}-{}",
        boot.settings.thread_name, boot.generation
    ));
    if let Some(size) = boot.settings.stack_size {
        builder = builder.stack_size(size);
    }

    let thread = builder
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => {
                    let _ = init_tx.send(Ok(()));
                    runtime
                }
                Err(e) => {
                    let _ = init_tx.send(Err(e.to_string()));
                    return;
                }
            };

            let generation = boot.generation;
            let mut context = ExecutionContext::new(boot);
            runtime.block_on(context.run());
            tracing::debug!(generation, "execution context exited");
        })
        .map_err(|e| Error::Spawn(format!("Failed to spawn context thread: {}", e)))?;

    match init_rx.recv() {
        Ok(Ok(())) => Ok(thread),
        Ok(Err(message)) => Err(Error::Spawn(format!(
            "Failed to build context runtime: {}",
            message
        ))),
        Err(_) => Err(Error::Spawn(
            "context thread exited during startup".to_string(),
        )),
    }
}

struct ExecutionContext {
    generation: u64,
    table: CallableTable,
    max_envelope_bytes: usize,
    port: ContextPort,
    cancel: CancellationToken,
}

impl ExecutionContext {
    fn new(boot: Bootstrap) -> Self {
        Self {
            generation: boot.generation,
            table: boot.table,
            max_envelope_bytes: boot.settings.max_envelope_bytes,
            port: boot.port,
            cancel: boot.cancel,
        }
    }

    async fn run(&mut self) {
        loop {
            let envelope = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                envelope = self.port.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            if !self.handle(envelope).await {
                break;
            }
        }
    }

    /// Handle one envelope. Returns `false` when the context must stop.
    async fn handle(&mut self, envelope: Vec<u8>) -> bool {
        let invocation: Invocation = match protocol::decode(&envelope) {
            Ok(invocation) => invocation,
            Err(e) => {
                self.port.fault(None, e.to_string());
                return true;
            }
        };

        let id = invocation.id;
        let Some(callable) = reconstruct(&invocation.callable, &self.table) else {
            self.port.fault(
                Some(id),
                format!(
                    "callable `{}` is not registered in this execution context",
                    invocation.callable.name()
                ),
            );
            return true;
        };

        tracing::trace!(
            generation = self.generation,
            invocation = id,
            callable = callable.name(),
            "invoking"
        );

        match self.invoke(callable, invocation.payload.into_args()).await {
            Completion::Returned(outcome) => {
                match protocol::encode(&Reply::from_outcome(id, outcome), self.max_envelope_bytes) {
                    Ok(bytes) => self.port.reply(bytes),
                    Err(e) => self.port.fault(Some(id), e.to_string()),
                }
                true
            }
            Completion::Panicked(message) => {
                self.port.fault(
                    Some(id),
                    format!("callable `{}` panicked: {}", callable.name(), message),
                );
                true
            }
            Completion::Cancelled => false,
        }
    }

    async fn invoke(&self, callable: Callable, args: Args) -> Completion {
        match callable.entry() {
            Entry::Blocking(f) => {
                completion(std::panic::catch_unwind(AssertUnwindSafe(|| f(args))))
            }
            Entry::Cancellable(f) => {
                let token = self.cancel.child_token();
                completion(std::panic::catch_unwind(AssertUnwindSafe(|| f(args, token))))
            }
            Entry::Future(f) => {
                let fut = AssertUnwindSafe(async move { f(args).await }).catch_unwind();
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Completion::Cancelled,
                    result = fut => completion(result),
                }
            }
        }
    }
}

fn completion(result: std::thread::Result<CallOutcome>) -> Completion {
    match result {
        Ok(outcome) => Completion::Returned(outcome),
        Err(payload) => Completion::Panicked(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
