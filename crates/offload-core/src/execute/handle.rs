//! Caller-side handle to one execution context.
//!
//! A [`ContextHandle`] owns everything the caller holds for a context: the
//! invocation sender, the single pending-result slot, the reply pump that
//! settles it, the cancellation token and the thread's join handle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::context::{self, Bootstrap};
use super::runtime;
use crate::callable::{CallableSource, CallableTable};
use crate::config::ContextSettings;
use crate::dispatch::pending::{Pending, PendingResult};
use crate::dispatch::status::{Status, StatusCell};
use crate::error::{Error, Result};
use crate::ipc::channel::{self, ContextEvent, InvocationSender};
use crate::ipc::protocol::{self, Invocation, Payload, Reply};

/// Process-wide context generation counter; the first context is generation 1.
static GENERATIONS: AtomicU64 = AtomicU64::new(0);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpawnMode {
    Owned,
    Ephemeral,
    Shared,
}

/// State shared between the handle and its reply pump.
struct Shared {
    generation: u64,
    slot: Mutex<Option<Pending>>,
    sender: Mutex<Option<InvocationSender>>,
    cancel: CancellationToken,
    terminated: AtomicBool,
    /// Tear the context down after the first settled invocation.
    ephemeral: bool,
}

impl Shared {
    /// Take the pending invocation and settle it while the slot is locked.
    ///
    /// `id` selects a specific invocation; `None` takes whatever is waiting.
    /// Settling writes the owner's status, so it happens under the lock: a
    /// concurrent kill either finds the invocation or runs after its status
    /// was written.
    fn settle_slot(&self, id: Option<u64>, settle: impl FnOnce(Pending)) -> bool {
        let mut slot = lock(&self.slot);
        let matches = match id {
            Some(id) => slot.as_ref().is_some_and(|pending| pending.id() == id),
            None => slot.is_some(),
        };
        if !matches {
            return false;
        }
        if let Some(pending) = slot.take() {
            settle(pending);
        }
        true
    }

    /// Stop listening: drop the sender, cancel the context, abandon the slot.
    ///
    /// Returns `false` if the context was already shut down.
    fn shutdown(&self) -> bool {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel.cancel();
        lock(&self.sender).take();
        // Dropping the pending sender settles the caller with `Abandoned`.
        drop(lock(&self.slot).take());
        true
    }

    /// Route one context event to the pending slot.
    ///
    /// Returns whether an invocation was settled.
    fn settle(&self, event: ContextEvent) -> bool {
        match event {
            ContextEvent::Reply(bytes) => match protocol::decode::<Reply>(&bytes) {
                Ok(reply) => {
                    let id = reply.id;
                    let settled = self.settle_slot(Some(id), |pending| {
                        match reply.into_outcome() {
                            Ok(value) => pending.resolve(value),
                            Err(message) => pending.reject(Error::Execution(message)),
                        }
                    });
                    if !settled {
                        tracing::debug!(
                            generation = self.generation,
                            invocation = id,
                            "dropping reply for a superseded invocation"
                        );
                    }
                    settled
                }
                Err(e) => self.settle_slot(None, |pending| {
                    pending.reject(Error::ChannelFault(format!("malformed reply: {}", e)));
                }),
            },
            ContextEvent::Fault { id, message } => {
                tracing::warn!(
                    generation = self.generation,
                    invocation = ?id,
                    %message,
                    "execution context fault"
                );
                self.settle_slot(id, |pending| pending.reject(Error::ChannelFault(message)))
            }
        }
    }
}

/// Reply pump: settles the pending slot from context events.
async fn pump(shared: Arc<Shared>, mut events: UnboundedReceiver<ContextEvent>) {
    while let Some(event) = events.recv().await {
        if shared.settle(event) && shared.ephemeral {
            shared.shutdown();
            tracing::debug!(
                generation = shared.generation,
                "per-call execution context retired"
            );
            return;
        }
    }

    // The context thread is gone. Unless we tore it down ourselves, whoever
    // is waiting on it will never hear back.
    if shared.terminated.load(Ordering::Acquire) {
        return;
    }
    shared.settle_slot(None, |pending| {
        tracing::warn!(
            generation = shared.generation,
            "execution context exited unexpectedly"
        );
        pending.reject(Error::ChannelFault(
            "execution context exited unexpectedly".to_string(),
        ));
    });
}

/// Handle to a running execution context.
///
/// Dropping the last handle terminates the context.
pub struct ContextHandle {
    shared: Arc<Shared>,
    next_invocation: AtomicU64,
    max_envelope_bytes: usize,
    pump: Mutex<Option<JoinHandle<()>>>,
    thread: std::thread::JoinHandle<()>,
}

impl ContextHandle {
    /// Spawn a long-lived execution context owned by one dispatcher.
    pub fn spawn(table: &CallableTable, settings: &ContextSettings) -> Result<Arc<Self>> {
        Self::spawn_with(table, settings, SpawnMode::Owned)
    }

    /// Spawn a context that retires after its first settled invocation.
    pub fn spawn_ephemeral(table: &CallableTable, settings: &ContextSettings) -> Result<Arc<Self>> {
        Self::spawn_with(table, settings, SpawnMode::Ephemeral)
    }

    /// Spawn a context meant to be shared by many dispatchers.
    ///
    /// Its reply pump runs on the shared runtime so the context keeps
    /// working after the runtime that created it shuts down.
    pub fn spawn_shared(table: &CallableTable, settings: &ContextSettings) -> Result<Arc<Self>> {
        Self::spawn_with(table, settings, SpawnMode::Shared)
    }

    fn spawn_with(
        table: &CallableTable,
        settings: &ContextSettings,
        mode: SpawnMode,
    ) -> Result<Arc<Self>> {
        let ephemeral = mode == SpawnMode::Ephemeral;
        let generation = GENERATIONS.fetch_add(1, Ordering::AcqRel) + 1;
        let (caller, port) = channel::open();
        let (sender, events) = caller.split();
        let cancel = CancellationToken::new();

        let thread = context::spawn(Bootstrap {
            generation,
            table: table.clone(),
            settings: settings.clone(),
            port,
            cancel: cancel.clone(),
        })?;

        let shared = Arc::new(Shared {
            generation,
            slot: Mutex::new(None),
            sender: Mutex::new(Some(sender)),
            cancel,
            terminated: AtomicBool::new(false),
            ephemeral,
        });
        let replies = pump(Arc::clone(&shared), events);
        let pump = match mode {
            SpawnMode::Shared => runtime::spawn_global(replies),
            SpawnMode::Owned | SpawnMode::Ephemeral => runtime::spawn(replies),
        };

        tracing::debug!(generation, ?mode, "execution context spawned");

        Ok(Arc::new(Self {
            shared,
            next_invocation: AtomicU64::new(0),
            max_envelope_bytes: settings.max_envelope_bytes,
            pump: Mutex::new(Some(pump)),
            thread,
        }))
    }

    /// Generation number identifying this context.
    pub fn generation(&self) -> u64 {
        self.shared.generation
    }

    /// Send an invocation, installing its pending result in the slot.
    ///
    /// Any invocation already waiting in the slot is settled as
    /// [`Error::Superseded`]. `status` is moved to `Running` and from then on
    /// follows the invocation's outcome.
    ///
    /// # Errors
    /// Returns `Serialization` if the envelope cannot be encoded (status
    /// untouched) and `ChannelFault` if the context no longer accepts
    /// invocations (status set to `Error`).
    pub fn invoke(
        &self,
        callable: CallableSource,
        payload: Payload,
        status: &StatusCell,
    ) -> Result<PendingResult> {
        if self.is_terminated() {
            return Err(Error::NotInitialized);
        }

        let id = self.next_invocation.fetch_add(1, Ordering::AcqRel) + 1;
        let envelope = protocol::encode(
            &Invocation {
                id,
                callable,
                payload,
            },
            self.max_envelope_bytes,
        )?;

        let (pending, result) = Pending::new(id, status.clone());
        // The slot is filled before the envelope goes out so a fast reply
        // always finds its pending result.
        {
            let mut slot = lock(&self.shared.slot);
            status.set(Status::Running);
            if let Some(replaced) = slot.replace(pending) {
                tracing::debug!(
                    generation = self.shared.generation,
                    superseded = replaced.id(),
                    by = id,
                    "pending invocation superseded"
                );
                replaced.supersede(status);
            }
        }

        let sent = lock(&self.shared.sender)
            .as_ref()
            .is_some_and(|sender| sender.send(envelope).is_ok());
        if !sent {
            self.shared.settle_slot(Some(id), drop);
            status.set(Status::Error);
            return Err(Error::ChannelFault(
                "execution context is no longer accepting invocations".to_string(),
            ));
        }

        tracing::trace!(
            generation = self.shared.generation,
            invocation = id,
            "invocation sent"
        );
        Ok(result)
    }

    /// Settle the pending invocation, if any, as superseded by `by`.
    pub(crate) fn supersede_pending(&self, by: &StatusCell) {
        self.shared.settle_slot(None, |stale| stale.supersede(by));
    }

    /// Abandon the pending invocation if it was installed by `status`'s owner.
    pub(crate) fn abandon_owned_by(&self, status: &StatusCell) {
        let mut slot = lock(&self.shared.slot);
        if slot.as_ref().is_some_and(|pending| pending.belongs_to(status)) {
            slot.take();
        }
    }

    /// Terminate the context.
    ///
    /// Stops listening immediately: the pending invocation is abandoned, the
    /// reply pump is stopped and the context's cancellation token fires.
    /// Work already running on the context thread is not interrupted unless
    /// it observes the token; its result is discarded. Safe to call more
    /// than once.
    pub fn terminate(&self) {
        if !self.shared.shutdown() {
            return;
        }
        if let Some(pump) = lock(&self.pump).take() {
            pump.abort();
        }
        // The thread is not joined; it exits on its own once it notices the
        // closed channel or the cancellation.
        tracing::debug!(
            generation = self.shared.generation,
            "execution context terminated"
        );
    }

    /// Whether [`terminate`](Self::terminate) has run (or the context retired).
    pub fn is_terminated(&self) -> bool {
        self.shared.terminated.load(Ordering::Acquire)
    }

    /// Whether the context thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Whether an invocation is waiting for its reply.
    pub fn has_pending(&self) -> bool {
        lock(&self.shared.slot).is_some()
    }

    /// Detach a clone of the cancellation token observed by the context.
    pub fn cancellation(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("generation", &self.shared.generation)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::{Args, CallOutcome, Callable};
    use serde_json::json;
    use std::time::Duration;

    fn echo(args: Args) -> CallOutcome {
        Ok(json!(args.into_inner()))
    }

    fn table() -> CallableTable {
        CallableTable::new([Callable::blocking("echo", echo)]).unwrap()
    }

    fn args(values: Vec<serde_json::Value>) -> Payload {
        Payload::Arguments { arguments: values }
    }

    #[tokio::test]
    async fn test_invoke_round_trip() {
        let handle = ContextHandle::spawn(&table(), &ContextSettings::default()).unwrap();
        let status = StatusCell::new();

        let result = handle
            .invoke("echo".into(), args(vec![json!(1)]), &status)
            .unwrap();
        assert_eq!(status.get(), Status::Running);
        assert_eq!(result.await.unwrap(), json!([1]));
        assert_eq!(status.get(), Status::Idle);
        assert!(!handle.has_pending());
    }

    #[tokio::test]
    async fn test_generations_increase() {
        let a = ContextHandle::spawn(&table(), &ContextSettings::default()).unwrap();
        let b = ContextHandle::spawn(&table(), &ContextSettings::default()).unwrap();
        assert!(b.generation() > a.generation());
    }

    #[tokio::test]
    async fn test_terminate_abandons_pending() {
        let handle = ContextHandle::spawn(&table(), &ContextSettings::default()).unwrap();
        let status = StatusCell::new();

        let mut result = handle.invoke("echo".into(), args(vec![]), &status).unwrap();
        handle.terminate();
        handle.terminate();

        assert!(handle.is_terminated());
        assert!(matches!(result.try_result(), Some(Err(Error::Abandoned))));
        assert!(matches!(
            handle.invoke("echo".into(), args(vec![]), &status),
            Err(Error::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_terminate_fires_cancellation() {
        let handle = ContextHandle::spawn(&table(), &ContextSettings::default()).unwrap();
        let token = handle.cancellation();
        assert!(!token.is_cancelled());

        handle.terminate();
        assert!(token.is_cancelled());
        tokio::time::timeout(Duration::from_secs(5), async {
            while !handle.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("context thread did not exit");
    }

    #[tokio::test]
    async fn test_ephemeral_retires_after_reply() {
        let handle = ContextHandle::spawn_ephemeral(&table(), &ContextSettings::default()).unwrap();
        let status = StatusCell::new();

        let result = handle
            .invoke("echo".into(), args(vec![json!("x")]), &status)
            .unwrap();
        assert_eq!(result.await.unwrap(), json!(["x"]));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !handle.is_terminated() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("ephemeral context did not retire");
    }

    #[tokio::test]
    async fn test_abandon_owned_by_only_touches_own_invocation() {
        let handle = ContextHandle::spawn(&table(), &ContextSettings::default()).unwrap();
        let owner = StatusCell::new();
        let stranger = StatusCell::new();

        // The pump shares this current-thread runtime, so nothing settles
        // until the test yields.
        let mut result = handle.invoke("echo".into(), args(vec![]), &owner).unwrap();
        handle.abandon_owned_by(&stranger);
        assert!(handle.has_pending());
        handle.abandon_owned_by(&owner);
        assert!(!handle.has_pending());
        assert!(matches!(result.try_result(), Some(Err(Error::Abandoned))));
    }
}
