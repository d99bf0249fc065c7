//! The dispatcher: one callable bound to an execution context.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::watch;

use super::factory::SharedContext;
use super::pending::PendingResult;
use super::status::{Status, StatusCell};
use super::trigger::Trigger;
use crate::callable::{Callable, CallableSource, CallableTable, serialize};
use crate::config::{ArgumentShape, DispatcherConfig, Lifecycle};
use crate::error::{Error, Result};
use crate::execute::ContextHandle;
use crate::ipc::protocol::Payload;

#[derive(Default)]
struct State {
    callable: Option<Callable>,
    source: Option<CallableSource>,
    attached: bool,
    context: Option<Arc<ContextHandle>>,
    trigger: Trigger,
}

/// Runs one callable on an isolated execution context.
///
/// A dispatcher is created detached. [`attach`](Self::attach) binds the
/// callable and, depending on the lifecycle, brings up the context;
/// [`dispatch`](Self::dispatch) sends an invocation and returns a
/// [`PendingResult`]; [`kill`](Self::kill) tears the context down.
///
/// At most one invocation is outstanding per dispatcher. Dispatching again
/// before the previous result arrives settles the earlier result as
/// [`Error::Superseded`].
pub struct Dispatcher {
    table: CallableTable,
    config: DispatcherConfig,
    status: StatusCell,
    shared: Option<SharedContext>,
    state: Mutex<State>,
}

impl Dispatcher {
    /// Create a detached dispatcher.
    ///
    /// # Errors
    /// Returns `Config` if the configuration is invalid, or
    /// `InvalidOperation` for the singleton lifecycle, which needs a
    /// [`DispatcherFactory`](super::DispatcherFactory) to share its context.
    pub fn new(table: CallableTable, config: DispatcherConfig) -> Result<Self> {
        if config.lifecycle == Lifecycle::Singleton {
            return Err(Error::InvalidOperation(
                "the singleton lifecycle requires a DispatcherFactory".to_string(),
            ));
        }
        Self::build(table, config, None)
    }

    pub(crate) fn build(
        table: CallableTable,
        config: DispatcherConfig,
        shared: Option<SharedContext>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            table,
            config,
            status: StatusCell::new(),
            shared,
            state: Mutex::new(State::default()),
        })
    }

    /// Configuration this dispatcher was built with.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.config.lifecycle
    }

    /// Bind a callable and bring the dispatcher up.
    ///
    /// Passing `None` re-attaches the previously bound callable. Under the
    /// eager lifecycle this spawns the context; under singleton it joins the
    /// shared one. Per-call and gated dispatchers spawn later. Attaching an
    /// already attached dispatcher keeps its context. Spawning waits on the
    /// calling thread until the context's runtime is up.
    ///
    /// # Errors
    /// - `NoCallable` if nothing was ever bound
    /// - `SerializationUnsupported` if the callable is not in the table
    /// - `Spawn` if the context cannot be started
    pub fn attach(&self, callable: Option<Callable>) -> Result<()> {
        let mut state = self.lock_state();

        if let Some(callable) = callable {
            let source = serialize(&callable, &self.table)?;
            state.callable = Some(callable);
            state.source = Some(source);
        }
        let Some(callable) = state.callable else {
            return Err(Error::NoCallable);
        };

        match self.config.lifecycle {
            Lifecycle::Eager => {
                if live_context(&state).is_none() {
                    state.context = Some(ContextHandle::spawn(&self.table, &self.config.context)?);
                }
            }
            Lifecycle::Singleton => {
                if live_context(&state).is_none() {
                    let shared = self.shared.as_ref().ok_or_else(|| {
                        Error::InvalidOperation(
                            "the singleton lifecycle requires a DispatcherFactory".to_string(),
                        )
                    })?;
                    state.context = Some(shared.acquire(&self.table, &self.config.context)?);
                }
            }
            Lifecycle::PerCall | Lifecycle::Gated => {}
        }

        state.attached = true;
        tracing::debug!(
            callable = callable.name(),
            lifecycle = self.config.lifecycle.as_str(),
            "dispatcher attached"
        );
        Ok(())
    }

    /// Send one invocation to the execution context.
    ///
    /// Under a fixed argument shape the call-site `args` are ignored and the
    /// configured input is sent instead.
    ///
    /// Sending never waits for the callable. A per-call dispatcher starts its
    /// fresh context here, so the calling thread briefly blocks until the new
    /// context thread reports that its runtime is up.
    ///
    /// # Errors
    /// Returns `NotInitialized` when there is no live context, leaving the
    /// status untouched. See [`ContextHandle::invoke`] for the rest.
    pub fn dispatch(&self, args: Vec<Value>) -> Result<PendingResult> {
        let mut state = self.lock_state();
        let source = match (&state.source, state.attached) {
            (Some(source), true) => source.clone(),
            _ => return Err(Error::NotInitialized),
        };

        let context = match self.config.lifecycle {
            Lifecycle::PerCall => {
                let fresh = ContextHandle::spawn_ephemeral(&self.table, &self.config.context)?;
                if let Some(previous) = state.context.replace(Arc::clone(&fresh)) {
                    previous.supersede_pending(&self.status);
                    previous.terminate();
                }
                fresh
            }
            Lifecycle::Eager | Lifecycle::Singleton | Lifecycle::Gated => {
                match live_context(&state) {
                    Some(context) => Arc::clone(context),
                    None => return Err(Error::NotInitialized),
                }
            }
        };

        context.invoke(source, self.payload(args), &self.status)
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status.get()
    }

    /// Watch status transitions.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Whether the dispatcher is attached.
    pub fn is_attached(&self) -> bool {
        self.lock_state().attached
    }

    /// Name of the bound callable, if any.
    pub fn callable_name(&self) -> Option<&'static str> {
        self.lock_state().callable.map(|callable| callable.name())
    }

    /// Generation of the live context, if one is up.
    pub fn context_id(&self) -> Option<u64> {
        live_context(&self.lock_state()).map(|context| context.generation())
    }

    /// Tear down the execution context and reset status to `Idle`.
    ///
    /// The outstanding result, if any, resolves to [`Error::Abandoned`].
    /// A singleton dispatcher only lets go of the shared context; it stays
    /// up for the other holders. Calling `kill` twice is harmless.
    pub fn kill(&self) {
        let mut state = self.lock_state();
        state.attached = false;
        state.trigger = Trigger::OFF;
        if let Some(context) = state.context.take() {
            self.release(context);
        }
        self.status.set(Status::Idle);
        tracing::debug!(
            lifecycle = self.config.lifecycle.as_str(),
            "dispatcher killed"
        );
    }

    /// Kill the dispatcher and forget its callable.
    pub fn detach(&self) {
        self.kill();
        let mut state = self.lock_state();
        state.callable = None;
        state.source = None;
    }

    /// Feed the gate of a gated dispatcher.
    ///
    /// A falsy trigger stops the context and resets status to `Idle`. A
    /// truthy trigger that differs from the last one restarts the context
    /// and sends the fixed input, returning its pending result. Repeating
    /// the last trigger does nothing.
    ///
    /// Like a per-call dispatch, opening the gate blocks the calling thread
    /// until the restarted context thread has its runtime up.
    ///
    /// # Errors
    /// - `InvalidOperation` unless the lifecycle is gated
    /// - `NotInitialized` for a truthy trigger on a detached dispatcher
    /// - `Spawn` if the context cannot be started
    pub fn set_trigger(&self, trigger: impl Into<Trigger>) -> Result<Option<PendingResult>> {
        if self.config.lifecycle != Lifecycle::Gated {
            return Err(Error::InvalidOperation(format!(
                "set_trigger needs the gated lifecycle, this dispatcher is {}",
                self.config.lifecycle.as_str()
            )));
        }

        let trigger = trigger.into();
        let mut state = self.lock_state();
        if trigger == state.trigger {
            return Ok(None);
        }
        if trigger.is_armed() && !state.attached {
            return Err(Error::NotInitialized);
        }

        state.trigger = trigger;
        if let Some(previous) = state.context.take() {
            previous.terminate();
        }
        if !trigger.is_armed() {
            self.status.set(Status::Idle);
            tracing::debug!("gate closed");
            return Ok(None);
        }

        let source = state.source.clone().ok_or(Error::NoCallable)?;
        let context = ContextHandle::spawn(&self.table, &self.config.context)?;
        state.context = Some(Arc::clone(&context));
        tracing::debug!(
            %trigger,
            generation = context.generation(),
            "gate opened"
        );

        context
            .invoke(source, self.payload(Vec::new()), &self.status)
            .map(Some)
    }

    fn payload(&self, args: Vec<Value>) -> Payload {
        match &self.config.arguments {
            ArgumentShape::Positional => Payload::Arguments { arguments: args },
            ArgumentShape::Fixed { input } => {
                if !args.is_empty() {
                    tracing::debug!(
                        ignored = args.len(),
                        "fixed input configured, ignoring call-site arguments"
                    );
                }
                Payload::Input {
                    input: input.clone(),
                }
            }
        }
    }

    fn release(&self, context: Arc<ContextHandle>) {
        match self.config.lifecycle {
            Lifecycle::Singleton => context.abandon_owned_by(&self.status),
            Lifecycle::Eager | Lifecycle::PerCall | Lifecycle::Gated => context.terminate(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn live_context(state: &State) -> Option<&Arc<ContextHandle>> {
    state
        .context
        .as_ref()
        .filter(|context| !context.is_terminated())
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("lifecycle", &self.config.lifecycle)
            .field("status", &self.status.get())
            .field("context", &self.context_id())
            .finish()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.kill();
    }
}
