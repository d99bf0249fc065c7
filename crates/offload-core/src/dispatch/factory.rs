//! Dispatcher factories and the shared singleton context.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::dispatcher::Dispatcher;
use crate::callable::{Callable, CallableTable, serialize};
use crate::config::{ContextSettings, DispatcherConfig};
use crate::error::{Error, Result};
use crate::execute::ContextHandle;

/// One execution context shared by every dispatcher of a factory.
///
/// Spawned lazily by the first singleton dispatcher to attach. Dispatchers
/// hold it while attached; killing a dispatcher only releases its hold.
#[derive(Clone, Default)]
pub struct SharedContext {
    slot: Arc<Mutex<Option<Arc<ContextHandle>>>>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the live context, spawning it on first use.
    pub(crate) fn acquire(
        &self,
        table: &CallableTable,
        settings: &ContextSettings,
    ) -> Result<Arc<ContextHandle>> {
        let mut slot = self.lock();
        if let Some(context) = slot.as_ref().filter(|context| !context.is_terminated()) {
            return Ok(Arc::clone(context));
        }

        let context = ContextHandle::spawn_shared(table, settings)?;
        tracing::debug!(
            generation = context.generation(),
            "shared execution context created"
        );
        *slot = Some(Arc::clone(&context));
        Ok(context)
    }

    /// Whether the shared context is currently up.
    pub fn is_spawned(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|context| !context.is_terminated())
    }

    /// Generation of the shared context, if it is up.
    pub fn generation(&self) -> Option<u64> {
        self.lock()
            .as_ref()
            .filter(|context| !context.is_terminated())
            .map(|context| context.generation())
    }

    /// Number of dispatchers currently holding the context.
    pub fn holders(&self) -> usize {
        self.lock()
            .as_ref()
            .map_or(0, |context| Arc::strong_count(context) - 1)
    }

    /// Terminate the shared context.
    ///
    /// # Errors
    /// Returns `SharedContextInUse` while any dispatcher still holds it.
    pub fn shutdown(&self) -> Result<()> {
        let mut slot = self.lock();
        let holders = slot
            .as_ref()
            .map_or(0, |context| Arc::strong_count(context) - 1);
        if holders > 0 {
            return Err(Error::SharedContextInUse { holders });
        }
        if let Some(context) = slot.take() {
            context.terminate();
            tracing::debug!(
                generation = context.generation(),
                "shared execution context shut down"
            );
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<ContextHandle>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedContext")
            .field("generation", &self.generation())
            .field("holders", &self.holders())
            .finish()
    }
}

/// Builds attached dispatchers for one callable.
///
/// Every dispatcher built by the same factory shares its [`SharedContext`]
/// when the lifecycle is singleton. Keep the factory in a `static` to share
/// one context across the whole process.
#[derive(Debug)]
pub struct DispatcherFactory {
    table: CallableTable,
    config: DispatcherConfig,
    callable: Callable,
    shared: SharedContext,
}

impl DispatcherFactory {
    /// # Errors
    /// Returns `Config` for an invalid configuration and
    /// `SerializationUnsupported` if `callable` is not in `table`.
    pub fn new(table: CallableTable, config: DispatcherConfig, callable: Callable) -> Result<Self> {
        config.validate()?;
        serialize(&callable, &table)?;
        Ok(Self {
            table,
            config,
            callable,
            shared: SharedContext::new(),
        })
    }

    /// Build a dispatcher and attach it.
    pub fn dispatcher(&self) -> Result<Dispatcher> {
        let dispatcher = Dispatcher::build(
            self.table.clone(),
            self.config.clone(),
            Some(self.shared.clone()),
        )?;
        dispatcher.attach(Some(self.callable))?;
        Ok(dispatcher)
    }

    /// Callable every dispatcher from this factory is bound to.
    pub fn callable(&self) -> Callable {
        self.callable
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// The context shared by this factory's singleton dispatchers.
    pub fn shared_context(&self) -> &SharedContext {
        &self.shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::{Args, CallOutcome};
    use crate::config::Lifecycle;
    use serde_json::json;

    fn echo(args: Args) -> CallOutcome {
        Ok(json!(args.into_inner()))
    }

    fn factory() -> DispatcherFactory {
        let echo = Callable::blocking("echo", echo);
        DispatcherFactory::new(
            CallableTable::new([echo]).unwrap(),
            DispatcherConfig::with_lifecycle(Lifecycle::Singleton),
            echo,
        )
        .unwrap()
    }

    #[test]
    fn test_factory_rejects_foreign_callable() {
        let err = DispatcherFactory::new(
            CallableTable::default(),
            DispatcherConfig::default(),
            Callable::blocking("echo", echo),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SerializationUnsupported { .. }));
    }

    #[tokio::test]
    async fn test_dispatchers_inherit_factory_binding() {
        let factory = factory();
        assert_eq!(factory.callable().name(), "echo");
        assert_eq!(factory.config().lifecycle, Lifecycle::Singleton);

        let dispatcher = factory.dispatcher().unwrap();
        assert_eq!(dispatcher.callable_name(), Some(factory.callable().name()));
        assert_eq!(dispatcher.lifecycle(), factory.config().lifecycle);
        assert_eq!(dispatcher.config(), factory.config());
    }

    #[tokio::test]
    async fn test_singletons_share_one_context() {
        let factory = factory();
        assert!(!factory.shared_context().is_spawned());

        let a = factory.dispatcher().unwrap();
        let b = factory.dispatcher().unwrap();
        assert_eq!(a.context_id(), b.context_id());
        assert_eq!(factory.shared_context().holders(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_refused_while_held() {
        let factory = factory();
        let a = factory.dispatcher().unwrap();

        assert!(matches!(
            factory.shared_context().shutdown(),
            Err(Error::SharedContextInUse { holders: 1 })
        ));

        a.kill();
        assert!(factory.shared_context().is_spawned());
        factory.shared_context().shutdown().unwrap();
        assert!(!factory.shared_context().is_spawned());
    }
}
