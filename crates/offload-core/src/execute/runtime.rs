//! Caller-side task spawning.
//!
//! Reply pumps run on the caller's tokio runtime when there is one. Callers
//! outside tokio, and contexts shared across callers, use a small shared
//! runtime built on first use.

use std::future::Future;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

fn runtime_handle() -> tokio::runtime::Handle {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        return handle;
    }
    global_handle()
}

fn global_handle() -> tokio::runtime::Handle {
    static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
    let runtime = GLOBAL_RT.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(1)
            .thread_name("offload-reply-pump")
            .build()
            .expect("failed to build offload reply-pump runtime")
    });
    runtime.handle().clone()
}

/// Spawn a caller-side task.
pub(crate) fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    runtime_handle().spawn(fut)
}

/// Spawn a task on the shared runtime, regardless of the caller's runtime.
///
/// Used for tasks that must outlive whichever runtime created them.
pub(crate) fn spawn_global<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    global_handle().spawn(fut)
}
