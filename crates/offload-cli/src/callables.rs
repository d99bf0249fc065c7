//! Built-in demo callables.

use std::time::Duration;

use offload::prelude::*;

/// Sum of `0..n`.
#[offload::callable]
pub fn sum_range(n: u64) -> u64 {
    (0..n).sum()
}

/// Always fails with the given message.
#[offload::callable]
pub fn fail(message: String) -> Result<Value, String> {
    Err(message)
}

/// Returns its input unchanged.
#[offload::callable]
pub fn echo(value: Value) -> Value {
    value
}

/// Busy-waits until killed or until `max_ms` elapses; returns elapsed ms.
#[offload::callable(cancellable)]
pub fn spin(max_ms: u64, token: CancellationToken) -> u64 {
    let start = std::time::Instant::now();
    let limit = Duration::from_millis(max_ms);
    while !token.is_cancelled() && start.elapsed() < limit {
        std::thread::sleep(Duration::from_millis(1));
    }
    start.elapsed().as_millis() as u64
}

/// Sleeps asynchronously for `ms` milliseconds.
#[offload::callable]
pub async fn nap(ms: u64) -> u64 {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    ms
}

/// Name, argument summary and description of each built-in callable.
pub const CATALOG: &[(Callable, &str, &str)] = &[
    (SUM_RANGE, "N", "sum of 0..N"),
    (FAIL, "MESSAGE", "fail with MESSAGE"),
    (ECHO, "VALUE", "return VALUE unchanged"),
    (SPIN, "MAX_MS", "busy-wait until killed or MAX_MS elapses"),
    (NAP, "MS", "sleep asynchronously for MS milliseconds"),
];

/// Table holding every built-in callable.
pub fn table() -> offload::Result<CallableTable> {
    CallableTable::new(CATALOG.iter().map(|(callable, _, _)| *callable))
}

/// Look up a built-in callable by name.
pub fn find(name: &str) -> Option<Callable> {
    CATALOG
        .iter()
        .map(|(callable, _, _)| *callable)
        .find(|callable| callable.name() == name)
}
