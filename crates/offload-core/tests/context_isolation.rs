//! Integration tests for execution context isolation.
//!
//! Tests that callables run on their own thread and that killed contexts
//! actually stop.

use std::time::{Duration, Instant};

use futures::future::LocalBoxFuture;
use offload_core::ipc::Payload;
use offload_core::{
    Args, CallOutcome, Callable, CallableTable, ContextHandle, ContextSettings, Dispatcher,
    DispatcherConfig, Error, Status,
};
use offload_core::dispatch::StatusCell;
use serde_json::json;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Helpers
// =============================================================================

fn thread_name(_: Args) -> CallOutcome {
    Ok(json!(std::thread::current().name().map(str::to_string)))
}

/// Spins until the context is killed.
fn spin(_: Args, token: CancellationToken) -> CallOutcome {
    while !token.is_cancelled() {
        std::thread::sleep(Duration::from_millis(5));
    }
    Err("cancelled".to_string())
}

fn nap(args: Args) -> LocalBoxFuture<'static, CallOutcome> {
    Box::pin(async move {
        let ms: u64 = args.get(0)?;
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(json!(ms))
    })
}

const THREAD_NAME: Callable = Callable::blocking("thread_name", thread_name);
const SPIN: Callable = Callable::cancellable("spin", spin);
const NAP: Callable = Callable::future("nap", nap);

fn table() -> CallableTable {
    CallableTable::new([THREAD_NAME, SPIN, NAP]).unwrap()
}

fn arguments(values: Vec<serde_json::Value>) -> Payload {
    Payload::Arguments { arguments: values }
}

/// Wait until the context thread exits.
async fn wait_finished(handle: &ContextHandle) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !handle.is_finished() {
        assert!(Instant::now() < deadline, "context thread did not exit");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_callable_runs_on_context_thread() {
    let dispatcher = Dispatcher::new(table(), DispatcherConfig::default()).unwrap();
    dispatcher.attach(Some(THREAD_NAME)).unwrap();
    let generation = dispatcher.context_id().unwrap();

    let name = dispatcher.dispatch(vec![]).unwrap().await.unwrap();
    assert_eq!(name, json!(format!("offload-context-{}", generation)));
}

#[tokio::test]
async fn test_thread_name_comes_from_settings() {
    let settings = ContextSettings {
        thread_name: "worker".to_string(),
        ..ContextSettings::default()
    };
    let handle = ContextHandle::spawn(&table(), &settings).unwrap();

    let name = handle
        .invoke("thread_name".into(), arguments(vec![]), &StatusCell::new())
        .unwrap()
        .await
        .unwrap();
    assert_eq!(name, json!(format!("worker-{}", handle.generation())));
}

#[tokio::test]
async fn test_unregistered_callable_faults() {
    let handle = ContextHandle::spawn(&table(), &ContextSettings::default()).unwrap();
    let status = StatusCell::new();

    let err = handle
        .invoke("ghost".into(), arguments(vec![]), &status)
        .unwrap()
        .await
        .unwrap_err();
    match err {
        Error::ChannelFault(message) => assert!(message.contains("`ghost`")),
        other => panic!("Expected ChannelFault, got {:?}", other),
    }
    assert_eq!(status.get(), Status::Error);
}

#[tokio::test]
async fn test_cancellable_callable_stops_on_terminate() {
    let handle = ContextHandle::spawn(&table(), &ContextSettings::default()).unwrap();

    let result = handle
        .invoke("spin".into(), arguments(vec![]), &StatusCell::new())
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let start = Instant::now();
    handle.terminate();
    assert!(matches!(result.await, Err(Error::Abandoned)));
    wait_finished(&handle).await;
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_async_callable_dropped_on_terminate() {
    let handle = ContextHandle::spawn(&table(), &ContextSettings::default()).unwrap();
    let status = StatusCell::new();

    let result = handle
        .invoke("nap".into(), arguments(vec![json!(60_000)]), &status)
        .unwrap();
    handle.terminate();

    assert!(matches!(result.await, Err(Error::Abandoned)));
    wait_finished(&handle).await;
}

#[tokio::test]
async fn test_async_callable_completes() {
    let dispatcher = Dispatcher::new(table(), DispatcherConfig::default()).unwrap();
    dispatcher.attach(Some(NAP)).unwrap();

    let result = dispatcher.dispatch(vec![json!(10)]).unwrap();
    assert_eq!(result.into_typed::<u64>().await.unwrap(), 10);
}

#[tokio::test]
async fn test_oversized_envelope_is_rejected() {
    let settings = ContextSettings {
        max_envelope_bytes: 16,
        ..ContextSettings::default()
    };
    let handle = ContextHandle::spawn(&table(), &settings).unwrap();
    let status = StatusCell::new();

    let oversized = arguments(vec![json!("x".repeat(64))]);
    let err = handle.invoke("nap".into(), oversized, &status).unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
    assert_eq!(status.get(), Status::Idle);
}

#[test]
fn test_dispatch_outside_tokio() {
    let dispatcher = Dispatcher::new(table(), DispatcherConfig::default()).unwrap();
    dispatcher.attach(Some(NAP)).unwrap();

    let result = dispatcher.dispatch(vec![json!(1)]).unwrap();
    let value = futures::executor::block_on(result).unwrap();
    assert_eq!(value, json!(1));
}
