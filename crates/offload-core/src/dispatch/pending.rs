//! Pending results and the single reply slot they are settled from.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;

use super::status::{Status, StatusCell};
use crate::error::{Error, Result};

/// Caller-facing handle to the eventual result of one dispatch.
///
/// Resolves to the callable's return value, or to the error that ended the
/// invocation. If the execution context is torn down before it replies, the
/// handle resolves to [`Error::Abandoned`].
#[derive(Debug)]
#[must_use = "a pending result does nothing unless awaited"]
pub struct PendingResult {
    invocation: u64,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingResult {
    pub(crate) fn new(invocation: u64, rx: oneshot::Receiver<Result<Value>>) -> Self {
        Self { invocation, rx }
    }

    /// Invocation number this handle waits on.
    pub fn invocation_id(&self) -> u64 {
        self.invocation
    }

    /// Take the result if it has already settled, without waiting.
    pub fn try_result(&mut self) -> Option<Result<Value>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(Error::Abandoned)),
        }
    }

    /// Await the result and decode it into `T`.
    pub async fn into_typed<T: DeserializeOwned>(self) -> Result<T> {
        let value = self.await?;
        serde_json::from_value(value)
            .map_err(|e| Error::Deserialization(format!("Failed to decode result: {}", e)))
    }
}

impl Future for PendingResult {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// The one outstanding invocation of an execution context.
///
/// Settling always updates the owning dispatcher's status before waking the
/// caller, so a caller that has awaited its result observes the final status.
#[derive(Debug)]
pub(crate) struct Pending {
    id: u64,
    tx: oneshot::Sender<Result<Value>>,
    status: StatusCell,
}

impl Pending {
    pub(crate) fn new(id: u64, status: StatusCell) -> (Self, PendingResult) {
        let (tx, rx) = oneshot::channel();
        (Self { id, tx, status }, PendingResult::new(id, rx))
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn belongs_to(&self, status: &StatusCell) -> bool {
        self.status.same_as(status)
    }

    /// Settle with the callable's return value.
    pub(crate) fn resolve(self, value: Value) {
        self.status.set(Status::Idle);
        let _ = self.tx.send(Ok(value));
    }

    /// Settle with a failure.
    pub(crate) fn reject(self, error: Error) {
        self.status.set(Status::Error);
        let _ = self.tx.send(Err(error));
    }

    /// Settle as replaced by a newer invocation installed by `by`.
    pub(crate) fn supersede(self, by: &StatusCell) {
        if !self.status.same_as(by) {
            self.status.set(Status::Idle);
        }
        let _ = self.tx.send(Err(Error::Superseded {
            invocation: self.id,
        }));
    }
}
