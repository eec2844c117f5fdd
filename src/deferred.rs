//! Deferred results: the single completion primitive behind every store
//! operation.
//!
//! A [`Deferred<T>`] resolves exactly once. Callers either `.await` it or
//! hand it a callback with [`Deferred::on_complete`]; both consume the
//! deferred, so one result can never be delivered through both paths.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Eventually-available outcome of a store operation.
///
/// Dropping a `Deferred` does not cancel the operation; it still runs to
/// completion, its result is simply discarded.
#[must_use = "a deferred result does nothing unless awaited or given a callback"]
pub struct Deferred<T> {
    rx: oneshot::Receiver<Result<T>>,
    handle: Handle,
}

/// Producer side of a [`Deferred`].
pub(crate) struct Completer<T> {
    tx: oneshot::Sender<Result<T>>,
}

impl<T> Completer<T> {
    /// Delivers the result. Consuming `self` guarantees a single delivery.
    pub(crate) fn complete(self, result: Result<T>) {
        // The receiver is gone only if the caller dropped the deferred.
        let _ = self.tx.send(result);
    }
}

impl<T> Deferred<T> {
    /// Creates a linked completer/deferred pair.
    pub(crate) fn pair(handle: Handle) -> (Completer<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (Completer { tx }, Self { rx, handle })
    }

    /// Creates a deferred that is already resolved.
    pub(crate) fn resolved(handle: Handle, result: Result<T>) -> Self {
        let (completer, deferred) = Self::pair(handle);
        completer.complete(result);
        deferred
    }
}

impl<T: Send + 'static> Deferred<T> {
    /// Delivers the result to `callback` instead of awaiting it.
    ///
    /// The callback runs exactly once, on the store's runtime.
    pub fn on_complete<F>(self, callback: F)
    where
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let handle = self.handle.clone();
        handle.spawn(async move {
            callback(self.await);
        });
    }
}

impl<T> Future for Deferred<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(Error::Closed)))
    }
}
