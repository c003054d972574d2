//! Externally settled promises.
//!
//! A [`Deferred`] is handed to whoever performs the work; the matching
//! [`Promise`] is handed to every caller waiting on that work. Settling
//! consumes the deferred, so a request can only ever be settled once.

use crate::error::{FetchError, FetchResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// The settling half of a pending request.
///
/// Dropping a `Deferred` without settling it rejects its promise with
/// [`FetchError::Abandoned`].
pub struct Deferred<T> {
    sender: oneshot::Sender<FetchResult<T>>,
    promise: Promise<T>,
}

impl<T> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an unsettled deferred and its promise.
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        let future = async move { receiver.await.unwrap_or(Err(FetchError::Abandoned)) };
        Self {
            sender,
            promise: Promise(future.boxed().shared()),
        }
    }

    /// Returns a handle to the promise this deferred settles.
    pub fn promise(&self) -> Promise<T> {
        self.promise.clone()
    }

    /// Resolves the promise with `value`.
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    /// Rejects the promise with `error`.
    pub fn reject(self, error: FetchError) {
        self.settle(Err(error));
    }

    /// Settles with a ready-made result.
    pub fn settle(self, result: FetchResult<T>) {
        // Nobody listening is fine: the caller dropped its promise.
        let _ = self.sender.send(result);
    }
}

impl<T> Default for Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

/// A cloneable handle that resolves once the backing [`Deferred`] settles.
///
/// Every clone observes the same result.
pub struct Promise<T>(Shared<BoxFuture<'static, FetchResult<T>>>);

impl<T> Promise<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A promise that is already resolved.
    pub fn resolved(value: T) -> Self {
        Self(futures::future::ready(Ok(value)).boxed().shared())
    }

    /// A promise that is already rejected.
    pub fn rejected(error: FetchError) -> Self {
        Self(futures::future::ready(Err(error)).boxed().shared())
    }

    /// Returns the result if some clone of this promise has already been
    /// polled to completion.
    pub fn peek(&self) -> Option<&FetchResult<T>> {
        self.0.peek()
    }

    /// Whether two handles share one underlying request.
    pub fn same_as(&self, other: &Self) -> bool {
        self.0.ptr_eq(&other.0)
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}

impl<T> Future for Promise<T>
where
    T: Clone,
{
    type Output = FetchResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}
