//! How a data set obtains its value.

mod http;

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::errors::FetchError;

pub use http::{ApiClient, AuthExpiry, HttpEndpoint, Payload};

/// Source of a data set's value.
///
/// The returned future must own everything it needs; the cache runs it on
/// its own task so that it completes even if every reader goes away.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(&self) -> BoxFuture<'static, Result<Value, FetchError>>;
}

/// Adapts a closure returning a future into a [`Fetch`].
pub struct FetchFn<F> {
    f: F,
}

impl<F, Fut> Fetch for FetchFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
{
    fn fetch(&self) -> BoxFuture<'static, Result<Value, FetchError>> {
        (self.f)().boxed()
    }
}

/// Wrap a closure as a shareable fetcher.
pub fn fetch_fn<F, Fut>(f: F) -> Arc<dyn Fetch>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
{
    Arc::new(FetchFn { f })
}
