//! Promises for in-flight calls and the scope that drives them.

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, trace};

use super::client::{Client, PipelineClient};
use crate::config::RpcSettings;
use crate::dynamic::DynamicStruct;
use crate::error::{Error, Result, RpcFailure};
use crate::schema::Method;

pub(crate) type CallResult = std::result::Result<Arc<DynamicStruct>, RpcFailure>;

/// Result of a call that may not have arrived yet.
///
/// The underlying future is lazy and shared: nothing runs until the promise
/// is awaited or waited on, and every clone (including pipelined calls
/// queued behind it) observes the same settled result.
#[derive(Clone)]
pub struct RemotePromise {
    method: Method,
    inner: Shared<BoxFuture<'static, CallResult>>,
}

impl RemotePromise {
    pub fn new<F>(method: Method, future: F) -> Self
    where
        F: Future<Output = std::result::Result<DynamicStruct, RpcFailure>> + Send + 'static,
    {
        Self::from_shared(method, future.map(|result| result.map(Arc::new)))
    }

    pub(crate) fn from_shared<F>(method: Method, future: F) -> Self
    where
        F: Future<Output = CallResult> + Send + 'static,
    {
        Self {
            method,
            inner: future.boxed().shared(),
        }
    }

    /// Promise that is already settled.
    pub fn ready(method: Method, result: std::result::Result<DynamicStruct, RpcFailure>) -> Self {
        Self::new(method, futures::future::ready(result))
    }

    pub fn failed(method: Method, failure: RpcFailure) -> Self {
        Self::ready(method, Err(failure))
    }

    /// Method whose results this promise carries.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// True once the result has been computed by some poller.
    pub fn is_settled(&self) -> bool {
        self.inner.peek().is_some()
    }

    pub(crate) fn results(&self) -> Shared<BoxFuture<'static, CallResult>> {
        self.inner.clone()
    }

    pub async fn response(&self) -> Result<Response> {
        let results = self.inner.clone().await?;
        Ok(Response {
            method: self.method.clone(),
            results,
        })
    }

    /// Block on the scope until the promise settles.
    pub fn wait(&self, scope: &WaitScope) -> Result<Response> {
        scope.wait(self.response())
    }

    /// Capability stored in result field `field`, usable before the result
    /// arrives. Calls made on it are queued behind this promise.
    pub fn get(&self, field: &str) -> Client {
        Client::new(PipelineClient::new(self.clone(), field))
    }

    /// Future of the capability in result field `field`.
    pub fn then_project(&self, field: &str) -> BoxFuture<'static, std::result::Result<Client, RpcFailure>> {
        let results = self.inner.clone();
        let field = field.to_string();
        async move {
            let results = results.await?;
            trace!(field = %field, "Projecting capability from results");
            let client = results.get(&field)?.into_capability()?;
            Ok(client)
        }
        .boxed()
    }

    /// Call `method` on the capability at `pivot` once this promise settles.
    pub fn request_and_send(&self, pivot: &str, method: &Method, params: DynamicStruct) -> RemotePromise {
        debug!(promise = %self.method, pivot, method = %method, "Pipelining call");
        self.get(pivot).call(method, params)
    }
}

impl fmt::Debug for RemotePromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemotePromise")
            .field("method", &self.method.to_string())
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Settled results of a call.
#[derive(Debug, Clone)]
pub struct Response {
    method: Method,
    results: Arc<DynamicStruct>,
}

impl Response {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn into_inner(self) -> DynamicStruct {
        Arc::try_unwrap(self.results).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl Deref for Response {
    type Target = DynamicStruct;

    fn deref(&self) -> &DynamicStruct {
        &self.results
    }
}

/// Explicit event loop for blocking waits.
///
/// Wraps a current-thread runtime; nothing runs in the background, so work
/// only progresses while a `wait` is in progress. Must not be used from
/// inside another async runtime.
pub struct WaitScope {
    runtime: Runtime,
    timeout: Option<Duration>,
}

impl WaitScope {
    pub fn new() -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_time().build()?;
        Ok(Self {
            runtime,
            timeout: None,
        })
    }

    pub fn from_settings(settings: &RpcSettings) -> Result<Self> {
        Ok(Self::new()?.with_timeout(settings.wait_timeout()))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Drive `future` to completion, failing if the configured timeout
    /// elapses first.
    pub fn wait<T, F>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.timeout {
            None => self.runtime.block_on(future),
            Some(limit) => self
                .runtime
                .block_on(async { tokio::time::timeout(limit, future).await })
                .map_err(|_| {
                    Error::Rpc(RpcFailure::failed(format!(
                        "wait timed out after {} ms",
                        limit.as_millis()
                    )))
                })?,
        }
    }
}

impl fmt::Debug for WaitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitScope")
            .field("timeout", &self.timeout)
            .finish()
    }
}
