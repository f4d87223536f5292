//! Capability clients and in-process servers.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, trace};

use super::promise::RemotePromise;
use super::request::Request;
use crate::dynamic::DynamicStruct;
use crate::error::{Result, RpcFailure};
use crate::schema::{InterfaceSchema, Method, NodeId};

/// Transport seam: anything that can deliver a call to a capability.
pub trait ClientHook: Send + Sync {
    /// Start a call. Must not block; failures belong in the promise.
    fn call(&self, method: &Method, params: DynamicStruct) -> RemotePromise;
}

/// Reference to a capability.
///
/// Cheap to clone; clones refer to the same capability.
#[derive(Clone)]
pub struct Client {
    hook: Arc<dyn ClientHook>,
}

impl Client {
    pub fn new<H: ClientHook + 'static>(hook: H) -> Self {
        Self {
            hook: Arc::new(hook),
        }
    }

    /// Client dispatching to an in-process server.
    pub fn from_server<S: Server + 'static>(server: S) -> Self {
        Self::new(LocalClient::new(server))
    }

    /// Default value of an unset interface field. Every call fails.
    pub fn null() -> Self {
        Self::broken(RpcFailure::failed("called null capability"))
    }

    /// Client whose calls all fail with `failure`.
    pub fn broken(failure: RpcFailure) -> Self {
        Self::new(BrokenClient { failure })
    }

    pub fn call(&self, method: &Method, params: DynamicStruct) -> RemotePromise {
        self.hook.call(method, params)
    }

    /// Whether both clients refer to the same capability instance.
    pub fn ptr_eq(&self, other: &Client) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.hook) as *const (),
            Arc::as_ptr(&other.hook) as *const (),
        )
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Client({:p})", Arc::as_ptr(&self.hook) as *const ())
    }
}

struct BrokenClient {
    failure: RpcFailure,
}

impl ClientHook for BrokenClient {
    fn call(&self, method: &Method, _params: DynamicStruct) -> RemotePromise {
        RemotePromise::failed(method.clone(), self.failure.clone())
    }
}

/// Server side of a capability.
#[async_trait]
pub trait Server: Send + Sync {
    /// Interface this server implements (including its superclasses).
    fn interface(&self) -> &InterfaceSchema;

    /// Handle one call.
    async fn dispatch(
        &self,
        method: &Method,
        params: DynamicStruct,
    ) -> std::result::Result<DynamicStruct, RpcFailure>;
}

/// Client calling straight into a [`Server`] in this process.
pub struct LocalClient {
    server: Arc<dyn Server>,
}

impl LocalClient {
    pub fn new<S: Server + 'static>(server: S) -> Self {
        Self {
            server: Arc::new(server),
        }
    }
}

impl ClientHook for LocalClient {
    fn call(&self, method: &Method, params: DynamicStruct) -> RemotePromise {
        let server = Arc::clone(&self.server);
        if !server.interface().extends(method.interface()) {
            return RemotePromise::failed(
                method.clone(),
                RpcFailure::unimplemented(format!(
                    "{} does not implement interface {}",
                    server.interface().name(),
                    method.interface().name()
                )),
            );
        }

        let owned = method.clone();
        RemotePromise::new(method.clone(), async move {
            debug!(method = %owned, "Dispatching local call");
            let results = server.dispatch(&owned, params).await?;
            let expected = owned.results();
            if results.schema().id() != expected.id() {
                return Err(RpcFailure::failed(format!(
                    "{owned} returned {} instead of {}",
                    results.schema().display_name(),
                    expected.display_name()
                )));
            }
            Ok(results)
        })
    }
}

/// Client for a capability that will be found in a promised result.
pub(crate) struct PipelineClient {
    promise: RemotePromise,
    field: String,
}

impl PipelineClient {
    pub(crate) fn new(promise: RemotePromise, field: &str) -> Self {
        Self {
            promise,
            field: field.to_string(),
        }
    }
}

impl ClientHook for PipelineClient {
    fn call(&self, method: &Method, params: DynamicStruct) -> RemotePromise {
        let target = self.promise.then_project(&self.field);
        let owned = method.clone();
        RemotePromise::from_shared(method.clone(), async move {
            let client = target.await?;
            trace!(method = %owned, "Pipelined target resolved");
            client.call(&owned, params).results().await
        })
    }
}

type Handler = Box<
    dyn Fn(DynamicStruct, DynamicStruct) -> BoxFuture<'static, std::result::Result<DynamicStruct, RpcFailure>>
        + Send
        + Sync,
>;

/// Server built from per-method closures.
///
/// Handlers receive the call parameters and a fresh results struct, and
/// return the filled-in results. Methods without a handler fail with
/// `Unimplemented`.
///
/// ```ignore
/// let server = CapabilityServer::new(value_iface)
///     .method("read", |_params, mut results| async move {
///         results.set("value", 42.0)?;
///         Ok(results)
///     })?;
/// ```
pub struct CapabilityServer {
    interface: InterfaceSchema,
    handlers: HashMap<(NodeId, u16), Handler>,
}

impl CapabilityServer {
    pub fn new(interface: InterfaceSchema) -> Self {
        Self {
            interface,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `name`, which may be inherited.
    pub fn method<F, Fut>(mut self, name: &str, handler: F) -> Result<Self>
    where
        F: Fn(DynamicStruct, DynamicStruct) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<DynamicStruct, RpcFailure>> + Send + 'static,
    {
        let method = self.interface.method(name)?;
        self.handlers.insert(
            (method.interface().id(), method.ordinal()),
            Box::new(move |params, results| handler(params, results).boxed()),
        );
        Ok(self)
    }

    pub fn into_client(self) -> Client {
        Client::from_server(self)
    }
}

#[async_trait]
impl Server for CapabilityServer {
    fn interface(&self) -> &InterfaceSchema {
        &self.interface
    }

    async fn dispatch(
        &self,
        method: &Method,
        params: DynamicStruct,
    ) -> std::result::Result<DynamicStruct, RpcFailure> {
        let Some(handler) = self
            .handlers
            .get(&(method.interface().id(), method.ordinal()))
        else {
            return Err(RpcFailure::unimplemented(format!(
                "method {method} not implemented"
            )));
        };
        let results = DynamicStruct::new(method.results().clone());
        handler(params, results).await
    }
}

/// A [`Client`] paired with the interface it is known to implement.
#[derive(Clone, Debug)]
pub struct DynamicCapabilityClient {
    client: Client,
    schema: InterfaceSchema,
}

impl DynamicCapabilityClient {
    pub fn new(client: Client, schema: InterfaceSchema) -> Self {
        Self { client, schema }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn schema(&self) -> &InterfaceSchema {
        &self.schema
    }

    pub fn into_client(self) -> Client {
        self.client
    }

    /// Start a request for method `name`, failing with `MethodNotFound`.
    pub fn request(&self, name: &str) -> Result<Request> {
        Ok(self.request_method(self.schema.method(name)?))
    }

    pub fn request_method(&self, method: Method) -> Request {
        Request::new(self.client.clone(), method)
    }
}
