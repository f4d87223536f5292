//! Dynamic, schema-driven Cap'n Proto bindings.
//!
//! Schemas are loaded at runtime into a [`Namespace`] of bindings; structs are
//! read and written by field name through [`DynamicStruct`]; interface
//! methods are called through [`DynamicCapabilityClient`] with requests built
//! from named path steps, and calls can be pipelined on capabilities that
//! have not been returned yet.
//!
//! ```ignore
//! use capnp_dynamic::prelude::*;
//!
//! let mut ns = Namespace::new("Calculator");
//! ns.load_schema(&CompilerParser::new(), "calculator.capnp", &[])?;
//! let iface = ns.resolve("Calculator")?.as_interface()?.clone();
//! let calculator = DynamicCapabilityClient::new(client, iface);
//!
//! let scope = WaitScope::new()?;
//! let value = calculator
//!     .request("evaluate")?
//!     .descend("expression")
//!     .assign("literal", 123.0)
//!     .send()?
//!     .get("value")
//!     .method_named("read")?
//!     .send()?
//!     .wait(&scope)?;
//! ```

pub mod config;
pub mod dynamic;
pub mod error;
pub mod namespace;
pub mod rpc;
pub mod schema;

pub use config::Settings;
pub use dynamic::{DynamicList, DynamicStruct, Value};
pub use error::{Error, FailureKind, Result, RpcFailure};
pub use namespace::{Binding, BindingKind, Namespace};
pub use rpc::{Client, DynamicCapabilityClient, PipelinedRequest, RemotePromise, Request, WaitScope};

/// Commonly used types.
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::dynamic::{DynamicAccess, DynamicList, DynamicStruct, Value};
    pub use crate::error::{Error, Result, RpcFailure};
    pub use crate::namespace::Namespace;
    pub use crate::rpc::{
        CapabilityServer, Client, DynamicCapabilityClient, PipelinedRequest, RemotePromise,
        Request, RequestPathBuilder, WaitScope,
    };
    pub use crate::schema::{CompilerParser, PrecompiledParser, SchemaParser};
}
