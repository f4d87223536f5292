//! Calls on dynamically typed capabilities.
//!
//! [`Client`] is the transport seam: anything implementing [`ClientHook`]
//! can carry calls. [`CapabilityServer`] and [`LocalClient`] provide an
//! in-process implementation. Requests are built with named path steps
//! ([`Request`]) and may be pipelined on promised capabilities
//! ([`PipelinedRequest`]) before the first call answers.

mod client;
mod promise;
mod request;

pub use client::{CapabilityServer, Client, ClientHook, DynamicCapabilityClient, LocalClient, Server};
pub use promise::{RemotePromise, Response, WaitScope};
pub use request::{
    Assignment, PathStep, PipelinedRequest, Request, RequestPathBuilder, SendError,
    PIPELINE_PRECONDITION,
};
