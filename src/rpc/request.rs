//! Request building, sending and pipelining.
//!
//! A request is described as a list of [`Assignment`]s, each a route of
//! descents into nested structs ending in one field assignment:
//!
//! ```ignore
//! let promise = calculator
//!     .request("evaluate")?
//!     .descend("expression")
//!     .assign("literal", 3.0)
//!     .send()?;
//! let value = promise.get("value").method_named("read")?.send()?;
//! ```
//!
//! produces the params `(expression = (literal = 3.0))` and calls `read`
//! on the returned `value` capability before `evaluate` has answered.

use std::fmt;

use tracing::{debug, warn};

use super::client::Client;
use super::promise::{RemotePromise, Response, WaitScope};
use crate::dynamic::{DynamicStruct, Value};
use crate::error::{Error, Result};
use crate::schema::{FieldKind, Method, Type};

/// One recorded step of a request path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    Descend(String),
    Assign(String, Value),
}

/// Descents followed by exactly one assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    route: Box<[String]>,
    field: String,
    value: Value,
}

impl Assignment {
    pub fn route(&self) -> impl Iterator<Item = &str> {
        self.route.iter().map(String::as_str)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn steps(&self) -> Vec<PathStep> {
        self.route
            .iter()
            .cloned()
            .map(PathStep::Descend)
            .chain(std::iter::once(PathStep::Assign(
                self.field.clone(),
                self.value.clone(),
            )))
            .collect()
    }

    fn apply(&self, params: &mut DynamicStruct) -> Result<()> {
        let mut target = params;
        for name in self.route.iter() {
            target = target.get_struct_mut(name)?;
        }
        target.set(&self.field, self.value.clone())
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in self.route.iter() {
            write!(f, "{name}.")?;
        }
        write!(f, "{} = {}", self.field, self.value)
    }
}

/// Accumulates request path steps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPathBuilder {
    closed: Vec<Assignment>,
    open: Vec<String>,
}

impl RequestPathBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn descend<S: Into<String>>(mut self, name: S) -> Self {
        self.open.push(name.into());
        self
    }

    /// Close the pending descents and this assignment into one
    /// [`Assignment`].
    pub fn assign<S: Into<String>, V: Into<Value>>(mut self, name: S, value: V) -> Self {
        let route = std::mem::take(&mut self.open).into_boxed_slice();
        self.closed.push(Assignment {
            route,
            field: name.into(),
            value: value.into(),
        });
        self
    }

    /// Dispatch by argument count: none descends, one assigns.
    pub fn call<S: Into<String>>(self, name: S, args: Vec<Value>) -> Result<Self> {
        let arity = args.len();
        let mut args = args.into_iter();
        match (args.next(), args.next()) {
            (None, _) => Ok(self.descend(name)),
            (Some(value), None) => Ok(self.assign(name, value)),
            (Some(_), Some(_)) => Err(Error::UnsupportedArity {
                name: name.into(),
                arity,
            }),
        }
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.closed
    }

    /// Descents not yet closed by an assignment.
    pub fn pending(&self) -> &[String] {
        &self.open
    }

    pub fn is_empty(&self) -> bool {
        self.closed.is_empty() && self.open.is_empty()
    }

    /// Apply every assignment to `params`, in order. Pending descents are
    /// ignored.
    pub fn materialize(&self, params: &mut DynamicStruct) -> Result<()> {
        if !self.open.is_empty() {
            warn!(
                params = params.schema().name(),
                dropped = ?self.open,
                "Ignoring path steps with no assignment"
            );
        }
        for assignment in &self.closed {
            debug!(params = params.schema().name(), %assignment, "Applying assignment");
            assignment.apply(params)?;
        }
        Ok(())
    }
}

/// A call being built against a capability.
#[derive(Debug)]
pub struct Request {
    target: Client,
    method: Method,
    path: RequestPathBuilder,
}

impl Request {
    pub fn new(target: Client, method: Method) -> Self {
        Self {
            target,
            method,
            path: RequestPathBuilder::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &RequestPathBuilder {
        &self.path
    }

    pub fn descend<S: Into<String>>(mut self, name: S) -> Self {
        self.path = self.path.descend(name);
        self
    }

    pub fn assign<S: Into<String>, V: Into<Value>>(mut self, name: S, value: V) -> Self {
        self.path = self.path.assign(name, value);
        self
    }

    pub fn call<S: Into<String>>(mut self, name: S, args: Vec<Value>) -> Result<Self> {
        self.path = self.path.call(name, args)?;
        Ok(self)
    }

    /// Build the params struct this request would send.
    pub fn params(&self) -> Result<DynamicStruct> {
        let mut params = DynamicStruct::new(self.method.params().clone());
        self.path.materialize(&mut params)?;
        Ok(params)
    }

    /// Materialize the params and start the call. Never blocks.
    pub fn send(self) -> Result<PipelinedRequest> {
        let params = self.params()?;
        debug!(method = %self.method, "Sending request");
        let promise = self.target.call(&self.method, params);
        Ok(PipelinedRequest::new(promise))
    }
}

/// Message of the precondition failure raised by a premature
/// [`PipelinedRequest::send`].
pub const PIPELINE_PRECONDITION: &str = "call both get and set method before calling send";

/// Handle on a sent call that can pipeline a follow-up call on a
/// capability in its results.
#[derive(Debug)]
pub struct PipelinedRequest {
    target: RemotePromise,
    pivot: Option<String>,
    method: Option<Method>,
    path: RequestPathBuilder,
}

impl PipelinedRequest {
    pub fn new(target: RemotePromise) -> Self {
        Self {
            target,
            pivot: None,
            method: None,
            path: RequestPathBuilder::new(),
        }
    }

    pub fn promise(&self) -> &RemotePromise {
        &self.target
    }

    pub fn pivot(&self) -> Option<&str> {
        self.pivot.as_deref()
    }

    pub fn pipelined_method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn path(&self) -> &RequestPathBuilder {
        &self.path
    }

    /// Pick the result field holding the capability to call.
    pub fn get<S: Into<String>>(mut self, field: S) -> Self {
        self.pivot = Some(field.into());
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the method by name, looked up on the interface type of the pivot
    /// field. Requires [`get`](Self::get) first.
    pub fn method_named(self, name: &str) -> Result<Self> {
        let pivot = self.pivot.as_deref().ok_or_else(|| {
            Error::PreconditionViolation("call get before resolving a method by name".into())
        })?;
        let results = self.target.method().results();
        let interface = match &results.field(pivot)?.kind {
            FieldKind::Slot(Type::Interface(id)) => results.interface_schema(*id)?,
            FieldKind::Slot(other) => return Err(Error::type_mismatch(pivot, "interface", other)),
            FieldKind::Group(_) => return Err(Error::type_mismatch(pivot, "interface", "group")),
        };
        let method = interface.method(name)?;
        Ok(self.method(method))
    }

    pub fn descend<S: Into<String>>(mut self, name: S) -> Self {
        self.path = self.path.descend(name);
        self
    }

    pub fn assign<S: Into<String>, V: Into<Value>>(mut self, name: S, value: V) -> Self {
        self.path = self.path.assign(name, value);
        self
    }

    pub fn call<S: Into<String>>(mut self, name: S, args: Vec<Value>) -> Result<Self> {
        self.path = self.path.call(name, args)?;
        Ok(self)
    }

    /// Send the pipelined call. Without a pivot and a method the request is
    /// handed back inside the error, unchanged.
    pub fn send(self) -> std::result::Result<PipelinedRequest, SendError> {
        let (Some(pivot), Some(method)) = (self.pivot.clone(), self.method.clone()) else {
            return Err(SendError {
                error: Error::PreconditionViolation(PIPELINE_PRECONDITION.into()),
                request: self,
            });
        };

        let mut params = DynamicStruct::new(method.params().clone());
        if let Err(error) = self.path.materialize(&mut params) {
            return Err(SendError {
                error,
                request: self,
            });
        }

        let promise = self.target.request_and_send(&pivot, &method, params);
        Ok(PipelinedRequest::new(promise))
    }

    pub async fn response(&self) -> Result<Response> {
        self.target.response().await
    }

    /// Block until the call this handle wraps settles.
    pub fn wait(&self, scope: &WaitScope) -> Result<Response> {
        self.target.wait(scope)
    }
}

/// Failed [`PipelinedRequest::send`], carrying the request back.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct SendError {
    #[source]
    error: Error,
    request: PipelinedRequest,
}

impl SendError {
    pub fn error(&self) -> &Error {
        &self.error
    }

    pub fn into_inner(self) -> PipelinedRequest {
        self.request
    }

    pub fn into_parts(self) -> (Error, PipelinedRequest) {
        (self.error, self.request)
    }
}

impl From<SendError> for Error {
    fn from(err: SendError) -> Self {
        err.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_closes_descents() {
        let path = RequestPathBuilder::new()
            .descend("expression")
            .assign("literal", 3);
        assert!(path.pending().is_empty());
        assert_eq!(path.assignments().len(), 1);
        assert_eq!(
            path.assignments()[0].steps(),
            vec![
                PathStep::Descend("expression".into()),
                PathStep::Assign("literal".into(), Value::Int(3)),
            ]
        );
        assert_eq!(path.assignments()[0].to_string(), "expression.literal = 3");
    }

    #[test]
    fn test_call_arity() {
        let path = RequestPathBuilder::new()
            .call("a", vec![])
            .unwrap()
            .call("b", vec![Value::Bool(true)])
            .unwrap();
        let steps = path.assignments()[0].steps();
        assert_eq!(steps[0], PathStep::Descend("a".into()));
        assert_eq!(steps[1], PathStep::Assign("b".into(), Value::Bool(true)));

        let err = RequestPathBuilder::new()
            .call("c", vec![Value::Int(1), Value::Int(2)])
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedArity { arity: 2, .. }));
        assert_eq!(
            err.to_string(),
            "unsupported arity for c: 2 value argument(s) after the field name"
        );
    }

    #[test]
    fn test_independent_assignments() {
        let path = RequestPathBuilder::new()
            .descend("a")
            .assign("x", 1)
            .assign("y", 2)
            .descend("dangling");
        let routes: Vec<Vec<&str>> = path
            .assignments()
            .iter()
            .map(|a| a.route().collect())
            .collect();
        assert_eq!(routes, vec![vec!["a"], vec![]]);
        assert_eq!(path.pending(), ["dangling".to_string()]);
        assert!(!path.is_empty());
        assert!(RequestPathBuilder::new().is_empty());
    }
}
