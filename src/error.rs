//! Error types for dynamic schema bindings.

use std::fmt;
use thiserror::Error;

/// Category of an RPC failure, mirroring the exception kinds a Cap'n Proto
/// transport reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Generic failure raised by the callee or the transport.
    Failed,
    /// The callee is temporarily unable to serve the call.
    Overloaded,
    /// The connection to the callee was lost.
    Disconnected,
    /// The callee does not implement the requested method.
    Unimplemented,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Failed => "failed",
            FailureKind::Overloaded => "overloaded",
            FailureKind::Disconnected => "disconnected",
            FailureKind::Unimplemented => "unimplemented",
        };
        f.write_str(label)
    }
}

/// Failure captured inside a promise.
///
/// Unlike [`Error`] this is `Clone`, so a single settled promise can be
/// observed by every pipelined call waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {description}")]
pub struct RpcFailure {
    pub kind: FailureKind,
    pub description: String,
}

impl RpcFailure {
    pub fn new<S: Into<String>>(kind: FailureKind, description: S) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    pub fn failed<S: Into<String>>(description: S) -> Self {
        Self::new(FailureKind::Failed, description)
    }

    pub fn overloaded<S: Into<String>>(description: S) -> Self {
        Self::new(FailureKind::Overloaded, description)
    }

    pub fn disconnected<S: Into<String>>(description: S) -> Self {
        Self::new(FailureKind::Disconnected, description)
    }

    pub fn unimplemented<S: Into<String>>(description: S) -> Self {
        Self::new(FailureKind::Unimplemented, description)
    }
}

impl From<Error> for RpcFailure {
    fn from(err: Error) -> Self {
        match err {
            Error::Rpc(failure) => failure,
            other => RpcFailure::failed(other.to_string()),
        }
    }
}

/// Errors raised by schema loading, dynamic access and request building.
#[derive(Debug, Error)]
pub enum Error {
    /// Accessor name has no matching field in the struct schema.
    #[error("field not found: {struct_name}.{field}")]
    FieldNotFound { struct_name: String, field: String },

    /// Interface has no method with this name.
    #[error("method {0} not found in this interface")]
    MethodNotFound(String),

    /// Value shape is incompatible with the field's declared type.
    #[error("type mismatch for {field}: expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// An operation was attempted before its preconditions were met.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// A chained call received a value count it cannot interpret. `arity`
    /// counts the values passed after the field name, not the name itself.
    #[error("unsupported arity for {name}: {arity} value argument(s) after the field name")]
    UnsupportedArity { name: String, arity: usize },

    /// The operation exists but is not implemented.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// `which` was called on a struct with no top-level union.
    #[error("struct {0} has no union")]
    NoUnion(String),

    /// A union member other than the active one was read.
    #[error("union member {field} is not active (active: {active})")]
    InactiveUnionMember { field: String, active: String },

    /// List index beyond the list length.
    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// No binding at the given namespace path.
    #[error("binding not found: {0}")]
    BindingNotFound(String),

    /// Schema graph has no node with this id.
    #[error("unknown schema node: {0:#018x}")]
    UnknownNode(u64),

    /// The namespace already holds a loaded schema.
    #[error("namespace {0} already has a schema loaded")]
    AlreadyLoaded(String),

    /// Schema could not be parsed or bound.
    #[error("schema load failed: {0}")]
    SchemaLoad(String),

    /// RPC failure observed when awaiting a promise.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcFailure),

    /// Cap'n Proto decoding error.
    #[error("capnp error: {0}")]
    Capnp(#[from] capnp::Error),

    /// Cap'n Proto enum or union tag outside the compiled schema.
    #[error("capnp schema error: {0}")]
    NotInSchema(#[from] capnp::NotInSchema),

    /// JSON codec error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn field_not_found(struct_name: &str, field: &str) -> Self {
        Self::FieldNotFound {
            struct_name: struct_name.to_string(),
            field: field.to_string(),
        }
    }

    pub fn type_mismatch<E: fmt::Display, A: fmt::Display>(
        field: &str,
        expected: E,
        actual: A,
    ) -> Self {
        Self::TypeMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn schema_load<S: Into<String>>(msg: S) -> Self {
        Self::SchemaLoad(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedOperation(msg.into())
    }
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
