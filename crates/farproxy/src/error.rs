//! Errors surfaced by the proxy layer.
//!
//! Nothing in this crate swallows an error: misuse, failed lookups and dead
//! workers all come back to the caller.

use crate::transport;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Neither the local class nor the remote object has the attribute.
    #[error("'{type_name}' object has no attribute '{attr}'")]
    NoSuchAttribute { type_name: String, attr: String },

    /// The remote attribute exists but is data, not a method.
    #[error("'{type_name}.{attr}' is not callable")]
    NotCallable { type_name: String, attr: String },

    /// A local method was read as an attribute. Local methods are used
    /// directly through `Object::method` or `Object::call`.
    #[error("'{type_name}.{attr}' is a local method; use it directly with `method(\"{attr}\")` or `call(\"{attr}\", ..)`")]
    LocalMethod { type_name: String, attr: String },

    /// A local property without a setter was written.
    #[error("property '{type_name}.{attr}' is read-only")]
    ReadOnly { type_name: String, attr: String },

    /// Only remote references can be wrapped.
    #[error("{class} can only wrap remote references, got {found}")]
    NotARemote { class: &'static str, found: &'static str },

    /// The class declares no remote type, so there is nothing to create or wrap.
    #[error("{0} declares no remote type and cannot be instantiated or wrapped")]
    AbstractClass(&'static str),

    /// The class was never handed to the registry.
    #[error("class {0} is not registered")]
    UnknownClass(&'static str),

    /// Two classes claim the same remote type.
    #[error("remote type '{remote_type}' is declared by both {first} and {second}")]
    DuplicateRemoteType {
        remote_type: &'static str,
        first: &'static str,
        second: &'static str,
    },

    /// Two distinct class declarations share a name.
    #[error("two distinct classes are named {0}")]
    DuplicateClass(&'static str),

    #[error("expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("invalid argument to {method}: {reason}")]
    InvalidArgument { method: String, reason: String },

    /// A creator returned nothing and had no positional argument to stand in.
    #[error("'{type_name}.{method}' returned nothing and was given no positional argument; cannot tell what it added")]
    OwnershipInference { type_name: String, method: String },

    /// The object belongs to a worker that has since been replaced.
    #[error("{type_name} belongs to worker generation {epoch}, which is gone")]
    StaleObject { type_name: String, epoch: u64 },

    #[error("failed to start worker: {0}")]
    Spawn(transport::Error),

    #[error(transparent)]
    Transport(#[from] transport::Error),
}

impl Error {
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn invalid_argument(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            method: method.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
