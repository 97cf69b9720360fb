//! # Transport Abstraction
//!
//! The boundary to whatever actually talks to the worker.
//!
//! ## Philosophy
//!
//! - **Object-Oriented, not Byte-Oriented**: A transport moves calls, attribute reads
//!   and writes against remote references. Framing and serialization are its own
//!   business and never leak through this trait.
//! - **FIFO**: Every request of one transport reaches the worker in the order it was
//!   issued, fire-and-forget or not. The ordering guarantees of the proxy layer rest
//!   on this.
//! - **Inbound is pulled**: Requests from the worker (signal callbacks) queue up until
//!   the controller drains them. Nothing runs behind the controller's back.

use std::sync::Arc;

use crate::value::Args;
use crate::value::RemoteRef;
use crate::value::Value;

/// Errors that occur at the transport layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The worker is gone or the channel was dropped.
    #[error("channel to worker closed")]
    ChannelClosed,
    /// The remote object has no such attribute.
    #[error("{type_str} has no attribute '{attr}'")]
    AttributeNotFound { type_str: String, attr: String },
    /// The worker raised while serving the request.
    #[error("remote failure: {0}")]
    Remote(String),
    /// Generic I/O error or internal transport failure.
    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// How a call waits for the worker.
#[derive(Copy, Clone, Debug, Default, Hash, PartialEq, Eq)]
pub enum DispatchMode {
    /// Wait for the reply.
    #[default]
    Blocking,
    /// Enqueue and return; the reply, if any, is dropped.
    FireAndForget,
}

/// Strong type for controller-side callback identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct CallbackId(pub u64);

impl std::fmt::Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "callback-{}", self.0)
    }
}

/// A request sent by the worker to the controller.
#[derive(Clone, Debug)]
pub enum Inbound {
    /// A connected signal fired.
    Signal { callback: CallbackId, args: Vec<Value> },
}

/// A channel to one worker.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`). Values handed
/// to a transport never contain [`Value::Object`]; the session lowers them to
/// references first.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Calls `method` on `target`.
    ///
    /// Returns `Ok(None)` for fire-and-forget calls, which do not wait for the
    /// worker. Blocking calls return whatever the worker replied, plain data by
    /// value and everything else as a fresh [`RemoteRef`].
    async fn call(
        &self,
        target: &RemoteRef,
        method: &str,
        args: Args,
        mode: DispatchMode,
    ) -> Result<Option<Value>>;

    /// Reads an attribute. Methods come back as references to bound callables.
    async fn get_attr(&self, target: &RemoteRef, name: &str) -> Result<Value>;

    async fn set_attr(&self, target: &RemoteRef, name: &str, value: Value) -> Result<()>;

    /// Imports a module inside the worker and returns a reference to it.
    async fn import(&self, module: &str) -> Result<RemoteRef>;

    async fn is_callable(&self, target: &RemoteRef) -> Result<bool>;

    /// Describes the runtime type of `target`.
    ///
    /// The default reads the type string the reference was minted with.
    fn type_name_of(&self, target: &RemoteRef) -> String {
        target.type_str().to_string()
    }

    /// Forwards `signal` of `target` to the controller as `callback`.
    async fn connect(&self, target: &RemoteRef, signal: &str, callback: CallbackId) -> Result<()>;

    /// Takes everything the worker queued for the controller. Never blocks.
    fn drain_inbound(&self) -> Vec<Inbound>;

    /// Whether the worker can no longer be reached.
    fn is_closed(&self) -> bool;
}

/// Starts workers.
#[async_trait::async_trait]
pub trait Spawner: Send + Sync + 'static {
    /// Starts a worker whose references carry `epoch`.
    async fn spawn(&self, epoch: u64) -> Result<Arc<dyn Transport>>;
}
