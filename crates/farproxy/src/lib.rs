//! # Farproxy
//!
//! Local stand-ins for objects that live in a worker process.
//!
//! ## Philosophy
//!
//! - **One owner**: The worker holds the only real object. The controller holds an
//!   [`Object`], which owns exactly one [`RemoteRef`] and forwards everything it
//!   cannot answer locally.
//! - **Declared, not guessed**: Each wrapper type is a static [`Class`] naming the
//!   remote type it stands for, which remote methods create children (creators)
//!   or only query (queries), and which hot-path methods skip the reply.
//! - **Explicit state**: Registry, worker session and live windows hang off a
//!   [`Context`] that is built once and passed around.

pub mod autowrap;
pub mod class;
pub mod context;
pub mod error;
pub mod method;
pub mod object;
pub mod pump;
pub mod registry;
pub mod session;
pub mod transport;
pub mod value;

pub use autowrap::autowrap;
pub use class::Class;
pub use class::Role;
pub use context::Context;
pub use context::ContextBuilder;
pub use context::Settings;
pub use error::Error;
pub use error::Result;
pub use method::BoundMethod;
pub use method::Method;
pub use object::Lookup;
pub use object::Object;
pub use pump::Pump;
pub use registry::Registry;
pub use session::Session;
pub use transport::CallbackId;
pub use transport::DispatchMode;
pub use transport::Spawner;
pub use transport::Transport;
pub use value::Args;
pub use value::RemoteRef;
pub use value::Value;

#[cfg(test)]
mod tests;
