//! # Farworker
//!
//! An in-process worker for the proxy layer: an object space holding a small
//! plotting toolkit, served on its own tokio task behind a loopback transport.
//!
//! ## Philosophy
//!
//! - **Same contract as a real worker**: References carry the worker's epoch,
//!   unknown attributes raise, requests are served strictly in arrival order and
//!   signals are queued until the controller drains them.
//! - **Observable**: Every served request lands in a journal, so tests can check
//!   what reached the worker and in which order.
//! - **Killable**: A worker can be stopped at any moment to exercise respawn.

pub mod loopback;
pub mod space;
pub mod toolkit;

pub use loopback::LoopbackSpawner;
pub use loopback::LoopbackTransport;
pub use loopback::WorkerHandle;
pub use loopback::spawn_worker;
pub use space::Error;
pub use space::Journal;
pub use space::JournalEntry;
pub use space::ObjectId;
pub use space::Space;
pub use toolkit::Kind;
