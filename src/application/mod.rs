//! Application layer - Session orchestration built on the ports.

pub mod dispatcher;
pub mod opener;
pub mod registry;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::{DispatchError, Dispatcher, ServedFile};
pub use opener::{OpenError, StreamOpener};
pub use registry::SessionRegistry;
pub use session::{SessionError, SessionParams, SessionSnapshot, StreamSession};
