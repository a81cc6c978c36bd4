//! WebSocket gateway: connection state, registry, fan-out and the
//! per-connection reader/writer loops.

pub mod connection;
pub mod dispatcher;
pub mod registry;
pub mod session;

pub use connection::ConnectionHandle;
pub use dispatcher::{BroadcastDispatcher, DispatchReport};
pub use registry::ConnectionRegistry;
