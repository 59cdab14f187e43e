//! Pluggable raw-byte transports for pipeline edges.
//!
//! One [`Channel`] instance binds two endpoints of one edge. All backends
//! share the same blocking contract: `send_blocking` transfers a whole
//! message, `recv_blocking` fills an exact-size buffer, and
//! `recv_variable_blocking` sizes the destination from the message's own
//! length header before reading the body. Blocking receives have no
//! timeout, so a stalled peer blocks the caller; the bounded client
//! connect-retry on the socket backend is the only built-in timeout.
//!
//! Non-blocking variants degrade to the blocking ones by default and say
//! so via a `tracing` notice; a backend that can do better overrides them.

pub mod channel;
pub mod error;
pub mod memory;
pub mod mpi;
pub mod socket;

#[cfg(target_os = "linux")]
pub mod ethernet;

pub use channel::{Channel, ChannelState};
pub use error::{Result, TransportError};
pub use memory::{MemoryChannel, MemoryConfig};
pub use mpi::{LoopbackMpiRuntime, MpiChannel, MpiConfig, MpiRuntime, MpiSendLock};
pub use socket::{Role, SocketChannel, SocketConfig};

#[cfg(target_os = "linux")]
pub use ethernet::{EthernetChannel, EthernetConfig};
