//! Netlink datagram transport.
//!
//! Provides the socket layer underneath nlprims endpoints:
//! - [`NetlinkSocket`]: a non-blocking `AF_NETLINK` raw socket (Linux)
//! - [`MemoryNetwork`]: an in-process fabric with the same addressing rules
//! - [`Deadline`]: the per-operation timer every I/O call is bounded by
//!
//! This is the lowest layer of nlprims. Everything else builds on the
//! [`Transport`] trait provided here.

pub mod deadline;
pub mod error;
pub mod memory;
pub mod traits;

#[cfg(target_os = "linux")]
pub mod netlink;

pub use deadline::Deadline;
pub use error::{Result, TransportError};
pub use memory::{MemoryNetwork, MemorySocket};
pub use traits::{NetlinkAddr, Transport, NETLINK_GENERIC, NETLINK_ROUTE, NETLINK_USERSOCK};

#[cfg(target_os = "linux")]
pub use netlink::NetlinkSocket;
