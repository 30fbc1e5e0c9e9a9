//! Netlink message transport.
//!
//! nlprims frames payloads into netlink messages, sends them over
//! non-blocking `AF_NETLINK` sockets under a deadline, and parses incoming
//! frames back into payload plus sender. Generic netlink endpoints resolve
//! their family id through the controller on first use.
//!
//! # Crate Structure
//!
//! - [`transport`]: Netlink sockets, the in-memory fabric and deadlines
//! - [`frame`]: Message codec, attribute records and the flag table
//! - [`endpoint`]: Connected/unconnected endpoints (behind `endpoint` feature)

/// Re-export transport types.
pub mod transport {
    pub use nlprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use nlprims_frame::*;
}

/// Re-export endpoint types (requires `endpoint` feature).
#[cfg(feature = "endpoint")]
pub mod endpoint {
    pub use nlprims_endpoint::*;
}
