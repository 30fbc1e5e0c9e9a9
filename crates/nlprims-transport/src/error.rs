use std::time::Duration;

use crate::traits::NetlinkAddr;

/// Errors that can occur in netlink transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to create the netlink socket.
    #[error("failed to create netlink socket (protocol {protocol}): {source}")]
    Create {
        protocol: i32,
        source: std::io::Error,
    },

    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: NetlinkAddr,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: NetlinkAddr,
        source: std::io::Error,
    },

    /// An I/O error occurred while sending or receiving.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The deadline elapsed before the operation completed.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The peer or the local side shut the channel down mid-operation.
    #[error("transport closed")]
    Closed,

    /// The transport handle has already been released.
    #[error("transport shut down")]
    Shutdown,
}

impl TransportError {
    /// True for the deadline-elapsed condition.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
