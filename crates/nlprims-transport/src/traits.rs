use std::fmt;

use crate::deadline::Deadline;
use crate::error::Result;

/// Kernel routing family.
pub const NETLINK_ROUTE: i32 = 0;
/// Reserved for user-mode socket protocols; the default for new endpoints.
pub const NETLINK_USERSOCK: i32 = 2;
/// Generic netlink, addressed by runtime-resolved family ids.
pub const NETLINK_GENERIC: i32 = 16;

/// A netlink socket address: port id plus multicast group mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NetlinkAddr {
    /// Port id. Zero addresses the kernel.
    pub pid: u32,
    /// Multicast group bitmask.
    pub groups: u32,
}

impl NetlinkAddr {
    pub fn new(pid: u32, groups: u32) -> Self {
        Self { pid, groups }
    }

    /// Unicast address for a port id.
    pub fn pid(pid: u32) -> Self {
        Self { pid, groups: 0 }
    }
}

impl fmt::Display for NetlinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "netlink:{}/{:#x}", self.pid, self.groups)
    }
}

/// A datagram transport that moves whole netlink frames.
///
/// Every I/O call is a single attempt bounded by `deadline`. Implementations
/// return `TransportError::Timeout` when the budget runs out and
/// `TransportError::Closed` when the channel shuts down mid-operation.
pub trait Transport {
    /// Bind the local end to `addr`.
    fn bind(&mut self, addr: NetlinkAddr) -> Result<()>;

    /// Set the default destination, or dissolve it with `None`.
    fn connect(&mut self, addr: Option<NetlinkAddr>) -> Result<()>;

    /// Send one datagram to the connected peer.
    fn send(&mut self, buf: &[u8], deadline: &Deadline) -> Result<usize>;

    /// Send one datagram to an explicit destination.
    fn send_to(&mut self, buf: &[u8], addr: NetlinkAddr, deadline: &Deadline) -> Result<usize>;

    /// Receive one datagram from the connected peer into `buf`.
    fn recv(&mut self, buf: &mut [u8], deadline: &Deadline) -> Result<usize>;

    /// Receive one datagram into `buf`, returning its length and source.
    fn recv_from(&mut self, buf: &mut [u8], deadline: &Deadline) -> Result<(usize, NetlinkAddr)>;

    /// The address the local end is bound to.
    fn local_addr(&self) -> Result<NetlinkAddr>;

    /// Release the handle. Calling this more than once is a no-op.
    fn close(&mut self);

    /// True once [`Transport::close`] has run.
    fn is_closed(&self) -> bool;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn bind(&mut self, addr: NetlinkAddr) -> Result<()> {
        (**self).bind(addr)
    }

    fn connect(&mut self, addr: Option<NetlinkAddr>) -> Result<()> {
        (**self).connect(addr)
    }

    fn send(&mut self, buf: &[u8], deadline: &Deadline) -> Result<usize> {
        (**self).send(buf, deadline)
    }

    fn send_to(&mut self, buf: &[u8], addr: NetlinkAddr, deadline: &Deadline) -> Result<usize> {
        (**self).send_to(buf, addr, deadline)
    }

    fn recv(&mut self, buf: &mut [u8], deadline: &Deadline) -> Result<usize> {
        (**self).recv(buf, deadline)
    }

    fn recv_from(&mut self, buf: &mut [u8], deadline: &Deadline) -> Result<(usize, NetlinkAddr)> {
        (**self).recv_from(buf, deadline)
    }

    fn local_addr(&self) -> Result<NetlinkAddr> {
        (**self).local_addr()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addr_display() {
        assert_eq!(NetlinkAddr::new(42, 3).to_string(), "netlink:42/0x3");
        assert_eq!(NetlinkAddr::pid(7), NetlinkAddr { pid: 7, groups: 0 });
    }
}
