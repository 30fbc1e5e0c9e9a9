use std::io;
use std::mem::size_of;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use tracing::{debug, trace};

use crate::deadline::Deadline;
use crate::error::{Result, TransportError};
use crate::traits::{NetlinkAddr, Transport};

const SOCKADDR_NL_LEN: libc::socklen_t = size_of::<libc::sockaddr_nl>() as libc::socklen_t;

/// A raw `AF_NETLINK` socket in non-blocking mode.
///
/// Waiting is done with `poll(2)` bounded by the caller's [`Deadline`], so a
/// single call never blocks longer than the deadline allows.
pub struct NetlinkSocket {
    fd: Option<OwnedFd>,
    protocol: i32,
}

impl NetlinkSocket {
    /// Create a netlink socket for `protocol` and switch it to non-blocking mode.
    pub fn open(protocol: i32) -> Result<Self> {
        // SAFETY: socket(2) takes only integer arguments; the result is checked below.
        let raw = unsafe {
            libc::socket(
                libc::AF_NETLINK,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC,
                protocol,
            )
        };
        if raw < 0 {
            return Err(TransportError::Create {
                protocol,
                source: io::Error::last_os_error(),
            });
        }
        // SAFETY: `raw` is a freshly created descriptor that nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        set_nonblocking(fd.as_raw_fd()).map_err(|source| TransportError::Create { protocol, source })?;

        debug!(protocol, fd = raw, "opened netlink socket");
        Ok(Self {
            fd: Some(fd),
            protocol,
        })
    }

    /// The netlink protocol number this socket was opened with.
    pub fn protocol(&self) -> i32 {
        self.protocol
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "netlink"
    }

    fn raw_fd(&self) -> Result<RawFd> {
        self.fd
            .as_ref()
            .map(AsRawFd::as_raw_fd)
            .ok_or(TransportError::Shutdown)
    }

    fn attempt<F>(&self, events: libc::c_short, deadline: &Deadline, mut op: F) -> Result<usize>
    where
        F: FnMut(RawFd) -> isize,
    {
        let fd = self.raw_fd()?;
        loop {
            let rc = op(fd);
            if rc >= 0 {
                return Ok(rc as usize);
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => wait_fd(fd, events, deadline)?,
                _ => return Err(TransportError::Io(err)),
            }
        }
    }
}

impl Transport for NetlinkSocket {
    fn bind(&mut self, addr: NetlinkAddr) -> Result<()> {
        let fd = self.raw_fd()?;
        let sa = sockaddr(addr);
        // SAFETY: `sa` is a valid sockaddr_nl and the length matches its type.
        let rc = unsafe {
            libc::bind(
                fd,
                (&sa as *const libc::sockaddr_nl).cast::<libc::sockaddr>(),
                SOCKADDR_NL_LEN,
            )
        };
        if rc < 0 {
            return Err(TransportError::Bind {
                addr,
                source: io::Error::last_os_error(),
            });
        }
        debug!(%addr, "bound netlink socket");
        Ok(())
    }

    fn connect(&mut self, addr: Option<NetlinkAddr>) -> Result<()> {
        let fd = self.raw_fd()?;
        let sa = match addr {
            Some(addr) => sockaddr(addr),
            None => {
                let mut sa = sockaddr(NetlinkAddr::default());
                sa.nl_family = libc::AF_UNSPEC as libc::sa_family_t;
                sa
            }
        };
        // SAFETY: `sa` is a valid sockaddr_nl and the length matches its type.
        let rc = unsafe {
            libc::connect(
                fd,
                (&sa as *const libc::sockaddr_nl).cast::<libc::sockaddr>(),
                SOCKADDR_NL_LEN,
            )
        };
        if rc < 0 {
            return Err(TransportError::Connect {
                addr: addr.unwrap_or_default(),
                source: io::Error::last_os_error(),
            });
        }
        match addr {
            Some(addr) => debug!(%addr, "connected netlink socket"),
            None => debug!("dissolved netlink peer association"),
        }
        Ok(())
    }

    fn send(&mut self, buf: &[u8], deadline: &Deadline) -> Result<usize> {
        self.attempt(libc::POLLOUT, deadline, |fd| {
            // SAFETY: `buf` is valid for reads of `buf.len()` bytes.
            unsafe { libc::send(fd, buf.as_ptr().cast::<libc::c_void>(), buf.len(), 0) }
        })
    }

    fn send_to(&mut self, buf: &[u8], addr: NetlinkAddr, deadline: &Deadline) -> Result<usize> {
        let sa = sockaddr(addr);
        self.attempt(libc::POLLOUT, deadline, |fd| {
            // SAFETY: `buf` is valid for reads of `buf.len()` bytes and `sa` is a
            // sockaddr_nl whose full struct size is passed as the address length.
            unsafe {
                libc::sendto(
                    fd,
                    buf.as_ptr().cast::<libc::c_void>(),
                    buf.len(),
                    0,
                    (&sa as *const libc::sockaddr_nl).cast::<libc::sockaddr>(),
                    SOCKADDR_NL_LEN,
                )
            }
        })
    }

    fn recv(&mut self, buf: &mut [u8], deadline: &Deadline) -> Result<usize> {
        let got = self.attempt(libc::POLLIN, deadline, |fd| {
            // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
            unsafe { libc::recv(fd, buf.as_mut_ptr().cast::<libc::c_void>(), buf.len(), 0) }
        })?;
        if got == 0 {
            return Err(TransportError::Closed);
        }
        Ok(got)
    }

    fn recv_from(&mut self, buf: &mut [u8], deadline: &Deadline) -> Result<(usize, NetlinkAddr)> {
        let mut sa = sockaddr(NetlinkAddr::default());
        let mut len = SOCKADDR_NL_LEN;
        let got = self.attempt(libc::POLLIN, deadline, |fd| {
            len = SOCKADDR_NL_LEN;
            // SAFETY: `buf` is valid for writes of `buf.len()` bytes; `sa` and `len`
            // describe a writable sockaddr_nl.
            unsafe {
                libc::recvfrom(
                    fd,
                    buf.as_mut_ptr().cast::<libc::c_void>(),
                    buf.len(),
                    0,
                    (&mut sa as *mut libc::sockaddr_nl).cast::<libc::sockaddr>(),
                    &mut len,
                )
            }
        })?;
        if got == 0 {
            return Err(TransportError::Closed);
        }
        Ok((got, NetlinkAddr::new(sa.nl_pid, sa.nl_groups)))
    }

    fn local_addr(&self) -> Result<NetlinkAddr> {
        let fd = self.raw_fd()?;
        let mut sa = sockaddr(NetlinkAddr::default());
        let mut len = SOCKADDR_NL_LEN;
        // SAFETY: `sa` and `len` describe a writable sockaddr_nl.
        let rc = unsafe {
            libc::getsockname(
                fd,
                (&mut sa as *mut libc::sockaddr_nl).cast::<libc::sockaddr>(),
                &mut len,
            )
        };
        if rc < 0 {
            return Err(TransportError::Io(io::Error::last_os_error()));
        }
        Ok(NetlinkAddr::new(sa.nl_pid, sa.nl_groups))
    }

    fn close(&mut self) {
        if let Some(fd) = self.fd.take() {
            debug!(fd = fd.as_raw_fd(), "closing netlink socket");
        }
    }

    fn is_closed(&self) -> bool {
        self.fd.is_none()
    }
}

impl AsRawFd for NetlinkSocket {
    /// Returns `-1` once the socket has been closed.
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_ref().map_or(-1, AsRawFd::as_raw_fd)
    }
}

impl std::fmt::Debug for NetlinkSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetlinkSocket")
            .field("fd", &self.as_raw_fd())
            .field("protocol", &self.protocol)
            .finish()
    }
}

fn sockaddr(addr: NetlinkAddr) -> libc::sockaddr_nl {
    // SAFETY: sockaddr_nl is plain old data; all-zero is a valid value.
    let mut sa: libc::sockaddr_nl = unsafe { std::mem::zeroed() };
    sa.nl_family = libc::AF_NETLINK as libc::sa_family_t;
    sa.nl_pid = addr.pid;
    sa.nl_groups = addr.groups;
    sa
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own, with integer arguments only.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn wait_fd(fd: RawFd, events: libc::c_short, deadline: &Deadline) -> Result<()> {
    loop {
        let timeout_ms = match deadline.remaining() {
            None => -1,
            Some(left) if left.is_zero() => {
                return Err(TransportError::Timeout(deadline.budget()));
            }
            // Round up so a sub-millisecond budget still waits once.
            Some(left) => left
                .as_nanos()
                .div_ceil(1_000_000)
                .min(libc::c_int::MAX as u128) as libc::c_int,
        };

        let mut pfd = libc::pollfd {
            fd,
            events,
            revents: 0,
        };
        trace!(fd, timeout_ms, "waiting on netlink socket");
        // SAFETY: `pfd` is a single valid pollfd.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(TransportError::Io(err));
        }
        if rc == 0 {
            return Err(TransportError::Timeout(deadline.budget()));
        }
        return Ok(());
    }
}
