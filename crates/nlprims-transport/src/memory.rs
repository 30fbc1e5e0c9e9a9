//! In-process datagram fabric with netlink addressing.
//!
//! Sockets created from the same [`MemoryNetwork`] exchange datagrams by
//! port id, honour multicast group masks and connected-peer filtering, and
//! respect deadlines the same way [`crate::NetlinkSocket`] does. Useful for
//! tests and for running endpoints where netlink sockets are unavailable.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::deadline::Deadline;
use crate::error::{Result, TransportError};
use crate::traits::{NetlinkAddr, Transport};

const FIRST_AUTOBIND_PID: u32 = 0x8000_0000;

#[derive(Default)]
struct Mailbox {
    queue: VecDeque<(Bytes, NetlinkAddr)>,
    groups: u32,
    peer: Option<NetlinkAddr>,
}

#[derive(Default)]
struct Fabric {
    mailboxes: HashMap<u32, Mailbox>,
    next_autobind: u32,
}

struct Shared {
    fabric: Mutex<Fabric>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Fabric> {
        self.fabric.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A shared in-memory netlink "bus".
#[derive(Clone)]
pub struct MemoryNetwork {
    shared: Arc<Shared>,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                fabric: Mutex::new(Fabric {
                    mailboxes: HashMap::new(),
                    next_autobind: FIRST_AUTOBIND_PID,
                }),
                ready: Condvar::new(),
            }),
        }
    }

    /// Create an unbound socket attached to this network.
    pub fn socket(&self) -> MemorySocket {
        MemorySocket {
            network: self.clone(),
            local: None,
            peer: None,
            closed: false,
        }
    }

    /// Queue a raw datagram for `to` as if `from` had sent it.
    ///
    /// Returns false when no socket is bound to `to`.
    pub fn inject(&self, to: u32, from: NetlinkAddr, datagram: impl Into<Bytes>) -> bool {
        let mut fabric = self.shared.lock();
        let Some(mailbox) = fabric.mailboxes.get_mut(&to) else {
            return false;
        };
        mailbox.queue.push_back((datagram.into(), from));
        drop(fabric);
        self.shared.ready.notify_all();
        true
    }

    /// Number of datagrams waiting for `pid`.
    pub fn pending(&self, pid: u32) -> usize {
        self.shared
            .lock()
            .mailboxes
            .get(&pid)
            .map_or(0, |mailbox| mailbox.queue.len())
    }

    /// True when some socket is bound to `pid`.
    pub fn is_bound(&self, pid: u32) -> bool {
        self.shared.lock().mailboxes.contains_key(&pid)
    }
}

/// One endpoint on a [`MemoryNetwork`].
pub struct MemorySocket {
    network: MemoryNetwork,
    local: Option<NetlinkAddr>,
    peer: Option<NetlinkAddr>,
    closed: bool,
}

impl MemorySocket {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TransportError::Shutdown);
        }
        Ok(())
    }

    fn bind_locked(&mut self, fabric: &mut Fabric, addr: NetlinkAddr) -> Result<NetlinkAddr> {
        if let Some(previous) = self.local {
            fabric.mailboxes.remove(&previous.pid);
        }
        let pid = if addr.pid == 0 {
            let mut candidate = fabric.next_autobind;
            while fabric.mailboxes.contains_key(&candidate) {
                candidate = candidate.wrapping_add(1).max(FIRST_AUTOBIND_PID);
            }
            fabric.next_autobind = candidate.wrapping_add(1).max(FIRST_AUTOBIND_PID);
            candidate
        } else if fabric.mailboxes.contains_key(&addr.pid) {
            return Err(TransportError::Bind {
                addr,
                source: io::Error::from(io::ErrorKind::AddrInUse),
            });
        } else {
            addr.pid
        };

        fabric.mailboxes.insert(
            pid,
            Mailbox {
                groups: addr.groups,
                peer: self.peer,
                ..Mailbox::default()
            },
        );
        let bound = NetlinkAddr::new(pid, addr.groups);
        self.local = Some(bound);
        Ok(bound)
    }

    fn deliver(&mut self, buf: &[u8], addr: NetlinkAddr) -> Result<usize> {
        self.ensure_open()?;
        let shared = Arc::clone(&self.network.shared);
        let mut fabric = shared.lock();
        let source = match self.local {
            Some(local) => local,
            None => self.bind_locked(&mut fabric, NetlinkAddr::default())?,
        };
        let datagram = Bytes::copy_from_slice(buf);

        if addr.groups != 0 {
            for (pid, mailbox) in fabric.mailboxes.iter_mut() {
                if *pid != source.pid && mailbox.groups & addr.groups != 0 {
                    mailbox.queue.push_back((datagram.clone(), source));
                }
            }
        }

        if addr.pid != 0 || addr.groups == 0 {
            let Some(mailbox) = fabric.mailboxes.get_mut(&addr.pid) else {
                return Err(TransportError::Io(io::Error::from(
                    io::ErrorKind::ConnectionRefused,
                )));
            };
            if mailbox.peer.is_some_and(|peer| peer.pid != source.pid) {
                return Err(TransportError::Io(io::Error::from(
                    io::ErrorKind::ConnectionRefused,
                )));
            }
            mailbox.queue.push_back((datagram, source));
        }

        drop(fabric);
        shared.ready.notify_all();
        trace!(from = %source, to = %addr, len = buf.len(), "memory datagram queued");
        Ok(buf.len())
    }

    fn take(&mut self, buf: &mut [u8], deadline: &Deadline) -> Result<(usize, NetlinkAddr)> {
        self.ensure_open()?;
        let pid = match self.local {
            Some(local) => local.pid,
            None => {
                return Err(TransportError::Io(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "socket is not bound",
                )))
            }
        };

        // Wakeups for other mailboxes must not extend the wait.
        let until = deadline
            .remaining()
            .map(|left| Instant::now().checked_add(left));
        let shared = Arc::clone(&self.network.shared);
        let mut fabric = shared.lock();
        loop {
            let mailbox = fabric
                .mailboxes
                .get_mut(&pid)
                .ok_or(TransportError::Closed)?;
            if let Some((datagram, from)) = mailbox.queue.pop_front() {
                let n = datagram.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram[..n]);
                return Ok((n, from));
            }

            match until {
                None | Some(None) => {
                    fabric = shared
                        .ready
                        .wait(fabric)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                Some(Some(until)) => {
                    let left = until.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(TransportError::Timeout(deadline.budget()));
                    }
                    fabric = shared
                        .ready
                        .wait_timeout(fabric, left)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
}

impl Transport for MemorySocket {
    fn bind(&mut self, addr: NetlinkAddr) -> Result<()> {
        self.ensure_open()?;
        let network = self.network.clone();
        let mut fabric = network.shared.lock();
        let bound = self.bind_locked(&mut fabric, addr)?;
        debug!(addr = %bound, "bound memory socket");
        Ok(())
    }

    fn connect(&mut self, addr: Option<NetlinkAddr>) -> Result<()> {
        self.ensure_open()?;
        let network = self.network.clone();
        let mut fabric = network.shared.lock();
        if addr.is_some() && self.local.is_none() {
            self.bind_locked(&mut fabric, NetlinkAddr::default())?;
        }
        self.peer = addr;
        if let Some(local) = self.local {
            if let Some(mailbox) = fabric.mailboxes.get_mut(&local.pid) {
                mailbox.peer = addr;
            }
        }
        Ok(())
    }

    fn send(&mut self, buf: &[u8], _deadline: &Deadline) -> Result<usize> {
        let peer = self.peer.ok_or_else(|| {
            TransportError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "socket has no peer",
            ))
        })?;
        self.deliver(buf, peer)
    }

    fn send_to(&mut self, buf: &[u8], addr: NetlinkAddr, _deadline: &Deadline) -> Result<usize> {
        self.deliver(buf, addr)
    }

    fn recv(&mut self, buf: &mut [u8], deadline: &Deadline) -> Result<usize> {
        self.take(buf, deadline).map(|(n, _)| n)
    }

    fn recv_from(&mut self, buf: &mut [u8], deadline: &Deadline) -> Result<(usize, NetlinkAddr)> {
        self.take(buf, deadline)
    }

    fn local_addr(&self) -> Result<NetlinkAddr> {
        self.ensure_open()?;
        Ok(self.local.unwrap_or_default())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(local) = self.local.take() {
            self.network.shared.lock().mailboxes.remove(&local.pid);
            self.network.shared.ready.notify_all();
            debug!(addr = %local, "closed memory socket");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MemorySocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for MemorySocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySocket")
            .field("local", &self.local)
            .field("peer", &self.peer)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn deadline(ms: u64) -> Deadline {
        let mut deadline = Deadline::new(Some(Duration::from_millis(ms)), None);
        deadline.mark_start();
        deadline
    }

    #[test]
    fn unicast_roundtrip() {
        let net = MemoryNetwork::new();
        let mut a = net.socket();
        let mut b = net.socket();
        a.bind(NetlinkAddr::pid(10)).unwrap();
        b.bind(NetlinkAddr::pid(20)).unwrap();

        a.send_to(b"hi", NetlinkAddr::pid(20), &deadline(100)).unwrap();

        let mut buf = [0u8; 16];
        let (n, from) = b.recv_from(&mut buf, &deadline(100)).unwrap();
        assert_eq!(&buf[..n], b"hi");
        assert_eq!(from.pid, 10);
    }

    #[test]
    fn autobind_on_first_send() {
        let net = MemoryNetwork::new();
        let mut a = net.socket();
        let mut b = net.socket();
        b.bind(NetlinkAddr::pid(20)).unwrap();

        a.send_to(b"x", NetlinkAddr::pid(20), &deadline(100)).unwrap();
        let local = a.local_addr().unwrap();
        assert!(local.pid >= FIRST_AUTOBIND_PID);
        assert!(net.is_bound(local.pid));
    }

    #[test]
    fn duplicate_bind_rejected() {
        let net = MemoryNetwork::new();
        let mut a = net.socket();
        let mut b = net.socket();
        a.bind(NetlinkAddr::pid(5)).unwrap();
        let err = b.bind(NetlinkAddr::pid(5)).unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
    }

    #[test]
    fn unknown_destination_refused() {
        let net = MemoryNetwork::new();
        let mut a = net.socket();
        let err = a
            .send_to(b"x", NetlinkAddr::pid(999), &deadline(100))
            .unwrap_err();
        assert!(
            matches!(err, TransportError::Io(e) if e.kind() == io::ErrorKind::ConnectionRefused)
        );
    }

    #[test]
    fn connected_receiver_filters_other_senders() {
        let net = MemoryNetwork::new();
        let mut a = net.socket();
        let mut b = net.socket();
        let mut c = net.socket();
        a.bind(NetlinkAddr::pid(1)).unwrap();
        b.bind(NetlinkAddr::pid(2)).unwrap();
        c.bind(NetlinkAddr::pid(3)).unwrap();
        b.connect(Some(NetlinkAddr::pid(1))).unwrap();

        assert!(c.send_to(b"no", NetlinkAddr::pid(2), &deadline(10)).is_err());
        a.send_to(b"yes", NetlinkAddr::pid(2), &deadline(10)).unwrap();

        let mut buf = [0u8; 8];
        let n = b.recv(&mut buf, &deadline(100)).unwrap();
        assert_eq!(&buf[..n], b"yes");
    }

    #[test]
    fn multicast_reaches_group_members() {
        let net = MemoryNetwork::new();
        let mut tx = net.socket();
        let mut member = net.socket();
        let mut outsider = net.socket();
        tx.bind(NetlinkAddr::pid(1)).unwrap();
        member.bind(NetlinkAddr::new(2, 0b10)).unwrap();
        outsider.bind(NetlinkAddr::new(3, 0b01)).unwrap();

        tx.send_to(b"group", NetlinkAddr::new(0, 0b10), &deadline(10))
            .unwrap();
        assert_eq!(net.pending(2), 1);
        assert_eq!(net.pending(3), 0);
    }

    #[test]
    fn recv_times_out() {
        let net = MemoryNetwork::new();
        let mut a = net.socket();
        a.bind(NetlinkAddr::pid(1)).unwrap();
        let mut buf = [0u8; 8];
        let err = a.recv(&mut buf, &deadline(20)).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn unrelated_traffic_does_not_extend_timeout() {
        let net = MemoryNetwork::new();
        let mut rx = net.socket();
        rx.bind(NetlinkAddr::pid(1)).unwrap();
        let mut other = net.socket();
        other.bind(NetlinkAddr::pid(2)).unwrap();

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let chatter = {
            let net = net.clone();
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    net.inject(2, NetlinkAddr::pid(0), b"noise".to_vec());
                    std::thread::sleep(Duration::from_millis(2));
                }
            })
        };

        let started = Instant::now();
        let mut buf = [0u8; 8];
        let err = rx.recv(&mut buf, &deadline(50)).unwrap_err();
        let elapsed = started.elapsed();
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        chatter.join().unwrap();

        assert!(err.is_timeout());
        assert!(elapsed < Duration::from_secs(1), "waited {elapsed:?}");
        drop(other);
    }

    #[test]
    fn blocked_receiver_wakes_on_delivery() {
        let net = MemoryNetwork::new();
        let mut rx = net.socket();
        rx.bind(NetlinkAddr::pid(7)).unwrap();

        let sender_net = net.clone();
        let sender = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            sender_net.inject(7, NetlinkAddr::pid(0), b"late".to_vec())
        });

        let mut buf = [0u8; 8];
        let n = rx.recv(&mut buf, &Deadline::unbounded()).unwrap();
        assert_eq!(&buf[..n], b"late");
        assert!(sender.join().unwrap());
    }

    #[test]
    fn short_buffer_truncates_datagram() {
        let net = MemoryNetwork::new();
        let mut rx = net.socket();
        rx.bind(NetlinkAddr::pid(7)).unwrap();
        net.inject(7, NetlinkAddr::pid(0), b"abcdef".to_vec());

        let mut buf = [0u8; 3];
        let n = rx.recv(&mut buf, &deadline(10)).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf, b"abc");
    }

    #[test]
    fn close_unregisters_and_is_idempotent() {
        let net = MemoryNetwork::new();
        let mut a = net.socket();
        a.bind(NetlinkAddr::pid(9)).unwrap();
        a.close();
        a.close();
        assert!(a.is_closed());
        assert!(!net.is_bound(9));
        assert!(matches!(
            a.send_to(b"x", NetlinkAddr::pid(1), &deadline(10)),
            Err(TransportError::Shutdown)
        ));
    }
}
