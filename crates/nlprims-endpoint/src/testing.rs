//! Scripted transport used by the unit tests.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use bytes::BytesMut;
use nlprims_frame::{
    encode_generic, encode_message, AttrRef, GenlHeader, MessageHeader, GENL_ID_CTRL,
    NLMSG_ERROR,
};
use nlprims_transport::{Deadline, NetlinkAddr, Result, Transport, TransportError};

use crate::resolver::{CTRL_ATTR_FAMILY_ID, CTRL_ATTR_FAMILY_NAME};

pub(crate) type Reply = Result<(Vec<u8>, NetlinkAddr)>;

/// Records every datagram sent and replays queued replies.
///
/// When `family_id` is set, each controller lookup it sees queues a matching
/// answer at the front of the reply queue.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    pub sent: Vec<(Vec<u8>, Option<NetlinkAddr>)>,
    pub replies: VecDeque<Reply>,
    pub family_id: Option<u16>,
    pub resolutions: usize,
    pub bound: Option<NetlinkAddr>,
    pub peer: Option<NetlinkAddr>,
    pub fail_connect: bool,
    pub fail_bind: bool,
    pub closed: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_family(family_id: u16) -> Self {
        Self {
            family_id: Some(family_id),
            ..Self::default()
        }
    }

    pub fn push_reply(&mut self, frame: Vec<u8>, from: u32) {
        self.replies.push_back(Ok((frame, NetlinkAddr::pid(from))));
    }

    fn record(&mut self, buf: &[u8], addr: Option<NetlinkAddr>) -> Result<usize> {
        if self.closed {
            return Err(TransportError::Shutdown);
        }
        let msg_type = u16::from_ne_bytes([buf[4], buf[5]]);
        if msg_type == GENL_ID_CTRL {
            self.resolutions += 1;
            if let Some(id) = self.family_id {
                self.replies
                    .push_front(Ok((control_reply("NFLUA", id), NetlinkAddr::pid(0))));
            }
        }
        self.sent.push((buf.to_vec(), addr));
        Ok(buf.len())
    }

    fn pop(&mut self, buf: &mut [u8]) -> Result<(usize, NetlinkAddr)> {
        if self.closed {
            return Err(TransportError::Shutdown);
        }
        let (frame, from) = self
            .replies
            .pop_front()
            .unwrap_or(Err(TransportError::Timeout(Duration::ZERO)))?;
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Ok((n, from))
    }
}

impl Transport for ScriptedTransport {
    fn bind(&mut self, addr: NetlinkAddr) -> Result<()> {
        if self.fail_bind {
            return Err(TransportError::Bind {
                addr,
                source: io::Error::from(io::ErrorKind::AddrInUse),
            });
        }
        self.bound = Some(addr);
        Ok(())
    }

    fn connect(&mut self, addr: Option<NetlinkAddr>) -> Result<()> {
        if let (true, Some(addr)) = (self.fail_connect, addr) {
            return Err(TransportError::Connect {
                addr,
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            });
        }
        self.peer = addr;
        Ok(())
    }

    fn send(&mut self, buf: &[u8], _deadline: &Deadline) -> Result<usize> {
        let peer = self.peer;
        self.record(buf, peer)
    }

    fn send_to(&mut self, buf: &[u8], addr: NetlinkAddr, _deadline: &Deadline) -> Result<usize> {
        self.record(buf, Some(addr))
    }

    fn recv(&mut self, buf: &mut [u8], _deadline: &Deadline) -> Result<usize> {
        self.pop(buf).map(|(n, _)| n)
    }

    fn recv_from(&mut self, buf: &mut [u8], _deadline: &Deadline) -> Result<(usize, NetlinkAddr)> {
        self.pop(buf)
    }

    fn local_addr(&self) -> Result<NetlinkAddr> {
        Ok(self.bound.unwrap_or_default())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

pub(crate) fn raw_frame(header: MessageHeader, payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_message(&header, payload, &mut buf, usize::MAX).unwrap();
    buf.to_vec()
}

pub(crate) fn generic_frame(header: MessageHeader, attrs: &[AttrRef<'_>]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_generic(&header, &GenlHeader::new(1, 1), attrs, &mut buf, usize::MAX).unwrap();
    buf.to_vec()
}

/// A controller answer carrying the echoed name and then the family id.
pub(crate) fn control_reply(name: &str, family_id: u16) -> Vec<u8> {
    let mut name = name.as_bytes().to_vec();
    name.push(0);
    generic_frame(
        MessageHeader::new(GENL_ID_CTRL, 0, 0, 0),
        &[
            AttrRef::new(CTRL_ATTR_FAMILY_NAME, &name),
            AttrRef::new(CTRL_ATTR_FAMILY_ID, &family_id.to_ne_bytes()),
        ],
    )
}

/// An error frame carrying `-errno`, followed by the offending header.
pub(crate) fn error_reply(errno: i32) -> Vec<u8> {
    let mut payload = (-errno).to_ne_bytes().to_vec();
    payload.extend_from_slice(&[0; 16]);
    raw_frame(MessageHeader::new(NLMSG_ERROR, 0, 0, 0), &payload)
}
