use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use nlprims_frame::{
    check_supported, decode_error_code, frame_consistent, AttrRef, GenlHeader, IoBuffers,
    MalformedFrame, MessageHeader, NLMSG_ERROR, NLMSG_HDRLEN, NLM_F_REQUEST,
};
use nlprims_transport::{Deadline, NetlinkAddr, Transport, NETLINK_GENERIC};
use tracing::{debug, trace, warn};

use crate::config::{EndpointConfig, GenericConfig};
use crate::error::{EndpointError, Result};
use crate::resolver::resolve_family_id;

/// Frame shape used by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Header followed directly by the payload.
    Raw,
    /// Header, generic sub-header, then the payload as an attribute.
    Generic,
}

impl Variant {
    pub fn from_protocol(protocol: i32) -> Self {
        if protocol == NETLINK_GENERIC {
            Self::Generic
        } else {
            Self::Raw
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Generic => "generic",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// No default peer. `send_to`/`receive_from` apply.
    Unconnected,
    /// A default peer is set. `send`/`receive` apply.
    Connected { peer: NetlinkAddr },
    /// Terminal. Only `close` is accepted.
    Closed,
}

impl EndpointState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unconnected => "unconnected",
            Self::Connected { .. } => "connected",
            Self::Closed => "closed",
        }
    }
}

/// Per-send header choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendOptions {
    /// `NLM_F_*` bits. Only `NLM_F_REQUEST` is accepted.
    pub flags: u16,
    /// Header type for raw frames. Generic frames carry the family id instead.
    pub msg_type: u16,
}

impl SendOptions {
    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_type(mut self, msg_type: u16) -> Self {
        self.msg_type = msg_type;
        self
    }
}

/// One received frame: its header plus the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub header: MessageHeader,
    pub payload: Bytes,
}

impl Incoming {
    /// Port id the sender wrote into the header.
    pub fn sender(&self) -> u32 {
        self.header.pid
    }
}

/// A netlink message endpoint.
///
/// Owns one transport handle, one deadline and a pair of fixed frame
/// buffers. Which operations are accepted depends on [`EndpointState`].
pub struct Endpoint<T: Transport> {
    transport: T,
    protocol: i32,
    variant: Variant,
    state: EndpointState,
    local: NetlinkAddr,
    family_id: Option<u16>,
    seq: u32,
    deadline: Deadline,
    buffers: IoBuffers,
    max_payload: usize,
    generic: GenericConfig,
}

#[cfg(target_os = "linux")]
impl Endpoint<nlprims_transport::NetlinkSocket> {
    /// Open a netlink socket for `protocol` with default configuration.
    pub fn open(protocol: i32) -> Result<Self> {
        Self::open_with_config(protocol, EndpointConfig::default())
    }

    /// Open a netlink socket for `protocol`.
    pub fn open_with_config(protocol: i32, config: EndpointConfig) -> Result<Self> {
        let socket = nlprims_transport::NetlinkSocket::open(protocol)?;
        Ok(Self::with_transport(socket, protocol, config))
    }
}

impl<T: Transport> Endpoint<T> {
    /// Wrap an already created transport. `protocol` selects the variant.
    ///
    /// The configured payload ceiling is clamped to what the variant's frame
    /// format can carry.
    pub fn with_transport(transport: T, protocol: i32, config: EndpointConfig) -> Self {
        let variant = Variant::from_protocol(protocol);
        let requested = config.frame.max_payload_size;
        let buffers = match variant {
            Variant::Raw => IoBuffers::raw(requested),
            Variant::Generic => IoBuffers::generic(requested),
        };
        let max_payload = buffers.max_payload();
        if max_payload < requested {
            warn!(requested, max_payload, %variant, "payload ceiling clamped to frame format");
        }
        debug!(
            protocol,
            %variant,
            max_payload,
            capacity = buffers.send.capacity(),
            "endpoint opened"
        );
        Self {
            transport,
            protocol,
            variant,
            state: EndpointState::Unconnected,
            local: NetlinkAddr::default(),
            family_id: None,
            seq: 1,
            deadline: Deadline::new(config.block_timeout, config.total_timeout),
            buffers,
            max_payload,
            generic: config.generic,
        }
    }

    fn illegal(&self, operation: &'static str) -> EndpointError {
        EndpointError::IllegalState {
            operation,
            state: self.state.name(),
        }
    }

    fn require_unconnected(&self, operation: &'static str) -> Result<()> {
        match self.state {
            EndpointState::Unconnected => Ok(()),
            _ => Err(self.illegal(operation)),
        }
    }

    fn require_connected(&self, operation: &'static str) -> Result<NetlinkAddr> {
        match self.state {
            EndpointState::Connected { peer } => Ok(peer),
            _ => Err(self.illegal(operation)),
        }
    }

    /// Bind the local end to `local_id` and join `groups`.
    ///
    /// Binding to 0 lets the kernel pick the port id, which is read back.
    pub fn bind(&mut self, local_id: u32, groups: u32) -> Result<()> {
        self.require_unconnected("bind")?;
        self.transport.bind(NetlinkAddr::new(local_id, groups))?;
        let pid = if local_id == 0 {
            self.transport.local_addr().map_or(0, |addr| addr.pid)
        } else {
            local_id
        };
        self.local = NetlinkAddr::new(pid, groups);
        debug!(local = %self.local, "endpoint bound");
        Ok(())
    }

    /// Set or clear the default peer.
    ///
    /// `Some` connects (or re-targets a connected endpoint); on failure the
    /// previous state is kept. `None` returns to `Unconnected` and never fails.
    pub fn set_peer_name(&mut self, peer: Option<NetlinkAddr>) -> Result<()> {
        if self.state == EndpointState::Closed {
            return Err(self.illegal("set_peer_name"));
        }
        match peer {
            Some(peer) => {
                self.transport.connect(Some(peer))?;
                self.state = EndpointState::Connected { peer };
                debug!(%peer, "endpoint connected");
            }
            None => {
                if let EndpointState::Connected { peer } = self.state {
                    if let Err(err) = self.transport.connect(None) {
                        warn!(%peer, error = %err, "transport disconnect failed");
                    }
                    self.state = EndpointState::Unconnected;
                    debug!(%peer, "endpoint disconnected");
                }
            }
        }
        Ok(())
    }

    /// Send `payload` to the connected peer. Returns the bytes transmitted.
    pub fn send(&mut self, payload: &[u8], options: SendOptions) -> Result<usize> {
        let peer = self.require_connected("send")?;
        self.transmit(payload, peer, true, options)
    }

    /// Send `payload` to `addr`. Returns the bytes transmitted.
    pub fn send_to(
        &mut self,
        payload: &[u8],
        addr: NetlinkAddr,
        options: SendOptions,
    ) -> Result<usize> {
        self.require_unconnected("send_to")?;
        self.transmit(payload, addr, false, options)
    }

    /// Receive one payload from the connected peer.
    pub fn receive(&mut self) -> Result<Bytes> {
        self.receive_frame().map(|frame| frame.payload)
    }

    /// Receive one payload and the port id of its sender.
    pub fn receive_from(&mut self) -> Result<(Bytes, u32)> {
        let frame = self.receive_frame_from()?;
        let sender = frame.sender();
        Ok((frame.payload, sender))
    }

    /// Like [`Endpoint::receive`], keeping the frame header.
    pub fn receive_frame(&mut self) -> Result<Incoming> {
        self.require_connected("receive")?;
        self.deadline.mark_start();
        let n = self
            .transport
            .recv(self.buffers.recv.recv_space(), &self.deadline)?;
        self.decode_received(n)
    }

    /// Like [`Endpoint::receive_from`], keeping the frame header.
    pub fn receive_frame_from(&mut self) -> Result<Incoming> {
        self.require_unconnected("receive_from")?;
        self.deadline.mark_start();
        let (n, source) = self
            .transport
            .recv_from(self.buffers.recv.recv_space(), &self.deadline)?;
        trace!(%source, bytes = n, "datagram received");
        self.decode_received(n)
    }

    /// Resolve and cache the generic family id, asking the controller at
    /// `target_pid`. A cached id is returned without any I/O.
    pub fn resolve_family(&mut self, target_pid: u32) -> Result<u16> {
        if self.state == EndpointState::Closed {
            return Err(self.illegal("resolve_family"));
        }
        if self.variant != Variant::Generic {
            return Err(EndpointError::IllegalState {
                operation: "resolve_family",
                state: "raw",
            });
        }
        self.ensure_family(target_pid)
    }

    /// Release the transport and both buffers. Repeated calls do nothing.
    pub fn close(&mut self) {
        if self.state == EndpointState::Closed {
            return;
        }
        self.transport.close();
        self.buffers.release();
        self.state = EndpointState::Closed;
        debug!(local = %self.local, "endpoint closed");
    }

    fn ensure_family(&mut self, target_pid: u32) -> Result<u16> {
        if let Some(id) = self.family_id {
            return Ok(id);
        }
        let id = resolve_family_id(
            &mut self.transport,
            &mut self.buffers,
            &mut self.deadline,
            self.local.pid,
            target_pid,
            &self.generic,
        )?;
        self.family_id = Some(id);
        Ok(id)
    }

    fn next_seq(&mut self) -> u32 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    fn transmit(
        &mut self,
        payload: &[u8],
        dest: NetlinkAddr,
        connected: bool,
        options: SendOptions,
    ) -> Result<usize> {
        check_supported(options.flags)?;
        if payload.len() > self.max_payload {
            return Err(EndpointError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }

        let frame = match self.variant {
            Variant::Raw => {
                let header =
                    MessageHeader::new(options.msg_type, options.flags, self.seq, self.local.pid);
                self.buffers.send.encode_message(&header, payload)?
            }
            Variant::Generic => {
                let family = self.ensure_family(dest.pid)?;
                let header = MessageHeader::new(
                    family,
                    options.flags | NLM_F_REQUEST,
                    self.seq,
                    self.local.pid,
                );
                self.buffers.send.encode_generic(
                    &header,
                    &GenlHeader::new(self.generic.command, self.generic.version),
                    &[AttrRef::new(self.generic.message_attribute, payload)],
                )?
            }
        };

        self.deadline.mark_start();
        let sent = if connected {
            self.transport.send(frame, &self.deadline)?
        } else {
            self.transport.send_to(frame, dest, &self.deadline)?
        };
        debug!(to = %dest, payload = payload.len(), bytes = sent, "frame sent");
        self.next_seq();
        Ok(sent)
    }

    fn decode_received(&mut self, n: usize) -> Result<Incoming> {
        let received = self.buffers.recv.filled(n);
        match self.variant {
            Variant::Raw => {
                let message = self.buffers.recv.decode_message()?;
                Ok(Incoming {
                    header: message.header,
                    payload: message.payload,
                })
            }
            Variant::Generic => {
                let (header, declared) = MessageHeader::parse(received)?;
                if header.msg_type == NLMSG_ERROR && frame_consistent(received) {
                    let errno = decode_error_code(&received[NLMSG_HDRLEN..declared])?;
                    return Err(EndpointError::KernelError(errno));
                }
                let message = self.buffers.recv.decode_generic()?;
                let payload = message
                    .attributes
                    .into_iter()
                    .next()
                    .map(|attr| attr.value)
                    .ok_or(MalformedFrame::MissingAttribute)?;
                Ok(Incoming {
                    header: message.header,
                    payload,
                })
            }
        }
    }

    pub fn local_id(&self) -> u32 {
        self.local.pid
    }

    pub fn peer(&self) -> Option<NetlinkAddr> {
        match self.state {
            EndpointState::Connected { peer } => Some(peer),
            _ => None,
        }
    }

    pub fn peer_id(&self) -> Option<u32> {
        self.peer().map(|peer| peer.pid)
    }

    pub fn state(&self) -> EndpointState {
        self.state
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn protocol(&self) -> i32 {
        self.protocol
    }

    /// Cached generic family id, if resolved.
    pub fn family_id(&self) -> Option<u16> {
        self.family_id
    }

    /// Block timeout applied to each transport call.
    pub fn timeout(&self) -> Option<Duration> {
        self.deadline.block()
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.deadline.set_block(timeout);
    }

    pub fn total_timeout(&self) -> Option<Duration> {
        self.deadline.total()
    }

    pub fn set_total_timeout(&mut self, timeout: Option<Duration>) {
        self.deadline.set_total(timeout);
    }

    pub fn is_closed(&self) -> bool {
        self.state == EndpointState::Closed
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Sequence number the next frame will carry.
    pub fn next_sequence(&self) -> u32 {
        self.seq
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(unix)]
impl<T: Transport + std::os::fd::AsRawFd> std::os::fd::AsRawFd for Endpoint<T> {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.transport.as_raw_fd()
    }
}

impl<T: Transport> Drop for Endpoint<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Transport> fmt::Debug for Endpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("protocol", &self.protocol)
            .field("variant", &self.variant)
            .field("state", &self.state)
            .field("local", &self.local)
            .field("family_id", &self.family_id)
            .field("max_payload", &self.max_payload)
            .finish_non_exhaustive()
    }
}
