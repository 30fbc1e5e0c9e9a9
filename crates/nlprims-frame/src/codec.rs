use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::attr::{
    nla_total_size, parse_attributes, put_attribute, AttrRef, Attribute, NLA_MAX_VALUE,
};
use crate::error::{FrameError, MalformedFrame, Result};

/// Message header: length (4) + type (2) + flags (2) + sequence (4) + pid (4) = 16 bytes.
pub const NLMSG_HDRLEN: usize = 16;

/// Generic sub-header: command (1) + version (1) + reserved (2) = 4 bytes.
pub const GENL_HDRLEN: usize = 4;

/// Frame alignment quantum.
pub const NLMSG_ALIGNTO: usize = 4;

/// Default maximum payload size: 64 KiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024;

/// Compact maximum payload size: 2 KiB.
pub const COMPACT_MAX_PAYLOAD: usize = 2 * 1024;

/// Largest raw payload whose padded frame still fits the 32-bit length field.
pub const RAW_MAX_PAYLOAD: usize =
    (u32::MAX as usize & !(NLMSG_ALIGNTO - 1)) - NLMSG_HDRLEN;

/// Largest generic payload: one attribute value bounded by its 16-bit
/// length field.
pub const GENERIC_MAX_PAYLOAD: usize = NLA_MAX_VALUE;

/// Clamp a configured raw ceiling to what the frame format can carry.
pub const fn raw_payload_limit(max_payload: usize) -> usize {
    if max_payload > RAW_MAX_PAYLOAD {
        RAW_MAX_PAYLOAD
    } else {
        max_payload
    }
}

/// Clamp a configured generic ceiling to what one attribute can carry.
pub const fn generic_payload_limit(max_payload: usize) -> usize {
    if max_payload > GENERIC_MAX_PAYLOAD {
        GENERIC_MAX_PAYLOAD
    } else {
        max_payload
    }
}

/// Round `len` up to the frame alignment quantum.
pub const fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

/// Declared length of a frame carrying `payload_len` bytes (unpadded).
pub const fn nlmsg_length(payload_len: usize) -> usize {
    payload_len + NLMSG_HDRLEN
}

/// Bytes on the wire for a frame carrying `payload_len` bytes (padded).
pub const fn nlmsg_space(payload_len: usize) -> usize {
    nlmsg_align(nlmsg_length(payload_len))
}

/// Buffer size needed for raw frames with payloads up to `max_payload`,
/// after clamping with [`raw_payload_limit`].
pub const fn raw_frame_capacity(max_payload: usize) -> usize {
    nlmsg_space(raw_payload_limit(max_payload))
}

/// Buffer size needed for generic frames whose payload attribute carries up
/// to `max_payload` bytes, after clamping with [`generic_payload_limit`].
pub const fn generic_frame_capacity(max_payload: usize) -> usize {
    nlmsg_align(NLMSG_HDRLEN + GENL_HDRLEN + nla_total_size(generic_payload_limit(max_payload)))
}

/// Fixed message header fields. The length field is derived on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageHeader {
    /// Message type.
    pub msg_type: u16,
    /// `NLM_F_*` flag bits.
    pub flags: u16,
    /// Sequence number.
    pub seq: u32,
    /// Sender port id.
    pub pid: u32,
}

impl MessageHeader {
    pub fn new(msg_type: u16, flags: u16, seq: u32, pid: u32) -> Self {
        Self {
            msg_type,
            flags,
            seq,
            pid,
        }
    }

    fn put(&self, len: usize, dst: &mut BytesMut) {
        dst.put_u32_ne(len as u32);
        dst.put_u16_ne(self.msg_type);
        dst.put_u16_ne(self.flags);
        dst.put_u32_ne(self.seq);
        dst.put_u32_ne(self.pid);
    }

    /// Peek the header at the front of `src`, returning it with the declared
    /// frame length. Only the header size is checked here.
    pub fn parse(src: &[u8]) -> std::result::Result<(Self, usize), MalformedFrame> {
        if src.len() < NLMSG_HDRLEN {
            return Err(MalformedFrame::HeaderTruncated {
                received: src.len(),
            });
        }
        let mut cur = &src[..NLMSG_HDRLEN];
        let len = cur.get_u32_ne() as usize;
        let header = Self {
            msg_type: cur.get_u16_ne(),
            flags: cur.get_u16_ne(),
            seq: cur.get_u32_ne(),
            pid: cur.get_u32_ne(),
        };
        Ok((header, len))
    }
}

/// Generic netlink sub-header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenlHeader {
    pub cmd: u8,
    pub version: u8,
}

impl GenlHeader {
    pub fn new(cmd: u8, version: u8) -> Self {
        Self { cmd, version }
    }
}

/// A decoded raw frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub header: MessageHeader,
    pub payload: Bytes,
}

impl Message {
    pub fn new(header: MessageHeader, payload: impl Into<Bytes>) -> Self {
        Self {
            header,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload + padding).
    pub fn wire_size(&self) -> usize {
        nlmsg_space(self.payload.len())
    }
}

/// A decoded generic frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericMessage {
    pub header: MessageHeader,
    pub genl: GenlHeader,
    pub attributes: Vec<Attribute>,
}

impl GenericMessage {
    /// The first attribute with type `attr_type`.
    pub fn attribute(&self, attr_type: u16) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }
}

/// Wire size of a generic frame carrying `attrs`.
pub fn generic_wire_size(attrs: &[AttrRef<'_>]) -> usize {
    nlmsg_align(NLMSG_HDRLEN + GENL_HDRLEN + attrs.iter().map(AttrRef::wire_size).sum::<usize>())
}

/// Encode a raw frame.
///
/// Wire format:
/// ```text
/// ┌──────────┬──────────┬──────────┬──────────┬──────────┬─────────────┬─────────┐
/// │ Length   │ Type     │ Flags    │ Sequence │ Pid      │ Payload     │ Padding │
/// │ (4B)     │ (2B)     │ (2B)     │ (4B)     │ (4B)     │             │ to 4B   │
/// └──────────┴──────────┴──────────┴──────────┴──────────┴─────────────┴─────────┘
/// ```
/// Integers are in host byte order. `Length` counts header and payload but
/// not padding. `max_payload` is clamped to [`RAW_MAX_PAYLOAD`]. Returns the
/// number of bytes written.
pub fn encode_message(
    header: &MessageHeader,
    payload: &[u8],
    dst: &mut BytesMut,
    max_payload: usize,
) -> Result<usize> {
    let max_payload = raw_payload_limit(max_payload);
    if payload.len() > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: max_payload,
        });
    }
    let len = nlmsg_length(payload.len());
    let space = nlmsg_align(len);
    dst.reserve(space);
    header.put(len, dst);
    dst.put_slice(payload);
    dst.put_bytes(0, space - len);
    Ok(space)
}

/// Encode a generic frame: message header, generic sub-header, then one
/// aligned record per attribute. Every attribute value is bounded by
/// `max_payload`, clamped to [`GENERIC_MAX_PAYLOAD`]. Returns the number of
/// bytes written.
pub fn encode_generic(
    header: &MessageHeader,
    genl: &GenlHeader,
    attrs: &[AttrRef<'_>],
    dst: &mut BytesMut,
    max_payload: usize,
) -> Result<usize> {
    let max_payload = generic_payload_limit(max_payload);
    if let Some(big) = attrs.iter().find(|a| a.value.len() > max_payload) {
        return Err(FrameError::PayloadTooLarge {
            size: big.value.len(),
            max: max_payload,
        });
    }
    let len = generic_wire_size(attrs);
    if len > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: u32::MAX as usize,
        });
    }
    dst.reserve(len);
    header.put(len, dst);
    dst.put_u8(genl.cmd);
    dst.put_u8(genl.version);
    dst.put_u16_ne(0);
    for attr in attrs {
        put_attribute(dst, *attr)?;
    }
    Ok(len)
}

/// Check the declared length against the bytes received.
fn checked_frame(src: &[u8]) -> std::result::Result<(MessageHeader, &[u8]), MalformedFrame> {
    let (header, declared) = MessageHeader::parse(src)?;
    if declared < NLMSG_HDRLEN || declared > src.len() {
        warn!(declared, received = src.len(), "rejecting frame with inconsistent length");
        return Err(MalformedFrame::LengthMismatch {
            declared,
            received: src.len(),
        });
    }
    Ok((header, &src[..declared]))
}

/// True when `src` starts with a frame whose declared length fits the bytes
/// received.
pub fn frame_consistent(src: &[u8]) -> bool {
    checked_frame(src).is_ok()
}

/// Decode a raw frame from the bytes of one received datagram.
pub fn decode_message(src: &[u8], max_payload: usize) -> Result<Message> {
    let (header, frame) = checked_frame(src)?;
    let payload = &frame[NLMSG_HDRLEN..];
    if payload.len() > max_payload {
        return Err(MalformedFrame::PayloadExceedsMax {
            size: payload.len(),
            max: max_payload,
        }
        .into());
    }
    Ok(Message {
        header,
        payload: Bytes::copy_from_slice(payload),
    })
}

/// Decode a generic frame from the bytes of one received datagram.
pub fn decode_generic(src: &[u8], max_payload: usize) -> Result<GenericMessage> {
    let (header, frame) = checked_frame(src)?;
    let body = &frame[NLMSG_HDRLEN..];
    if body.len() < GENL_HDRLEN {
        return Err(MalformedFrame::GenericHeaderTruncated {
            available: body.len(),
        }
        .into());
    }
    let attr_region = &body[GENL_HDRLEN..];
    let region_max = nla_total_size(generic_payload_limit(max_payload));
    if attr_region.len() > region_max {
        return Err(MalformedFrame::PayloadExceedsMax {
            size: attr_region.len(),
            max: region_max,
        }
        .into());
    }

    let genl = GenlHeader {
        cmd: body[0],
        version: body[1],
    };
    let attributes = parse_attributes(attr_region, NLMSG_HDRLEN + GENL_HDRLEN)?;
    Ok(GenericMessage {
        header,
        genl,
        attributes,
    })
}

/// Read the error code carried by an `NLMSG_ERROR` payload.
///
/// The kernel stores a negated errno; this returns it as a positive value
/// (zero means acknowledgement).
pub fn decode_error_code(payload: &[u8]) -> std::result::Result<i32, MalformedFrame> {
    if payload.len() < 4 {
        return Err(MalformedFrame::ErrorPayloadTruncated { len: payload.len() });
    }
    let mut cur = &payload[..4];
    Ok(cur.get_i32_ne().wrapping_neg())
}

/// Configuration for the frame codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 64 KiB.
    pub max_payload_size: usize,
}

impl FrameConfig {
    /// Configuration with the 2 KiB ceiling.
    pub fn compact() -> Self {
        Self {
            max_payload_size: COMPACT_MAX_PAYLOAD,
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
