use bytes::BytesMut;

use crate::attr::AttrRef;
use crate::codec::{
    decode_generic, decode_message, encode_generic, encode_message, generic_frame_capacity,
    generic_payload_limit, generic_wire_size, nlmsg_space, raw_frame_capacity, raw_payload_limit,
    GenericMessage, GenlHeader, Message, MessageHeader,
};
use crate::error::{FrameError, Result};

/// Fixed-size storage for one frame.
///
/// The capacity is chosen once from the maximum payload and never grows.
/// Frames that would not fit are refused before anything is written.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,
    capacity: usize,
    max_payload: usize,
}

impl FrameBuffer {
    /// A buffer for raw frames carrying up to `max_payload` bytes, clamped to
    /// the 32-bit frame length.
    pub fn for_raw(max_payload: usize) -> Self {
        let max_payload = raw_payload_limit(max_payload);
        Self::with_capacity(raw_frame_capacity(max_payload), max_payload)
    }

    /// A buffer for generic frames whose payload attribute carries up to
    /// `max_payload` bytes, clamped to the 16-bit attribute length.
    pub fn for_generic(max_payload: usize) -> Self {
        let max_payload = generic_payload_limit(max_payload);
        Self::with_capacity(generic_frame_capacity(max_payload), max_payload)
    }

    fn with_capacity(capacity: usize, max_payload: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            max_payload,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Bytes of the frame currently held.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure_fits(&self, wire_size: usize) -> Result<()> {
        if wire_size > self.capacity {
            return Err(FrameError::PayloadTooLarge {
                size: wire_size,
                max: self.capacity,
            });
        }
        Ok(())
    }

    /// Encode a raw frame, replacing the previous contents.
    pub fn encode_message(&mut self, header: &MessageHeader, payload: &[u8]) -> Result<&[u8]> {
        if payload.len() > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload,
            });
        }
        self.ensure_fits(nlmsg_space(payload.len()))?;
        self.buf.clear();
        encode_message(header, payload, &mut self.buf, self.max_payload)?;
        Ok(&self.buf)
    }

    /// Encode a generic frame, replacing the previous contents.
    pub fn encode_generic(
        &mut self,
        header: &MessageHeader,
        genl: &GenlHeader,
        attrs: &[AttrRef<'_>],
    ) -> Result<&[u8]> {
        if let Some(big) = attrs.iter().find(|a| a.value.len() > self.max_payload) {
            return Err(FrameError::PayloadTooLarge {
                size: big.value.len(),
                max: self.max_payload,
            });
        }
        self.ensure_fits(generic_wire_size(attrs))?;
        self.buf.clear();
        encode_generic(header, genl, attrs, &mut self.buf, self.max_payload)?;
        Ok(&self.buf)
    }

    /// The whole buffer, zeroed, ready to receive one datagram.
    pub fn recv_space(&mut self) -> &mut [u8] {
        self.buf.clear();
        self.buf.resize(self.capacity, 0);
        &mut self.buf
    }

    /// Keep the first `n` received bytes and return them.
    pub fn filled(&mut self, n: usize) -> &[u8] {
        self.buf.truncate(n.min(self.capacity));
        &self.buf
    }

    /// Decode the held bytes as a raw frame.
    pub fn decode_message(&self) -> Result<Message> {
        decode_message(&self.buf, self.max_payload)
    }

    /// Decode the held bytes as a generic frame.
    pub fn decode_generic(&self) -> Result<GenericMessage> {
        decode_generic(&self.buf, self.max_payload)
    }

    /// Free the storage. The buffer refuses every frame afterwards.
    pub fn release(&mut self) {
        self.buf = BytesMut::new();
        self.capacity = 0;
    }

    pub fn is_released(&self) -> bool {
        self.capacity == 0
    }
}

/// The send and receive frame buffers of one endpoint.
#[derive(Debug)]
pub struct IoBuffers {
    pub send: FrameBuffer,
    pub recv: FrameBuffer,
}

impl IoBuffers {
    /// Buffers for raw frames with payloads up to `max_payload`.
    pub fn raw(max_payload: usize) -> Self {
        Self {
            send: FrameBuffer::for_raw(max_payload),
            recv: FrameBuffer::for_raw(max_payload),
        }
    }

    /// Buffers for generic frames with payload attributes up to `max_payload`.
    pub fn generic(max_payload: usize) -> Self {
        Self {
            send: FrameBuffer::for_generic(max_payload),
            recv: FrameBuffer::for_generic(max_payload),
        }
    }

    /// The payload ceiling both buffers enforce.
    pub fn max_payload(&self) -> usize {
        self.send.max_payload()
    }

    pub fn release(&mut self) {
        self.send.release();
        self.recv.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::NLA_MAX_VALUE;
    use crate::codec::{COMPACT_MAX_PAYLOAD, DEFAULT_MAX_PAYLOAD, NLMSG_HDRLEN};

    #[test]
    fn test_raw_encode_within_capacity() {
        let mut buf = FrameBuffer::for_raw(COMPACT_MAX_PAYLOAD);
        let frame = buf
            .encode_message(&MessageHeader::new(0, 0, 1, 5), &[7; COMPACT_MAX_PAYLOAD])
            .unwrap();
        assert_eq!(frame.len(), NLMSG_HDRLEN + COMPACT_MAX_PAYLOAD);
        assert_eq!(buf.len(), buf.capacity());
    }

    #[test]
    fn test_raw_payload_over_max_rejected_untouched() {
        let mut buf = FrameBuffer::for_raw(16);
        buf.encode_message(&MessageHeader::default(), b"keep").unwrap();

        let err = buf
            .encode_message(&MessageHeader::default(), &[0; 17])
            .unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLarge { size: 17, max: 16 });
        assert_eq!(buf.decode_message().unwrap().payload.as_ref(), b"keep");
    }

    #[test]
    fn test_generic_ping_frame() {
        let mut buf = FrameBuffer::for_generic(64);
        let frame = buf
            .encode_generic(
                &MessageHeader::new(26, 1, 1, 100),
                &GenlHeader::new(1, 1),
                &[AttrRef::new(1, b"ping")],
            )
            .unwrap();
        assert_eq!(frame.len(), 28);
        let msg = buf.decode_generic().unwrap();
        assert_eq!(msg.attributes[0].value.as_ref(), b"ping");
    }

    #[test]
    fn test_generic_attributes_over_capacity_rejected() {
        let mut buf = FrameBuffer::for_generic(8);
        let err = buf
            .encode_generic(
                &MessageHeader::default(),
                &GenlHeader::default(),
                &[AttrRef::new(1, &[0; 8]), AttrRef::new(2, &[0; 8])],
            )
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 44, max: 32 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_recv_space_and_filled() {
        let mut buf = FrameBuffer::for_raw(32);
        let space = buf.recv_space();
        assert_eq!(space.len(), 48);
        space[..4].copy_from_slice(&20u32.to_ne_bytes());
        assert_eq!(buf.filled(20).len(), 20);
        assert_eq!(buf.decode_message().unwrap().payload.len(), 4);
    }

    #[test]
    fn test_release_refuses_frames() {
        let mut buf = FrameBuffer::for_raw(32);
        buf.release();
        assert!(buf.is_released());
        assert!(buf.recv_space().is_empty());
        assert!(buf
            .encode_message(&MessageHeader::default(), b"")
            .is_err());
    }

    #[test]
    fn test_generic_ceiling_clamped_to_attribute_length() {
        let mut buf = FrameBuffer::for_generic(DEFAULT_MAX_PAYLOAD);
        assert_eq!(buf.max_payload(), NLA_MAX_VALUE);

        let at_limit = vec![0xAB; NLA_MAX_VALUE];
        let frame = buf
            .encode_generic(
                &MessageHeader::default(),
                &GenlHeader::new(1, 1),
                &[AttrRef::new(1, &at_limit)],
            )
            .unwrap();
        assert_eq!(u16::from_ne_bytes([frame[20], frame[21]]), u16::MAX);
        assert_eq!(buf.decode_generic().unwrap().attributes[0].value.len(), NLA_MAX_VALUE);

        let err = buf
            .encode_generic(
                &MessageHeader::default(),
                &GenlHeader::new(1, 1),
                &[AttrRef::new(1, &[0xAB; 65535])],
            )
            .unwrap_err();
        assert_eq!(
            err,
            FrameError::PayloadTooLarge {
                size: 65535,
                max: NLA_MAX_VALUE,
            }
        );
        assert_eq!(buf.decode_generic().unwrap().attributes[0].value.len(), NLA_MAX_VALUE);
    }

    #[test]
    fn test_io_buffers_share_clamped_ceiling() {
        let buffers = IoBuffers::generic(usize::MAX - 2);
        assert_eq!(buffers.max_payload(), NLA_MAX_VALUE);
        assert_eq!(buffers.recv.capacity(), buffers.send.capacity());

        let raw = IoBuffers::raw(COMPACT_MAX_PAYLOAD);
        assert_eq!(raw.max_payload(), COMPACT_MAX_PAYLOAD);
    }
}
