//! Attribute records used inside generic netlink frames.
//!
//! ```text
//! ┌────────────┬────────────┬──────────────────┬─────────┐
//! │ Length     │ Type       │ Value            │ Padding │
//! │ (2B)       │ (2B)       │ (Length - 4 B)   │ to 4B   │
//! └────────────┴────────────┴──────────────────┴─────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, MalformedFrame};

/// Attribute header: length (2) + type (2) = 4 bytes.
pub const NLA_HDRLEN: usize = 4;

/// Largest value that fits the 16-bit attribute length field.
pub const NLA_MAX_VALUE: usize = u16::MAX as usize - NLA_HDRLEN;

/// Attribute alignment quantum.
pub const NLA_ALIGNTO: usize = 4;

/// Flag bit marking a nested attribute.
pub const NLA_F_NESTED: u16 = 1 << 15;

/// Flag bit marking a value in network byte order.
pub const NLA_F_NET_BYTEORDER: u16 = 1 << 14;

/// Mask that strips the flag bits from an attribute type.
pub const NLA_TYPE_MASK: u16 = !(NLA_F_NESTED | NLA_F_NET_BYTEORDER);

/// Round `len` up to the attribute alignment quantum.
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Aligned on-wire size of an attribute carrying `value_len` bytes.
pub const fn nla_total_size(value_len: usize) -> usize {
    nla_align(NLA_HDRLEN + value_len)
}

/// An owned attribute decoded from a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute type with the nested/byte-order flag bits removed.
    pub attr_type: u16,
    /// Value bytes, without header or padding.
    pub value: Bytes,
}

impl Attribute {
    pub fn new(attr_type: u16, value: impl Into<Bytes>) -> Self {
        Self {
            attr_type,
            value: value.into(),
        }
    }

    /// Interpret the value as a native-endian `u16`.
    pub fn as_u16(&self) -> Option<u16> {
        let bytes: [u8; 2] = self.value.as_ref().try_into().ok()?;
        Some(u16::from_ne_bytes(bytes))
    }

    /// Interpret the value as a native-endian `u32`.
    pub fn as_u32(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.value.as_ref().try_into().ok()?;
        Some(u32::from_ne_bytes(bytes))
    }

    /// Interpret the value as a NUL-terminated string.
    pub fn as_str(&self) -> Option<&str> {
        let raw = self.value.as_ref();
        let raw = raw.strip_suffix(&[0u8]).unwrap_or(raw);
        std::str::from_utf8(raw).ok()
    }
}

/// A borrowed attribute, used for encoding and zero-copy iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrRef<'a> {
    pub attr_type: u16,
    pub value: &'a [u8],
}

impl<'a> AttrRef<'a> {
    pub fn new(attr_type: u16, value: &'a [u8]) -> Self {
        Self { attr_type, value }
    }

    /// Aligned on-wire size of this attribute.
    pub fn wire_size(&self) -> usize {
        nla_total_size(self.value.len())
    }

    pub fn to_attribute(&self) -> Attribute {
        Attribute::new(self.attr_type, Bytes::copy_from_slice(self.value))
    }
}

/// Append one attribute record, padded to the alignment quantum.
///
/// Returns the number of bytes written. Values longer than
/// [`NLA_MAX_VALUE`] are refused and nothing is written.
pub fn put_attribute(dst: &mut BytesMut, attr: AttrRef<'_>) -> crate::error::Result<usize> {
    if attr.value.len() > NLA_MAX_VALUE {
        return Err(FrameError::PayloadTooLarge {
            size: attr.value.len(),
            max: NLA_MAX_VALUE,
        });
    }
    let len = NLA_HDRLEN + attr.value.len();
    let total = nla_align(len);
    dst.reserve(total);
    dst.put_u16_ne(len as u16);
    dst.put_u16_ne(attr.attr_type);
    dst.put_slice(attr.value);
    dst.put_bytes(0, total - len);
    Ok(total)
}

/// Walks the attribute records in a byte region, checking every bound.
///
/// Yields an error and then stops if a record reaches outside the region.
#[derive(Debug, Clone)]
pub struct AttributeIter<'a> {
    src: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> AttributeIter<'a> {
    /// Iterate over `src`. `base` is the offset of `src` inside its frame and
    /// is only used for error reporting.
    pub fn new(src: &'a [u8], base: usize) -> Self {
        Self { src, pos: 0, base }
    }
}

impl<'a> Iterator for AttributeIter<'a> {
    type Item = Result<AttrRef<'a>, MalformedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let available = self.src.len() - self.pos;
        if available == 0 {
            return None;
        }
        let offset = self.base + self.pos;

        if available < NLA_HDRLEN {
            self.pos = self.src.len();
            return Some(Err(MalformedFrame::AttributeOutOfBounds {
                offset,
                declared: NLA_HDRLEN,
                available,
            }));
        }

        let mut header = &self.src[self.pos..self.pos + NLA_HDRLEN];
        let declared = header.get_u16_ne() as usize;
        let attr_type = header.get_u16_ne() & NLA_TYPE_MASK;

        if declared < NLA_HDRLEN {
            self.pos = self.src.len();
            return Some(Err(MalformedFrame::AttributeLength { offset, declared }));
        }
        if declared > available {
            self.pos = self.src.len();
            return Some(Err(MalformedFrame::AttributeOutOfBounds {
                offset,
                declared,
                available,
            }));
        }

        let value = &self.src[self.pos + NLA_HDRLEN..self.pos + declared];
        self.pos += nla_align(declared).min(available);
        Some(Ok(AttrRef { attr_type, value }))
    }
}

/// Decode every attribute in `src` into owned records.
pub fn parse_attributes(src: &[u8], base: usize) -> Result<Vec<Attribute>, MalformedFrame> {
    AttributeIter::new(src, base)
        .map(|attr| attr.map(|a| a.to_attribute()))
        .collect()
}
