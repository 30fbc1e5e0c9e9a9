/// Ways a received frame can fail its consistency checks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedFrame {
    /// Fewer bytes arrived than the fixed message header needs.
    #[error("received {received} bytes, shorter than the message header")]
    HeaderTruncated { received: usize },

    /// The declared frame length is below the header size or beyond the bytes received.
    #[error("declared length {declared} inconsistent with {received} bytes received")]
    LengthMismatch { declared: usize, received: usize },

    /// The payload is larger than the configured maximum.
    #[error("payload of {size} bytes exceeds maximum {max}")]
    PayloadExceedsMax { size: usize, max: usize },

    /// A generic frame too short to hold the generic sub-header.
    #[error("generic header truncated ({available} bytes after message header)")]
    GenericHeaderTruncated { available: usize },

    /// An attribute header or value reaches outside the frame.
    #[error("attribute at offset {offset} needs {declared} bytes, {available} available")]
    AttributeOutOfBounds {
        offset: usize,
        declared: usize,
        available: usize,
    },

    /// An attribute declares a length smaller than its own header.
    #[error("attribute at offset {offset} declares length {declared}")]
    AttributeLength { offset: usize, declared: usize },

    /// A generic frame that should carry a payload attribute carries none.
    #[error("frame carries no attributes")]
    MissingAttribute,

    /// An error frame too short to hold its error code.
    #[error("error frame payload truncated ({len} bytes)")]
    ErrorPayloadTruncated { len: usize },
}

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the configured maximum or the frame buffer.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Received bytes failed a consistency check.
    #[error("malformed frame: {0}")]
    Malformed(#[from] MalformedFrame),
}

/// A flag the endpoint recognizes but does not implement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported flag {name} ({bits:#06x}): {reason}")]
pub struct UnsupportedFlag {
    /// Symbolic name of the rejected flag.
    pub name: &'static str,
    /// The offending bits.
    pub bits: u16,
    /// Why the flag cannot be honoured.
    pub reason: &'static str,
}

pub type Result<T> = std::result::Result<T, FrameError>;
