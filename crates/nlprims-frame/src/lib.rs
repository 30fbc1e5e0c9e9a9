//! Netlink message framing.
//!
//! Every frame starts with the 16-byte message header:
//! - A 4-byte length covering header and payload
//! - 2-byte type and 2-byte flag fields
//! - 4-byte sequence number and sender port id
//!
//! Generic frames add a 4-byte sub-header and a run of attribute records.
//! All integers are host byte order and every record is 4-byte aligned.

pub mod attr;
pub mod buffer;
pub mod codec;
pub mod error;
pub mod flags;

pub use attr::{AttrRef, Attribute, AttributeIter, NLA_HDRLEN, NLA_MAX_VALUE};
pub use buffer::{FrameBuffer, IoBuffers};
pub use codec::{
    decode_error_code, decode_generic, decode_message, encode_generic, encode_message,
    frame_consistent, generic_frame_capacity, generic_payload_limit, nlmsg_align,
    raw_frame_capacity, raw_payload_limit, FrameConfig, GenericMessage, GenlHeader, Message,
    MessageHeader, COMPACT_MAX_PAYLOAD, DEFAULT_MAX_PAYLOAD, GENERIC_MAX_PAYLOAD, GENL_HDRLEN,
    NLMSG_HDRLEN, RAW_MAX_PAYLOAD,
};
pub use error::{FrameError, MalformedFrame, Result, UnsupportedFlag};
pub use flags::{
    check_supported, resolve_flag, resolve_flags, resolve_type, FlagInfo, FLAG_TABLE,
    GENL_ID_CTRL, NLMSG_ERROR, NLMSG_NOOP, NLM_F_MULTI, NLM_F_REQUEST,
};
