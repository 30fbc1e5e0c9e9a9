//! Symbolic names for message flags and types.
//!
//! Endpoints only implement plain requests. Every other `NLM_F_*` bit is
//! known by name so callers get a clear refusal instead of a silently
//! ignored modifier.

use crate::error::UnsupportedFlag;

/// It is a request message.
pub const NLM_F_REQUEST: u16 = 0x01;
/// Multipart message, terminated by `NLMSG_DONE`.
pub const NLM_F_MULTI: u16 = 0x02;
/// Reply with an acknowledgement.
pub const NLM_F_ACK: u16 = 0x04;
/// Echo this request.
pub const NLM_F_ECHO: u16 = 0x08;
/// Dump was inconsistent due to a sequence change.
pub const NLM_F_DUMP_INTR: u16 = 0x10;
/// Dump was filtered as requested.
pub const NLM_F_DUMP_FILTERED: u16 = 0x20;

// Modifiers to GET requests.
pub const NLM_F_ROOT: u16 = 0x100;
pub const NLM_F_MATCH: u16 = 0x200;
pub const NLM_F_ATOMIC: u16 = 0x400;
pub const NLM_F_DUMP: u16 = NLM_F_ROOT | NLM_F_MATCH;

// Modifiers to NEW requests. These share bits with the GET modifiers.
pub const NLM_F_REPLACE: u16 = 0x100;
pub const NLM_F_EXCL: u16 = 0x200;
pub const NLM_F_CREATE: u16 = 0x400;
pub const NLM_F_APPEND: u16 = 0x800;

/// Flags an endpoint can send.
pub const SUPPORTED_FLAGS: u16 = NLM_F_REQUEST;

/// No operation, message must be discarded.
pub const NLMSG_NOOP: u16 = 0x1;
/// Error message or acknowledgement.
pub const NLMSG_ERROR: u16 = 0x2;
/// End of a multipart sequence.
pub const NLMSG_DONE: u16 = 0x3;
/// Data lost.
pub const NLMSG_OVERRUN: u16 = 0x4;
/// Types below this value are reserved for control messages.
pub const NLMSG_MIN_TYPE: u16 = 0x10;

/// Message type of the generic netlink controller family.
pub const GENL_ID_CTRL: u16 = NLMSG_MIN_TYPE;

/// One entry of the flag table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagInfo {
    /// Canonical name, e.g. `NLM_F_REQUEST`.
    pub name: &'static str,
    pub bits: u16,
    /// `None` when the flag is supported, otherwise the reason it is refused.
    pub unsupported: Option<&'static str>,
}

impl FlagInfo {
    pub fn is_supported(&self) -> bool {
        self.unsupported.is_none()
    }
}

const fn flag(name: &'static str, bits: u16, unsupported: Option<&'static str>) -> FlagInfo {
    FlagInfo {
        name,
        bits,
        unsupported,
    }
}

/// Every flag name `resolve_flag` understands.
pub const FLAG_TABLE: &[FlagInfo] = &[
    flag("NLM_F_REQUEST", NLM_F_REQUEST, None),
    flag(
        "NLM_F_MULTI",
        NLM_F_MULTI,
        Some("multipart reassembly is not implemented"),
    ),
    flag(
        "NLM_F_ACK",
        NLM_F_ACK,
        Some("acknowledgement tracking is not implemented"),
    ),
    flag("NLM_F_ECHO", NLM_F_ECHO, Some("echo requests are not implemented")),
    flag(
        "NLM_F_DUMP_INTR",
        NLM_F_DUMP_INTR,
        Some("dump status is set by the kernel"),
    ),
    flag(
        "NLM_F_DUMP_FILTERED",
        NLM_F_DUMP_FILTERED,
        Some("dump status is set by the kernel"),
    ),
    flag(
        "NLM_F_ROOT",
        NLM_F_ROOT,
        Some("request modifiers are not implemented"),
    ),
    flag(
        "NLM_F_MATCH",
        NLM_F_MATCH,
        Some("request modifiers are not implemented"),
    ),
    flag(
        "NLM_F_ATOMIC",
        NLM_F_ATOMIC,
        Some("request modifiers are not implemented"),
    ),
    flag(
        "NLM_F_DUMP",
        NLM_F_DUMP,
        Some("dump requests require multipart reassembly"),
    ),
    flag(
        "NLM_F_REPLACE",
        NLM_F_REPLACE,
        Some("request modifiers are not implemented"),
    ),
    flag(
        "NLM_F_EXCL",
        NLM_F_EXCL,
        Some("request modifiers are not implemented"),
    ),
    flag(
        "NLM_F_CREATE",
        NLM_F_CREATE,
        Some("request modifiers are not implemented"),
    ),
    flag(
        "NLM_F_APPEND",
        NLM_F_APPEND,
        Some("request modifiers are not implemented"),
    ),
];

const TYPE_TABLE: &[(&str, u16)] = &[
    ("NLMSG_NOOP", NLMSG_NOOP),
    ("NLMSG_ERROR", NLMSG_ERROR),
    ("NLMSG_DONE", NLMSG_DONE),
    ("NLMSG_OVERRUN", NLMSG_OVERRUN),
    ("GENL_ID_CTRL", GENL_ID_CTRL),
];

fn strip_prefix_ignore_case<'a>(name: &'a str, prefix: &str) -> &'a str {
    match name.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => &name[prefix.len()..],
        _ => name,
    }
}

/// Look up the bits for one flag name.
///
/// Names match case-insensitively, with or without the `NLM_F_` prefix.
/// Unknown names contribute nothing and yield 0.
pub fn resolve_flag(name: &str) -> u16 {
    let short = strip_prefix_ignore_case(name.trim(), "NLM_F_");
    FLAG_TABLE
        .iter()
        .find(|f| f.name["NLM_F_".len()..].eq_ignore_ascii_case(short))
        .map_or(0, |f| f.bits)
}

/// OR together the bits of several flag names.
pub fn resolve_flags<I, S>(names: I) -> u16
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .fold(0, |acc, name| acc | resolve_flag(name.as_ref()))
}

/// Look up a message type by name. Unknown names map to `NLMSG_NOOP`.
pub fn resolve_type(name: &str) -> u16 {
    let name = name.trim();
    TYPE_TABLE
        .iter()
        .find(|(known, _)| {
            known.eq_ignore_ascii_case(name)
                || known
                    .strip_prefix("NLMSG_")
                    .is_some_and(|short| short.eq_ignore_ascii_case(name))
        })
        .map_or(NLMSG_NOOP, |(_, value)| *value)
}

/// Name of a well-known message type, if it has one.
pub fn type_name(msg_type: u16) -> Option<&'static str> {
    TYPE_TABLE
        .iter()
        .find(|(_, value)| *value == msg_type)
        .map(|(name, _)| *name)
}

/// Reject any flag bit an endpoint does not implement.
///
/// Bits are checked from least significant up, so the error names the
/// lowest offending bit. Shared request modifier bits are reported under
/// both their names.
pub fn check_supported(flags: u16) -> Result<(), UnsupportedFlag> {
    let rejected = flags & !SUPPORTED_FLAGS;
    if rejected == 0 {
        return Ok(());
    }
    let bit = rejected & rejected.wrapping_neg();
    Err(match bit {
        NLM_F_ROOT => UnsupportedFlag {
            name: "NLM_F_ROOT/NLM_F_REPLACE",
            bits: bit,
            reason: "request modifiers are not implemented",
        },
        NLM_F_MATCH => UnsupportedFlag {
            name: "NLM_F_MATCH/NLM_F_EXCL",
            bits: bit,
            reason: "request modifiers are not implemented",
        },
        NLM_F_ATOMIC => UnsupportedFlag {
            name: "NLM_F_ATOMIC/NLM_F_CREATE",
            bits: bit,
            reason: "request modifiers are not implemented",
        },
        _ => match FLAG_TABLE.iter().find(|f| f.bits == bit) {
            Some(info) => UnsupportedFlag {
                name: info.name,
                bits: bit,
                reason: info.unsupported.unwrap_or("not implemented"),
            },
            None => UnsupportedFlag {
                name: "unknown",
                bits: bit,
                reason: "flag bit has no defined meaning",
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_flag_accepts_short_and_long_names() {
        assert_eq!(resolve_flag("NLM_F_REQUEST"), NLM_F_REQUEST);
        assert_eq!(resolve_flag("request"), NLM_F_REQUEST);
        assert_eq!(resolve_flag("nlm_f_multi"), NLM_F_MULTI);
        assert_eq!(resolve_flag("Dump"), 0x300);
        assert_eq!(resolve_flag("APPEND"), NLM_F_APPEND);
    }

    #[test]
    fn test_resolve_flag_unknown_is_zero() {
        assert_eq!(resolve_flag("NLM_F_BOGUS"), 0);
        assert_eq!(resolve_flag(""), 0);
    }

    #[test]
    fn test_resolve_flags_ors_names() {
        assert_eq!(resolve_flags(["REQUEST", "ACK"]), 0x5);
        assert_eq!(resolve_flags(["request", "nonsense"]), NLM_F_REQUEST);
        assert_eq!(resolve_flags(Vec::<String>::new()), 0);
    }

    #[test]
    fn test_resolve_type() {
        assert_eq!(resolve_type("NLMSG_ERROR"), NLMSG_ERROR);
        assert_eq!(resolve_type("done"), NLMSG_DONE);
        assert_eq!(resolve_type("genl_id_ctrl"), GENL_ID_CTRL);
        assert_eq!(resolve_type("whatever"), NLMSG_NOOP);
        assert_eq!(type_name(NLMSG_OVERRUN), Some("NLMSG_OVERRUN"));
        assert_eq!(type_name(0x99), None);
    }

    #[test]
    fn test_request_is_supported() {
        assert!(check_supported(0).is_ok());
        assert!(check_supported(NLM_F_REQUEST).is_ok());
    }

    #[test]
    fn test_multi_rejected_by_name() {
        let err = check_supported(NLM_F_REQUEST | NLM_F_MULTI).unwrap_err();
        assert_eq!(err.name, "NLM_F_MULTI");
        assert_eq!(err.bits, NLM_F_MULTI);
        assert!(err.reason.contains("multipart"));
    }

    #[test]
    fn test_shared_modifier_bits_name_both() {
        assert_eq!(
            check_supported(NLM_F_REPLACE).unwrap_err().name,
            "NLM_F_ROOT/NLM_F_REPLACE"
        );
        assert_eq!(
            check_supported(NLM_F_CREATE).unwrap_err().name,
            "NLM_F_ATOMIC/NLM_F_CREATE"
        );
        assert_eq!(check_supported(NLM_F_DUMP).unwrap_err().bits, NLM_F_ROOT);
    }

    #[test]
    fn test_unknown_bit_rejected() {
        let err = check_supported(0x8000).unwrap_err();
        assert_eq!(err.name, "unknown");
        assert_eq!(err.bits, 0x8000);
    }

    #[test]
    fn test_every_table_flag_but_request_rejected() {
        for info in FLAG_TABLE {
            assert_eq!(check_supported(info.bits).is_ok(), info.is_supported(), "{}", info.name);
        }
    }
}
