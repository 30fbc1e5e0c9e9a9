//! Generic family lookup through the netlink controller.
//!
//! ```text
//! request:  GENL_ID_CTRL | NLM_F_REQUEST | seq 0 | CTRL_CMD_GETFAMILY
//!           └─ CTRL_ATTR_FAMILY_NAME  "<name>\0"
//! response: <any non-error type>
//!           ├─ (first attribute, skipped)
//!           └─ CTRL_ATTR_FAMILY_ID    u16
//! ```

use nlprims_frame::{
    decode_error_code, frame_consistent, AttrRef, GenlHeader, IoBuffers, MessageHeader,
    GENL_ID_CTRL, NLMSG_ERROR, NLMSG_HDRLEN, NLM_F_REQUEST,
};
use nlprims_transport::{Deadline, NetlinkAddr, Transport};
use tracing::{debug, info, warn};

use crate::config::GenericConfig;
use crate::error::{EndpointError, Result};

/// Controller command that looks a family up by name.
pub const CTRL_CMD_GETFAMILY: u8 = 3;
/// Controller protocol version.
pub const CTRL_VERSION: u8 = 1;
/// Attribute carrying the numeric family id.
pub const CTRL_ATTR_FAMILY_ID: u16 = 1;
/// Attribute carrying the NUL-terminated family name.
pub const CTRL_ATTR_FAMILY_NAME: u16 = 2;

fn failed(reason: impl Into<String>) -> EndpointError {
    let reason = reason.into();
    warn!(%reason, "family resolution failed");
    EndpointError::ResolutionFailed(reason)
}

/// Ask the controller reachable at `target_pid` for the id of
/// `config.family_name`.
///
/// One request is sent and one response read, each under `deadline`.
/// Everything short of a well-formed answer is `ResolutionFailed`.
pub fn resolve_family_id<T: Transport + ?Sized>(
    transport: &mut T,
    buffers: &mut IoBuffers,
    deadline: &mut Deadline,
    local_id: u32,
    target_pid: u32,
    config: &GenericConfig,
) -> Result<u16> {
    let mut name = Vec::with_capacity(config.family_name.len() + 1);
    name.extend_from_slice(config.family_name.as_bytes());
    name.push(0);

    let header = MessageHeader::new(GENL_ID_CTRL, NLM_F_REQUEST, 0, local_id);
    let request = buffers.send.encode_generic(
        &header,
        &GenlHeader::new(CTRL_CMD_GETFAMILY, CTRL_VERSION),
        &[AttrRef::new(CTRL_ATTR_FAMILY_NAME, &name)],
    )?;

    debug!(
        family = %config.family_name,
        target_pid,
        bytes = request.len(),
        "sending family lookup"
    );
    deadline.mark_start();
    transport
        .send_to(request, NetlinkAddr::pid(target_pid), deadline)
        .map_err(|err| failed(format!("request not sent: {err}")))?;

    deadline.mark_start();
    let (n, _) = transport
        .recv_from(buffers.recv.recv_space(), deadline)
        .map_err(|err| failed(format!("no response: {err}")))?;
    let received = buffers.recv.filled(n);

    if !frame_consistent(received) {
        return Err(failed(format!(
            "inconsistent response frame ({n} bytes received)"
        )));
    }
    let (reply, declared) = MessageHeader::parse(received)?;
    if reply.msg_type == NLMSG_ERROR {
        return Err(
            match decode_error_code(&received[NLMSG_HDRLEN..declared]) {
                Ok(errno) => failed(format!(
                    "controller refused '{}': {}",
                    config.family_name,
                    std::io::Error::from_raw_os_error(errno)
                )),
                Err(_) => failed(format!("controller refused '{}'", config.family_name)),
            },
        );
    }

    let message = buffers
        .recv
        .decode_generic()
        .map_err(|err| failed(format!("unreadable response: {err}")))?;
    let id = message
        .attributes
        .get(1)
        .filter(|attr| attr.attr_type == CTRL_ATTR_FAMILY_ID)
        .and_then(|attr| attr.as_u16())
        .ok_or_else(|| failed("response carries no family id"))?;

    info!(family = %config.family_name, id, "resolved generic family");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use nlprims_frame::{decode_generic, DEFAULT_MAX_PAYLOAD};
    use nlprims_transport::TransportError;

    use super::*;
    use crate::testing::{control_reply, error_reply, generic_frame, ScriptedTransport};

    const ENOENT: i32 = 2;

    fn run(transport: &mut ScriptedTransport) -> Result<u16> {
        let mut buffers = IoBuffers::generic(DEFAULT_MAX_PAYLOAD);
        let mut deadline = Deadline::unbounded();
        resolve_family_id(
            transport,
            &mut buffers,
            &mut deadline,
            100,
            0,
            &GenericConfig::default(),
        )
    }

    #[test]
    fn request_layout() {
        let mut transport = ScriptedTransport::with_family(0x1a);
        assert_eq!(run(&mut transport).unwrap(), 0x1a);

        assert_eq!(transport.sent.len(), 1);
        let (frame, to) = &transport.sent[0];
        assert_eq!(*to, Some(NetlinkAddr::pid(0)));

        let request = decode_generic(frame, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(request.header.msg_type, GENL_ID_CTRL);
        assert_eq!(request.header.flags, NLM_F_REQUEST);
        assert_eq!(request.header.seq, 0);
        assert_eq!(request.header.pid, 100);
        assert_eq!(request.genl, GenlHeader::new(CTRL_CMD_GETFAMILY, 1));
        assert_eq!(request.attributes.len(), 1);
        assert_eq!(request.attributes[0].attr_type, CTRL_ATTR_FAMILY_NAME);
        assert_eq!(request.attributes[0].value.as_ref(), b"NFLUA\0");
    }

    #[test]
    fn configured_family_name_is_sent() {
        let mut transport = ScriptedTransport::with_family(7);
        let mut buffers = IoBuffers::generic(64);
        let mut deadline = Deadline::unbounded();
        let config = GenericConfig {
            family_name: "nl80211".into(),
            ..GenericConfig::default()
        };
        resolve_family_id(&mut transport, &mut buffers, &mut deadline, 1, 0, &config).unwrap();

        let request = decode_generic(&transport.sent[0].0, 64).unwrap();
        assert_eq!(request.attributes[0].as_str(), Some("nl80211"));
    }

    #[test]
    fn error_frame_fails_with_errno_text() {
        let mut transport = ScriptedTransport::new();
        transport.push_reply(error_reply(ENOENT), 0);

        match run(&mut transport) {
            Err(EndpointError::ResolutionFailed(reason)) => {
                assert!(reason.contains("NFLUA"), "{reason}")
            }
            other => panic!("expected ResolutionFailed, got {other:?}"),
        }
    }

    #[test]
    fn missing_reply_fails() {
        let mut transport = ScriptedTransport::new();
        let err = run(&mut transport).unwrap_err();
        assert!(matches!(err, EndpointError::ResolutionFailed(ref r) if r.starts_with("no response")));
    }

    #[test]
    fn transport_error_on_send_fails() {
        let mut transport = ScriptedTransport::new();
        transport.closed = true;
        let err = run(&mut transport).unwrap_err();
        assert!(matches!(err, EndpointError::ResolutionFailed(ref r) if r.starts_with("request not sent")));
    }

    #[test]
    fn truncated_reply_fails() {
        let mut transport = ScriptedTransport::new();
        let mut reply = control_reply("NFLUA", 9);
        reply.truncate(reply.len() - 8);
        transport.push_reply(reply, 0);

        let err = run(&mut transport).unwrap_err();
        assert!(matches!(err, EndpointError::ResolutionFailed(ref r) if r.contains("inconsistent")));
    }

    #[test]
    fn wrong_second_attribute_fails() {
        let mut transport = ScriptedTransport::new();
        transport.push_reply(
            generic_frame(
                MessageHeader::new(GENL_ID_CTRL, 0, 0, 0),
                &[AttrRef::new(2, b"NFLUA\0"), AttrRef::new(6, &[1, 0, 0, 0])],
            ),
            0,
        );
        assert!(matches!(
            run(&mut transport),
            Err(EndpointError::ResolutionFailed(_))
        ));
    }

    #[test]
    fn single_attribute_fails() {
        let mut transport = ScriptedTransport::new();
        transport.push_reply(
            generic_frame(
                MessageHeader::new(GENL_ID_CTRL, 0, 0, 0),
                &[AttrRef::new(CTRL_ATTR_FAMILY_ID, &5u16.to_ne_bytes())],
            ),
            0,
        );
        assert!(matches!(
            run(&mut transport),
            Err(EndpointError::ResolutionFailed(_))
        ));
    }

    #[test]
    fn transport_timeout_is_resolution_failure() {
        let mut transport = ScriptedTransport::new();
        transport
            .replies
            .push_back(Err(TransportError::Timeout(std::time::Duration::from_millis(1))));
        assert!(matches!(
            run(&mut transport),
            Err(EndpointError::ResolutionFailed(_))
        ));
    }
}
