use std::fs;

use nlprims_endpoint::SendOptions;
use nlprims_frame::{check_supported, resolve_flags, resolve_type};
use nlprims_transport::NetlinkAddr;

use crate::cmd::{open_endpoint, SendArgs};
use crate::exit::{endpoint_error, unsupported_flag, CliResult, SUCCESS};
use crate::output::{print_sent, OutputFormat, SendReport};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    // Flags are refused before any socket exists.
    let options = send_options(&args)?;
    let payload = resolve_payload(&args)?;

    let mut endpoint = open_endpoint(&args.socket, args.socket.protocol)?;
    let dest = NetlinkAddr::new(args.dest, args.dest_group);
    let sent = endpoint
        .send_to(&payload, dest, options)
        .map_err(|err| endpoint_error("send failed", err))?;

    let report = SendReport {
        kind: "frame-sent",
        dest: args.dest,
        variant: endpoint.variant().as_str(),
        local_id: endpoint.local_id(),
        payload_size: payload.len(),
        bytes_sent: sent,
        family_id: endpoint.family_id(),
    };
    endpoint.close();
    print_sent(&report, format);
    Ok(SUCCESS)
}

fn send_options(args: &SendArgs) -> CliResult<SendOptions> {
    let flags = resolve_flags(&args.flags);
    check_supported(flags).map_err(unsupported_flag)?;
    let msg_type = args.msg_type.as_deref().map_or(0, parse_type);
    Ok(SendOptions::default()
        .with_flags(flags)
        .with_type(msg_type))
}

fn parse_type(input: &str) -> u16 {
    let input = input.trim();
    if let Some(hex) = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        if let Ok(value) = u16::from_str_radix(hex, 16) {
            return value;
        }
    }
    input.parse().unwrap_or_else(|_| resolve_type(input))
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use nlprims_frame::flags::{NLMSG_DONE, NLMSG_NOOP, NLM_F_REQUEST};

    use super::*;

    #[test]
    fn parse_type_names_and_numbers() {
        assert_eq!(parse_type("NLMSG_DONE"), NLMSG_DONE);
        assert_eq!(parse_type("32"), 32);
        assert_eq!(parse_type("0x20"), 32);
        assert_eq!(parse_type("unheard-of"), NLMSG_NOOP);
    }

    fn args(flags: &[&str]) -> SendArgs {
        use clap::Parser;

        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            send: SendArgs,
        }

        let mut argv = vec!["send".to_string(), "42".to_string()];
        for flag in flags {
            argv.push("--flag".to_string());
            argv.push((*flag).to_string());
        }
        Wrapper::parse_from(argv).send
    }

    #[test]
    fn supported_flags_pass() {
        let options = send_options(&args(&["request"])).unwrap();
        assert_eq!(options.flags, NLM_F_REQUEST);
        assert_eq!(options.msg_type, 0);
    }

    #[test]
    fn unsupported_flags_are_usage_errors() {
        let err = send_options(&args(&["request", "NLM_F_MULTI"])).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
        assert!(err.message.contains("NLM_F_MULTI"));
    }

    #[test]
    fn unknown_flag_names_contribute_nothing() {
        let options = send_options(&args(&["no-such-flag"])).unwrap();
        assert_eq!(options.flags, 0);
    }
}
