use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use nlprims_endpoint::{Endpoint, EndpointConfig, GenericConfig, DEFAULT_FAMILY_NAME};
use nlprims_frame::{DEFAULT_MAX_PAYLOAD, RAW_MAX_PAYLOAD};
use nlprims_transport::{Transport, NETLINK_GENERIC, NETLINK_ROUTE, NETLINK_USERSOCK};

use crate::exit::{endpoint_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod flags;
pub mod listen;
pub mod resolve;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a single frame.
    Send(SendArgs),
    /// Listen and print received frames.
    Listen(ListenArgs),
    /// Look up a generic netlink family id.
    Resolve(ResolveArgs),
    /// Print the message flag table and what endpoints support.
    Flags,
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Resolve(args) => resolve::run(args, format),
        Command::Flags => flags::run(format),
        Command::Version(args) => version::run(args),
    }
}

/// Options shared by every command that opens a socket.
#[derive(Args, Debug, Clone)]
pub struct SocketArgs {
    /// Netlink protocol: usersock, generic, route, or a protocol number.
    #[arg(long, short = 'p', default_value = "usersock", value_parser = parse_protocol)]
    pub protocol: i32,
    /// Local port id to bind. 0 lets the kernel choose.
    #[arg(long, default_value = "0")]
    pub bind: u32,
    /// Multicast group mask to join.
    #[arg(long, default_value = "0")]
    pub group: u32,
    /// Per-operation timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Maximum payload size in bytes. Generic endpoints cap it at 65531.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD, value_parser = parse_max_payload)]
    pub max_payload: usize,
    /// Generic family name to resolve.
    #[arg(long, default_value = DEFAULT_FAMILY_NAME, env = "NLPRIMS_FAMILY")]
    pub family: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Destination port id.
    pub dest: u32,
    /// Destination multicast group mask.
    #[arg(long, default_value = "0")]
    pub dest_group: u32,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Message flag by name (repeatable), e.g. request or NLM_F_ACK.
    #[arg(long = "flag", value_name = "NAME")]
    pub flags: Vec<String>,
    /// Message type for raw frames: a name such as NLMSG_DONE, or a number.
    #[arg(long = "type", value_name = "NAME")]
    pub msg_type: Option<String>,
    #[command(flatten)]
    pub socket: SocketArgs,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub socket: SocketArgs,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Port id of the controller to ask. 0 is the kernel.
    #[arg(default_value = "0")]
    pub dest: u32,
    #[command(flatten)]
    pub socket: SocketArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_protocol(input: &str) -> Result<i32, String> {
    match input.trim().to_ascii_lowercase().as_str() {
        "usersock" => Ok(NETLINK_USERSOCK),
        "generic" | "genl" => Ok(NETLINK_GENERIC),
        "route" => Ok(NETLINK_ROUTE),
        other => other
            .parse::<i32>()
            .ok()
            .filter(|n| *n >= 0)
            .ok_or_else(|| format!("unknown netlink protocol: {input}")),
    }
}

pub fn parse_max_payload(input: &str) -> Result<usize, String> {
    let value: usize = input
        .trim()
        .parse()
        .map_err(|_| format!("invalid payload size: {input}"))?;
    if value == 0 || value > RAW_MAX_PAYLOAD {
        return Err(format!("payload size must be between 1 and {RAW_MAX_PAYLOAD}"));
    }
    Ok(value)
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

impl SocketArgs {
    pub fn endpoint_config(&self) -> CliResult<EndpointConfig> {
        let timeout = parse_duration(&self.timeout)?;
        Ok(EndpointConfig::default()
            .with_max_payload(self.max_payload)
            .with_timeout(Some(timeout))
            .with_generic(GenericConfig {
                family_name: self.family.clone(),
                ..GenericConfig::default()
            }))
    }
}

pub type CliEndpoint = Endpoint<Box<dyn Transport>>;

/// Open an endpoint for `protocol` and bind it as `socket` asks.
pub fn open_endpoint(socket: &SocketArgs, protocol: i32) -> CliResult<CliEndpoint> {
    let config = socket.endpoint_config()?;
    let transport = open_transport(protocol)?;
    let mut endpoint = Endpoint::with_transport(transport, protocol, config);
    endpoint
        .bind(socket.bind, socket.group)
        .map_err(|err| endpoint_error("bind failed", err))?;
    Ok(endpoint)
}

#[cfg(target_os = "linux")]
fn open_transport(protocol: i32) -> CliResult<Box<dyn Transport>> {
    let socket = nlprims_transport::NetlinkSocket::open(protocol)
        .map_err(|err| crate::exit::transport_error("open failed", err))?;
    Ok(Box::new(socket))
}

#[cfg(not(target_os = "linux"))]
fn open_transport(protocol: i32) -> CliResult<Box<dyn Transport>> {
    Err(CliError::new(
        crate::exit::TRANSPORT_ERROR,
        format!("netlink protocol {protocol} requires Linux"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_names_and_numbers() {
        assert_eq!(parse_protocol("usersock"), Ok(NETLINK_USERSOCK));
        assert_eq!(parse_protocol("GENERIC"), Ok(NETLINK_GENERIC));
        assert_eq!(parse_protocol("route"), Ok(NETLINK_ROUTE));
        assert_eq!(parse_protocol("17"), Ok(17));
        assert!(parse_protocol("-1").is_err());
        assert!(parse_protocol("bogus").is_err());
    }

    #[test]
    fn max_payload_bounded_by_frame_length() {
        assert_eq!(parse_max_payload("2048"), Ok(2048));
        assert_eq!(parse_max_payload(&RAW_MAX_PAYLOAD.to_string()), Ok(RAW_MAX_PAYLOAD));
        assert!(parse_max_payload(&(RAW_MAX_PAYLOAD + 1).to_string()).is_err());
        assert!(parse_max_payload(&(usize::MAX - 2).to_string()).is_err());
        assert!(parse_max_payload("0").is_err());
        assert!(parse_max_payload("big").is_err());
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
