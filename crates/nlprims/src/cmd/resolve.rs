use nlprims_transport::NETLINK_GENERIC;

use crate::cmd::{open_endpoint, ResolveArgs};
use crate::exit::{endpoint_error, CliResult, SUCCESS};
use crate::output::{print_resolved, OutputFormat, ResolveReport};

pub fn run(args: ResolveArgs, format: OutputFormat) -> CliResult<i32> {
    // Lookups only exist on generic sockets, whatever --protocol says.
    let mut endpoint = open_endpoint(&args.socket, NETLINK_GENERIC)?;
    let family_id = endpoint
        .resolve_family(args.dest)
        .map_err(|err| endpoint_error("resolve failed", err))?;
    endpoint.close();

    print_resolved(
        &ResolveReport {
            kind: "family-resolved",
            family: args.socket.family,
            family_id,
            target: args.dest,
        },
        format,
    );
    Ok(SUCCESS)
}
