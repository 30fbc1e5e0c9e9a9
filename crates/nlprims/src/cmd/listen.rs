use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nlprims_endpoint::EndpointError;
use tracing::{info, warn};

use crate::cmd::{open_endpoint, parse_duration, ListenArgs};
use crate::exit::{endpoint_error, CliError, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

/// Upper bound on one receive wait, so Ctrl-C is noticed promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let idle = parse_duration(&args.socket.timeout)?;
    let mut endpoint = open_endpoint(&args.socket, args.socket.protocol)?;
    endpoint.set_timeout(Some(idle.min(POLL_INTERVAL)));
    info!(
        local_id = endpoint.local_id(),
        variant = %endpoint.variant(),
        "listening"
    );

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;

    while running.load(Ordering::SeqCst) {
        let frame = match endpoint.receive_frame_from() {
            Ok(frame) => frame,
            Err(EndpointError::Timeout(_)) => continue,
            Err(err @ (EndpointError::MalformedFrame(_) | EndpointError::KernelError(_))) => {
                warn!(error = %err, "skipping frame");
                continue;
            }
            Err(err) => return Err(endpoint_error("receive failed", err)),
        };

        print_frame(&frame, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    endpoint.close();
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
