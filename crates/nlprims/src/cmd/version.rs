use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("nlprims {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: nlprims");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("NLPRIMS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "netlink: {}",
        if cfg!(target_os = "linux") {
            "native"
        } else {
            "unavailable"
        }
    );
    println!(
        "max_payload: default={}, compact={}",
        nlprims_frame::DEFAULT_MAX_PAYLOAD,
        nlprims_frame::COMPACT_MAX_PAYLOAD
    );
    println!("features: endpoint={}, cli=true", cfg!(feature = "endpoint"));

    Ok(SUCCESS)
}
