use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("muxprims {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: muxprims");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("MUXPRIMS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("default_frame_size: {}", muxprims_frame::DEFAULT_FRAME_SIZE);
    println!("max_frame_size: {}", muxprims_frame::MAX_FRAME_SIZE);
    println!(
        "transports: tcp{}",
        if cfg!(unix) { ", unix-domain-socket" } else { "" }
    );
    println!("features: mux={}, cli=true", cfg!(feature = "mux"));

    Ok(SUCCESS)
}
