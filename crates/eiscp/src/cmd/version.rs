use eiscp_frame::{MAX_MESSAGE_SIZE, PACKET_SIZE};
use eiscp_transport::DEFAULT_PORT;

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("eiscp {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: eiscp");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("EISCP_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("default_port: {DEFAULT_PORT}");
    println!("packet_size: {PACKET_SIZE}");
    println!("max_message_size: {MAX_MESSAGE_SIZE}");

    Ok(SUCCESS)
}
