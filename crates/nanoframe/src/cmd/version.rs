use nanoframe_frame::JSONRPC_VERSION;
use nanoframe_transport::{platform_package, ENGINE_BIN_NAME};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("nanoframe {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: nanoframe");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "target: {}",
        option_env!("NANOFRAME_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("protocol: json-rpc {JSONRPC_VERSION} over stdio, newline-delimited");
    println!("engine_binary: {ENGINE_BIN_NAME}");
    println!(
        "engine_package: {}",
        platform_package(std::env::consts::OS, std::env::consts::ARCH).unwrap_or("none")
    );
    println!(
        "features: peer={}, cli=true",
        cfg!(feature = "peer")
    );

    Ok(SUCCESS)
}
