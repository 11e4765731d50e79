use nanoframe_transport::{platform_package, resolve, EngineCommand, ResolverConfig};
use serde::Serialize;

use crate::cmd::ResolveArgs;
use crate::exit::{CliResult, NOT_FOUND, SUCCESS};
use crate::output::{print_json_line, schema_id, OutputFormat};

#[derive(Serialize)]
struct ResolveOutput {
    schema_id: String,
    resolved: bool,
    origin: &'static str,
    program: String,
    args: Vec<String>,
    cwd: Option<String>,
    dev_mode: bool,
    force_platform: bool,
    local_core: bool,
    platform_package: Option<&'static str>,
}

/// Exits 127 when nothing resolved; the fallback shown is then the bare
/// binary name the OS would be asked to find.
pub fn run(_args: ResolveArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ResolverConfig::from_env();
    let resolved = resolve(&config);
    let found = resolved.is_some();
    let command = resolved.unwrap_or_else(EngineCommand::fallback);

    let output = ResolveOutput {
        schema_id: schema_id("resolve"),
        resolved: found,
        origin: command.origin.as_str(),
        program: command.program.display().to_string(),
        args: command
            .args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect(),
        cwd: command.cwd.as_ref().map(|dir| dir.display().to_string()),
        dev_mode: config.dev_mode,
        force_platform: config.force_platform,
        local_core: config.has_local_core(),
        platform_package: platform_package(&config.os, &config.arch),
    };

    match format {
        OutputFormat::Json => print_json_line(&output),
        OutputFormat::Raw => println!("{command}"),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("nanoframe engine resolution\n");
            println!("  Command:    {command}");
            println!("  Origin:     {}", output.origin);
            if let Some(cwd) = &output.cwd {
                println!("  Directory:  {cwd}");
            }
            println!("  Dev mode:   {}", output.dev_mode);
            println!("  Force bin:  {}", output.force_platform);
            println!("  Local core: {}", output.local_core);
            println!(
                "  Package:    {}",
                output.platform_package.unwrap_or("(unsupported platform)")
            );
        }
    }

    Ok(if found { SUCCESS } else { NOT_FOUND })
}
