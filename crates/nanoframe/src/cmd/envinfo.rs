use std::collections::BTreeMap;
use std::path::Path;

use nanoframe_transport::{
    binary_name, platform_package, resolve, ResolverConfig, ENV_CORE_DIR, ENV_DEV, ENV_ENGINE,
    ENV_FORCE_PLATFORM, ENV_PACKAGES_DIR,
};
use serde::Serialize;

use crate::cmd::EnvinfoArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json_line, schema_id, OutputFormat};

/// Environment variables that change how the engine is found or how the
/// host logs.
const WATCHED_ENV: &[&str] = &[
    ENV_ENGINE,
    ENV_DEV,
    ENV_FORCE_PLATFORM,
    ENV_CORE_DIR,
    ENV_PACKAGES_DIR,
    "RUST_LOG",
];

#[derive(Serialize)]
struct EnvInfoOutput {
    schema_id: String,
    version: &'static str,
    target: &'static str,
    features: Vec<String>,
    resolution: Resolution,
    environment: BTreeMap<&'static str, Option<String>>,
}

/// What the resolver sees and what it would launch.
#[derive(Debug, Serialize)]
struct Resolution {
    os: String,
    arch: String,
    platform_package: Option<&'static str>,
    binary: String,
    dev_mode: bool,
    force_platform: bool,
    core_dir: Option<String>,
    local_core: bool,
    package_roots: Vec<String>,
    /// `None` when the launcher would fall back to the bare binary name.
    command: Option<String>,
    origin: Option<&'static str>,
}

impl Resolution {
    fn inspect(config: &ResolverConfig) -> Self {
        let resolved = resolve(config);
        Self {
            os: config.os.clone(),
            arch: config.arch.clone(),
            platform_package: platform_package(&config.os, &config.arch),
            binary: binary_name(&config.os),
            dev_mode: config.dev_mode,
            force_platform: config.force_platform,
            core_dir: config.core_dir.as_deref().map(display_path),
            local_core: config.has_local_core(),
            package_roots: config.package_roots.iter().map(|p| display_path(p)).collect(),
            command: resolved.as_ref().map(ToString::to_string),
            origin: resolved.map(|cmd| cmd.origin.as_str()),
        }
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

pub fn run(_args: EnvinfoArgs, format: OutputFormat) -> CliResult<i32> {
    let output = EnvInfoOutput {
        schema_id: schema_id("envinfo"),
        version: env!("CARGO_PKG_VERSION"),
        target: option_env!("NANOFRAME_BUILD_TARGET").unwrap_or("unknown"),
        features: active_features(),
        resolution: Resolution::inspect(&ResolverConfig::from_env()),
        environment: WATCHED_ENV
            .iter()
            .map(|name| (*name, std::env::var(name).ok()))
            .collect(),
    };

    match format {
        OutputFormat::Json => print_json_line(&output),
        OutputFormat::Table | OutputFormat::Pretty => print_text(&output),
        OutputFormat::Raw => println!("{}", output.version),
    }
    Ok(SUCCESS)
}

fn print_text(output: &EnvInfoOutput) {
    let res = &output.resolution;
    println!("nanoframe {} ({})", output.version, output.target);
    println!("  features:        {}", output.features.join(", "));
    println!("  platform:        {}/{}", res.os, res.arch);
    println!(
        "  package:         {}",
        res.platform_package.unwrap_or("none for this platform")
    );
    println!("  dev mode:        {}", res.dev_mode);
    println!("  force platform:  {}", res.force_platform);
    match &res.core_dir {
        Some(dir) if res.local_core => println!("  core dir:        {dir}"),
        Some(dir) => println!("  core dir:        {dir} (no Cargo.toml)"),
        None => println!("  core dir:        (no checkout found)"),
    }
    for root in &res.package_roots {
        println!("  package root:    {root}");
    }
    match (&res.command, res.origin) {
        (Some(command), Some(origin)) => println!("  engine:          {command} [{origin}]"),
        _ => println!("  engine:          {} [fallback]", res.binary),
    }

    println!();
    for (name, value) in &output.environment {
        println!("  {name:<20} {}", value.as_deref().unwrap_or("(not set)"));
    }
}

pub(crate) fn active_features() -> Vec<String> {
    let mut features = Vec::new();
    if cfg!(feature = "peer") {
        features.push("peer".to_string());
    }
    if cfg!(feature = "cli") {
        features.push("cli".to_string());
    }
    features
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "nanoframe-envinfo-{tag}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir
    }

    #[test]
    fn resolution_reports_explicit_engine() {
        let config = ResolverConfig::default()
            .with_platform("linux", "x86_64")
            .with_explicit("/opt/engine/nanoframe-core");
        let res = Resolution::inspect(&config);

        assert_eq!(res.platform_package, Some("core-linux-x64"));
        assert_eq!(res.command.as_deref(), Some("/opt/engine/nanoframe-core"));
        assert_eq!(res.origin, Some("explicit"));
        assert!(!res.local_core);
    }

    #[test]
    fn resolution_reports_local_checkout() {
        let core = temp_dir("core");
        std::fs::write(core.join("Cargo.toml"), b"[package]\n").expect("manifest should write");
        let config = ResolverConfig::default()
            .with_platform("linux", "x86_64")
            .with_core_dir(&core);
        let res = Resolution::inspect(&config);

        assert!(res.local_core);
        assert_eq!(res.core_dir, Some(core.display().to_string()));
        assert_eq!(res.origin, Some("source"));
        assert!(res.command.as_deref().is_some_and(|c| c.starts_with("cargo run")));

        let _ = std::fs::remove_dir_all(&core);
    }

    #[test]
    fn unresolved_engine_serializes_as_null() {
        let config = ResolverConfig::default().with_platform("freebsd", "riscv64");
        let output = EnvInfoOutput {
            schema_id: schema_id("envinfo"),
            version: "0.1.0",
            target: "riscv64gc-unknown-freebsd",
            features: vec!["cli".to_string()],
            resolution: Resolution::inspect(&config),
            environment: BTreeMap::from([(ENV_ENGINE, None)]),
        };

        let json = serde_json::to_value(&output).expect("envinfo output should serialize");
        assert!(json["schema_id"].as_str().unwrap().ends_with("envinfo.schema.json"));
        assert_eq!(json["resolution"]["platform_package"], serde_json::Value::Null);
        assert_eq!(json["resolution"]["command"], serde_json::Value::Null);
        assert_eq!(json["resolution"]["binary"], "nanoframe-core");
        assert_eq!(json["environment"]["NANOF_ENGINE"], serde_json::Value::Null);
    }

    #[test]
    fn cli_feature_is_reported() {
        assert!(active_features().contains(&"cli".to_string()));
    }
}
