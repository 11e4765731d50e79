use std::time::Duration;

use nanoframe_peer::{Engine, EngineConfig, ExitPolicy, HandshakeConfig};
use nanoframe_transport::{platform_package, resolve, ResolverConfig, ENV_CORE_DIR, ENV_DEV};
use serde::Serialize;

use crate::cmd::envinfo::active_features;
use crate::cmd::{shutdown, DoctorArgs};
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{millis, print_json_line, schema_id, OutputFormat};

/// Handshake deadline used by `--handshake`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Pass,
    Fail,
    Warn,
    Info,
    Skip,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    name: String,
    status: CheckStatus,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorOutput {
    schema_id: String,
    checks: Vec<CheckResult>,
    overall: &'static str,
}

pub async fn run(args: DoctorArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ResolverConfig::from_env();
    let mut checks = vec![
        platform_package_check(&config),
        engine_resolution_check(&config),
        core_dir_check(&config),
        compiled_features_check(),
    ];

    if args.handshake {
        checks.push(engine_handshake_check(&config).await);
    }

    let has_fail = checks.iter().any(|c| c.status == CheckStatus::Fail);
    let overall = if has_fail { "fail" } else { "pass" };

    let output = DoctorOutput {
        schema_id: schema_id("doctor-report"),
        checks,
        overall,
    };

    print_doctor(&output, format);

    if has_fail {
        Ok(HEALTH_CHECK_FAILED)
    } else {
        Ok(SUCCESS)
    }
}

fn print_doctor(output: &DoctorOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json_line(output),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("nanoframe doctor\n");
            for c in &output.checks {
                println!(
                    "  [{:>4}] {:<22} {}",
                    status_text(c.status),
                    c.name,
                    c.detail
                );
            }
            if output.overall == "pass" {
                println!("\n  Result: all checks passed");
            } else {
                println!("\n  Result: one or more checks failed");
            }
        }
        OutputFormat::Raw => println!("{}", output.overall),
    }
}

fn status_text(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Pass => "PASS",
        CheckStatus::Fail => "FAIL",
        CheckStatus::Warn => "WARN",
        CheckStatus::Info => "INFO",
        CheckStatus::Skip => "SKIP",
    }
}

fn platform_package_check(config: &ResolverConfig) -> CheckResult {
    match platform_package(&config.os, &config.arch) {
        Some(package) => CheckResult {
            name: "platform_package".to_string(),
            status: CheckStatus::Pass,
            detail: format!("{}/{} uses {package}", config.os, config.arch),
        },
        // Still usable through NANOF_ENGINE, a source build, or PATH.
        None => CheckResult {
            name: "platform_package".to_string(),
            status: CheckStatus::Warn,
            detail: format!("no prebuilt engine for {}/{}", config.os, config.arch),
        },
    }
}

fn engine_resolution_check(config: &ResolverConfig) -> CheckResult {
    match resolve(config) {
        Some(command) => CheckResult {
            name: "engine_resolution".to_string(),
            status: CheckStatus::Pass,
            detail: format!("{} ({})", command, command.origin),
        },
        None => CheckResult {
            name: "engine_resolution".to_string(),
            status: CheckStatus::Warn,
            detail: "no engine found; launching will try the bare binary name".to_string(),
        },
    }
}

fn core_dir_check(config: &ResolverConfig) -> CheckResult {
    let Some(dir) = &config.core_dir else {
        let status = if config.dev_mode {
            CheckStatus::Fail
        } else {
            CheckStatus::Skip
        };
        return CheckResult {
            name: "core_dir".to_string(),
            status,
            detail: if config.dev_mode {
                format!("{ENV_DEV} is set but no engine checkout was found; set {ENV_CORE_DIR}")
            } else {
                "no engine checkout found".to_string()
            },
        };
    };

    if config.has_local_core() {
        CheckResult {
            name: "core_dir".to_string(),
            status: CheckStatus::Pass,
            detail: format!("{} holds a cargo project", dir.display()),
        }
    } else {
        CheckResult {
            name: "core_dir".to_string(),
            status: CheckStatus::Fail,
            detail: format!("{} has no Cargo.toml", dir.display()),
        }
    }
}

fn compiled_features_check() -> CheckResult {
    CheckResult {
        name: "compiled_features".to_string(),
        status: CheckStatus::Info,
        detail: active_features().join(", "),
    }
}

async fn engine_handshake_check(config: &ResolverConfig) -> CheckResult {
    let engine_config = EngineConfig::default()
        .with_resolver(config.clone())
        .with_handshake(HandshakeConfig::default().with_timeout(HANDSHAKE_TIMEOUT))
        .with_exit_policy(ExitPolicy::Detach);

    let engine = match Engine::spawn(engine_config) {
        Ok(engine) => engine,
        Err(err) => {
            return CheckResult {
                name: "engine_handshake".to_string(),
                status: CheckStatus::Fail,
                detail: format!("launch failed: {err}"),
            }
        }
    };

    let outcome = engine.ready().await;
    shutdown(&engine).await;

    match outcome {
        Ok(result) => CheckResult {
            name: "engine_handshake".to_string(),
            status: CheckStatus::Pass,
            detail: format!("answered {} in {:.2}ms", result.response, millis(result.elapsed)),
        },
        Err(err) => CheckResult {
            name: "engine_handshake".to_string(),
            status: CheckStatus::Fail,
            detail: err.to_string(),
        },
    }
}
