//! Decides which engine executable to launch.
//!
//! Selection order:
//! 1. An explicit path (`NANOF_ENGINE`).
//! 2. A source build via cargo, when `NANOF_DEV` is set or an engine checkout
//!    exists and `NANOF_FORCE_PLATFORM` is not set. The checkout is
//!    `NANOF_CORE_DIR`, or else the first of `nanoframe-core/` and
//!    `packages/nanoframe-core/` holding a `Cargo.toml` under the working
//!    directory or the two directories above the running executable.
//! 3. A prebuilt binary from the platform package for this OS/arch.
//! 4. The engine binary on `PATH`.
//!
//! Resolution never fails; a missing engine shows up as a spawn error.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::command::{EngineCommand, EngineOrigin, ENGINE_BIN_NAME};

/// Forces building and running the engine from its source checkout.
pub const ENV_DEV: &str = "NANOF_DEV";
/// Forces the prebuilt platform binary even when a checkout is present.
pub const ENV_FORCE_PLATFORM: &str = "NANOF_FORCE_PLATFORM";
/// Location of the engine source checkout.
pub const ENV_CORE_DIR: &str = "NANOF_CORE_DIR";
/// Root directory holding prebuilt platform packages.
pub const ENV_PACKAGES_DIR: &str = "NANOF_PACKAGES_DIR";
/// Explicit engine executable.
pub const ENV_ENGINE: &str = "NANOF_ENGINE";

/// Scope directory of the prebuilt platform packages.
pub const PACKAGE_SCOPE: &str = "@nanoframe";

/// Where an engine checkout sits relative to a project or workspace root.
pub const CORE_CHECKOUT_DIRS: &[&str] = &["nanoframe-core", "packages/nanoframe-core"];

/// Inputs to engine resolution.
#[derive(Debug, Clone, Default)]
pub struct ResolverConfig {
    /// Development mode: prefer a source build.
    pub dev_mode: bool,
    /// Prefer the prebuilt binary over a present source checkout.
    pub force_platform: bool,
    /// Engine source checkout.
    pub core_dir: Option<PathBuf>,
    /// Directories searched for `@nanoframe/<package>/bin/<binary>`.
    pub package_roots: Vec<PathBuf>,
    /// Executable search path, in `PATH` syntax.
    pub search_path: Option<OsString>,
    /// Explicit engine executable; skips every other step.
    pub explicit: Option<PathBuf>,
    /// Target OS, as in `std::env::consts::OS`.
    pub os: String,
    /// Target architecture, as in `std::env::consts::ARCH`.
    pub arch: String,
}

impl ResolverConfig {
    /// Configuration for the current platform with nothing else set.
    pub fn for_current_platform() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            ..Self::default()
        }
    }

    /// Build the configuration from the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::for_current_platform();
        config.dev_mode = env_flag(ENV_DEV);
        config.force_platform = env_flag(ENV_FORCE_PLATFORM);
        config.core_dir = env_path(ENV_CORE_DIR).or_else(default_core_dir);
        config.explicit = env_path(ENV_ENGINE);
        config.search_path = std::env::var_os("PATH");
        config.package_roots = match env_path(ENV_PACKAGES_DIR) {
            Some(dir) => vec![dir],
            None => default_package_roots(),
        };
        config
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn with_force_platform(mut self, force_platform: bool) -> Self {
        self.force_platform = force_platform;
        self
    }

    pub fn with_core_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.core_dir = Some(dir.into());
        self
    }

    pub fn with_package_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.package_roots.push(dir.into());
        self
    }

    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    pub fn with_explicit(mut self, program: impl Into<PathBuf>) -> Self {
        self.explicit = Some(program.into());
        self
    }

    pub fn with_platform(mut self, os: impl Into<String>, arch: impl Into<String>) -> Self {
        self.os = os.into();
        self.arch = arch.into();
        self
    }

    /// True when `core_dir` holds a cargo project.
    pub fn has_local_core(&self) -> bool {
        self.core_dir
            .as_deref()
            .is_some_and(|dir| dir.join("Cargo.toml").is_file())
    }
}

/// Platform package name for an OS/arch pair, if one is published.
pub fn platform_package(os: &str, arch: &str) -> Option<&'static str> {
    match (os, arch) {
        ("windows", "x86_64") => Some("core-win32-x64"),
        ("windows", "aarch64") => Some("core-win32-arm64"),
        ("macos", "x86_64") => Some("core-darwin-x64"),
        ("macos", "aarch64") => Some("core-darwin-arm64"),
        ("linux", "x86_64") => Some("core-linux-x64"),
        _ => None,
    }
}

/// Engine executable file name on the given OS.
pub fn binary_name(os: &str) -> String {
    if os == "windows" {
        format!("{ENGINE_BIN_NAME}.exe")
    } else {
        ENGINE_BIN_NAME.to_string()
    }
}

/// Resolve the engine command, or `None` when nothing suitable is found.
pub fn resolve(config: &ResolverConfig) -> Option<EngineCommand> {
    if let Some(program) = &config.explicit {
        tracing::debug!(program = %program.display(), "using explicit engine");
        return Some(EngineCommand::new(program.clone()));
    }

    let prefer_source = config.dev_mode || (config.has_local_core() && !config.force_platform);
    if prefer_source {
        match &config.core_dir {
            Some(dir) => {
                if !config.has_local_core() {
                    tracing::warn!(
                        core_dir = %dir.display(),
                        "dev mode requested but the core directory has no Cargo.toml"
                    );
                }
                tracing::debug!(core_dir = %dir.display(), "building engine from source");
                return Some(source_command(dir));
            }
            None => tracing::warn!(
                "dev mode requested but no engine checkout was found; set {ENV_CORE_DIR}"
            ),
        }
    }

    if let Some(path) = prebuilt_binary(config) {
        tracing::debug!(program = %path.display(), "using prebuilt engine");
        return Some(EngineCommand::new(path).with_origin(EngineOrigin::Prebuilt));
    }

    if let Some(path) = search_path_binary(config) {
        tracing::debug!(program = %path.display(), "using engine from search path");
        return Some(EngineCommand::new(path).with_origin(EngineOrigin::SearchPath));
    }

    tracing::debug!("no engine resolved");
    None
}

/// Resolve, falling back to the bare binary name.
pub fn resolve_or_fallback(config: &ResolverConfig) -> EngineCommand {
    resolve(config).unwrap_or_else(EngineCommand::fallback)
}

fn source_command(core_dir: &Path) -> EngineCommand {
    EngineCommand::new("cargo")
        .with_args(["run", "--quiet", "--release", "--bin", ENGINE_BIN_NAME])
        .with_cwd(core_dir)
        .with_origin(EngineOrigin::Source)
}

fn prebuilt_binary(config: &ResolverConfig) -> Option<PathBuf> {
    let package = platform_package(&config.os, &config.arch)?;
    let binary = binary_name(&config.os);
    config
        .package_roots
        .iter()
        .map(|root| {
            root.join(PACKAGE_SCOPE)
                .join(package)
                .join("bin")
                .join(&binary)
        })
        .find(|candidate| candidate.is_file())
}

fn search_path_binary(config: &ResolverConfig) -> Option<PathBuf> {
    let search_path = config.search_path.as_ref()?;
    let binary = binary_name(&config.os);
    std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(&binary))
        .find(|candidate| candidate.is_file())
}

/// First directory among `bases` that holds an engine checkout.
pub fn find_core_dir<I, P>(bases: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    bases
        .into_iter()
        .flat_map(|base| {
            let base = base.as_ref().to_path_buf();
            CORE_CHECKOUT_DIRS.iter().map(move |dir| base.join(dir))
        })
        .find(|dir| dir.join("Cargo.toml").is_file())
}

fn default_core_dir() -> Option<PathBuf> {
    let mut bases = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        bases.push(cwd);
    }
    // target/<profile>/<exe>: the workspace root is two levels up.
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        bases.extend(exe_dir.ancestors().skip(1).take(2).map(Path::to_path_buf));
    }
    find_core_dir(bases)
}

fn default_package_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(dir);
    }
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd.join("node_modules"));
    }
    roots
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| flag_enabled(&value))
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

pub(crate) fn flag_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
