//! Engine process transport for nanoframe.
//!
//! Two pieces live here:
//! - the platform resolver, which decides which engine executable to run
//! - the process supervisor, which spawns it with piped stdin/stdout,
//!   inherited stderr, and reports its exit asynchronously
//!
//! This is the lowest layer of nanoframe. Everything else builds on the
//! [`EngineStdio`] pipes and the [`EngineProcess`] handle provided here.

pub mod command;
pub mod error;
pub mod process;
pub mod resolver;

pub use command::{EngineCommand, EngineOrigin, ENGINE_BIN_NAME};
pub use error::{Result, TransportError};
pub use process::{EngineProcess, EngineStdio, ExitReport};
pub use resolver::{
    binary_name, find_core_dir, platform_package, resolve, resolve_or_fallback, ResolverConfig,
    CORE_CHECKOUT_DIRS, ENV_CORE_DIR, ENV_DEV, ENV_ENGINE, ENV_FORCE_PLATFORM, ENV_PACKAGES_DIR,
};
