use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

/// Name of the engine executable, without platform suffix.
pub const ENGINE_BIN_NAME: &str = "nanoframe-core";

/// Where an [`EngineCommand`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOrigin {
    /// Explicit path supplied by the caller or `NANOF_ENGINE`.
    Explicit,
    /// Built and run from a local source checkout via cargo.
    Source,
    /// Prebuilt binary from a platform package.
    Prebuilt,
    /// Found on the executable search path.
    SearchPath,
    /// Bare binary name, left for the OS to find at spawn time.
    Fallback,
}

impl EngineOrigin {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineOrigin::Explicit => "explicit",
            EngineOrigin::Source => "source",
            EngineOrigin::Prebuilt => "prebuilt",
            EngineOrigin::SearchPath => "search-path",
            EngineOrigin::Fallback => "fallback",
        }
    }
}

impl fmt::Display for EngineOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully described engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    /// Program to execute.
    pub program: PathBuf,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Working directory, if different from the host's.
    pub cwd: Option<PathBuf>,
    /// How this command was chosen.
    pub origin: EngineOrigin,
}

impl EngineCommand {
    /// Run an explicit executable with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            origin: EngineOrigin::Explicit,
        }
    }

    /// The bare engine binary name, resolved by the OS at spawn time.
    pub fn fallback() -> Self {
        Self {
            program: PathBuf::from(ENGINE_BIN_NAME),
            args: Vec::new(),
            cwd: None,
            origin: EngineOrigin::Fallback,
        }
    }

    /// Append an argument.
    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub(crate) fn with_origin(mut self, origin: EngineOrigin) -> Self {
        self.origin = origin;
        self
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_program_and_args() {
        let cmd = EngineCommand::new("cargo").with_args(["run", "--quiet"]);
        assert_eq!(cmd.to_string(), "cargo run --quiet");
        assert_eq!(cmd.origin, EngineOrigin::Explicit);
    }

    #[test]
    fn fallback_uses_bare_binary_name() {
        let cmd = EngineCommand::fallback();
        assert_eq!(cmd.program, PathBuf::from(ENGINE_BIN_NAME));
        assert_eq!(cmd.origin, EngineOrigin::Fallback);
        assert!(cmd.args.is_empty());
    }
}
