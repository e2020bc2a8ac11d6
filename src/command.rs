use crate::env::Environment;
use crate::jobs::JobTable;
use anyhow::Result;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure,
/// following the POSIX shell convention.
pub type ExitCode = i32;

/// Object-safe trait for anything the interpreter can run.
///
/// Implemented by built-ins via a blanket impl and by external commands.
/// `out` receives the interpreter's own reporting (metrics, job lines,
/// built-in output); external children inherit the real standard streams
/// regardless of where `out` points.
pub trait ExecutableCommand {
    /// Run the command to completion (or, for a background spawn, to the
    /// point of registration) and return its exit code.
    fn execute(
        self: Box<Self>,
        out: &mut dyn Write,
        env: &mut Environment,
        jobs: &mut JobTable,
    ) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`, letting
/// the interpreter fall through to the next factory in its chain.
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>>;
}
