//! Spawning and supervision of non-builtin commands.
//!
//! One command word plus arguments becomes one child process. A trailing
//! `&` hands the child to the [`JobTable`]; otherwise the executor blocks
//! until the child terminates and assembles an [`ExecutionReport`] from the
//! wall clock and the child resource-usage counters.

use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::interpreter::Factory;
use crate::jobs::{JobError, JobTable};
use crate::usage::ChildUsage;
use anyhow::Result;
use nix::errno::Errno;
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// Final-argument marker that requests background execution.
pub const BACKGROUND_MARKER: &str = "&";

/// Failures of a single external command.
///
/// All variants are recoverable: the interactive loop reports them and
/// keeps running.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Process creation failed, so no child exists.
    #[error("failed to start {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    /// The blocking wait on a foreground child failed.
    #[error("failed to wait for {name}: {source}")]
    Wait {
        name: String,
        #[source]
        source: io::Error,
    },
    /// Querying the child resource-usage counters failed.
    #[error("failed to read child resource usage: {0}")]
    Usage(#[from] Errno),
    #[error(transparent)]
    Jobs(#[from] JobError),
}

/// Classification of how a child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Normal exit with the given status code.
    Exited(i32),
    /// Killed by the given signal.
    Signaled(i32),
    /// The wait reported neither an exit code nor a signal.
    Abnormal,
}

impl Termination {
    pub fn from_status(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        if let Some(code) = status.code() {
            Self::Exited(code)
        } else if let Some(signal) = status.signal() {
            Self::Signaled(signal)
        } else {
            Self::Abnormal
        }
    }

    /// Collapse to a conventional shell exit code: the status itself for a
    /// normal exit, 128 plus the signal number otherwise.
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Exited(code) => code,
            Self::Signaled(signal) => 128 + signal,
            Self::Abnormal => -1,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "Child process exited with status {code}"),
            Self::Signaled(signal) => write!(f, "Child process terminated by signal {signal}"),
            Self::Abnormal => write!(f, "Child process terminated abnormally"),
        }
    }
}

/// Telemetry for one awaited foreground command.
///
/// Produced once per invocation and rendered immediately; never stored.
/// The wall clock brackets only the wait, and the usage counters are
/// differenced so they cover just the awaited child (peak RSS stays a
/// high-water mark, see [`ChildUsage::since`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReport {
    pub elapsed: Duration,
    pub usage: ChildUsage,
    pub termination: Termination,
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Elapsed wall-clock time: {} ms", self.elapsed.as_millis())?;
        writeln!(f, "CPU time used (user): {} ms", self.usage.user_ms)?;
        writeln!(f, "CPU time used (system): {} ms", self.usage.system_ms)?;
        writeln!(
            f,
            "Involuntary context switches: {}",
            self.usage.involuntary_switches
        )?;
        writeln!(
            f,
            "Voluntary context switches: {}",
            self.usage.voluntary_switches
        )?;
        writeln!(f, "Major page faults: {}", self.usage.major_faults)?;
        writeln!(f, "Minor page faults: {}", self.usage.minor_faults)?;
        writeln!(
            f,
            "Maximum resident set size: {} KB",
            self.usage.max_rss_kb
        )?;
        write!(f, "{}", self.termination)
    }
}

/// What the executor did with a command.
#[derive(Debug)]
pub enum Launch {
    /// The child was awaited to completion.
    Foreground(ExecutionReport),
    /// The child is now tracked by the job table.
    Background { slot: usize, pid: u32 },
}

/// Command that is not a builtin.
pub struct ExternalCommand {
    /// Resolved path of the executable.
    path: OsString,
    /// The command word as typed; used for diagnostics and the job label.
    name: String,
    args: Vec<OsString>,
}

impl ExternalCommand {
    pub fn new(path: OsString, name: String, args: Vec<OsString>) -> Self {
        Self { path, name, args }
    }

    /// Spawn the command and either await it or hand it to the job table.
    ///
    /// A trailing [`BACKGROUND_MARKER`] argument selects background mode
    /// and is not passed to the child. A full job table refuses the
    /// registration before any process is created, so a rejected command
    /// leaves nothing running.
    pub fn launch(
        mut self,
        env: &Environment,
        jobs: &mut JobTable,
    ) -> Result<Launch, CommandError> {
        let background = self.args.last().is_some_and(|arg| arg == BACKGROUND_MARKER);
        if background {
            self.args.pop();
            if jobs.is_full() {
                return Err(JobError::CapacityExceeded {
                    capacity: jobs.capacity(),
                }
                .into());
            }
        }

        let mut command = std::process::Command::new(&self.path);
        command
            .args(&self.args)
            .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&env.current_dir);

        let mut child = command.spawn().map_err(|source| CommandError::Spawn {
            name: self.name.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(name = %self.name, pid, background, "spawned external command");

        if background {
            let slot = jobs.register(child, self.name)?;
            return Ok(Launch::Background { slot, pid });
        }

        let before = ChildUsage::snapshot()?;
        let started = Instant::now();
        let status = child.wait().map_err(|source| CommandError::Wait {
            name: self.name.clone(),
            source,
        })?;
        let elapsed = started.elapsed();
        let usage = ChildUsage::snapshot()?.since(&before);

        Ok(Launch::Foreground(ExecutionReport {
            elapsed,
            usage,
            termination: Termination::from_status(status),
        }))
    }
}

impl CommandFactory for Factory<ExternalCommand> {
    fn try_create(
        &self,
        env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        let search_paths = env.get_var("PATH")?;
        match find_command_path(OsStr::new(&search_paths), Path::new(name)) {
            Some(executable) => Some(Box::new(ExternalCommand::new(
                executable.as_os_str().to_owned(),
                name.to_string(),
                args.iter().map(|x| x.into()).collect(),
            ))),
            None => None,
        }
    }
}

impl ExecutableCommand for ExternalCommand {
    fn execute(
        self: Box<Self>,
        out: &mut dyn Write,
        env: &mut Environment,
        jobs: &mut JobTable,
    ) -> Result<ExitCode> {
        match (*self).launch(env, jobs)? {
            Launch::Foreground(report) => {
                writeln!(out, "{report}")?;
                Ok(report.termination.exit_code())
            }
            Launch::Background { slot, pid } => {
                writeln!(out, "[{slot}] {pid}")?;
                Ok(0)
            }
        }
    }
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returned if it exists.
/// - `./`-prefixed path: returned if it exists.
/// - Relative path with multiple components (e.g. `bin/sh`): returned if it
///   exists relative to the working directory.
/// - Single component (no separators): each directory in `search_paths`
///   (PATH) is tried in order and the first existing match wins.
/// - Empty path: `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned
/// `PathBuf` when the result is discovered via PATH lookup.
pub fn find_command_path<'a>(search_paths: &OsStr, path: &'a Path) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    if path.starts_with("./") && path.exists() {
        return Some(Cow::Borrowed(path));
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(word), None) => find_in_path(search_paths, word.as_os_str()).map(Cow::Owned),
        _ => find_by_path(path).map(Cow::Borrowed),
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    for dir in std::env::split_paths(search_paths) {
        let candidate = dir.join(cmd);
        if let Some(found) = find_by_path(&candidate) {
            return Some(found.to_owned());
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if path.exists() { Some(path) } else { None }
}
