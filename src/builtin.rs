use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::interpreter::Factory;
use crate::jobs::JobTable;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// Built-in commands known to the interpreter at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and executed
/// directly in-process without spawning a child. Errors they return are
/// recoverable; the interactive loop reports them and keeps going.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    /// Canonical name of the command, e.g. "cd" or "jobs".
    fn name() -> &'static str;

    /// Executes the command.
    ///
    /// Return value follows shell conventions: 0 for success, non-zero for
    /// failure that has already been reported through `out`.
    fn execute(
        self,
        out: &mut dyn Write,
        env: &mut Environment,
        jobs: &mut JobTable,
    ) -> Result<ExitCode>;
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        out: &mut dyn Write,
        env: &mut Environment,
        jobs: &mut JobTable,
    ) -> Result<ExitCode> {
        T::execute(*self, out, env, jobs)
    }
}

/// Pseudo-command produced when argument parsing stops early, either for
/// `--help` or for invalid arguments. Running it prints what argh produced.
struct InvalidArgs {
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        out: &mut dyn Write,
        _env: &mut Environment,
        _jobs: &mut JobTable,
    ) -> Result<ExitCode> {
        writeln!(out, "{}", self.output.trim_end())?;
        Ok(if self.is_error { 1 } else { 0 })
    }
}

impl<T: BuiltinCommand + 'static> CommandFactory for Factory<T> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name == T::name() {
            Some(match T::from_args(&[name], args) {
                Ok(cmd) => Box::new(cmd),
                Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                    output,
                    is_error: status.is_err(),
                }),
            })
        } else {
            None
        }
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn execute(
        self,
        _out: &mut dyn Write,
        env: &mut Environment,
        _jobs: &mut JobTable,
    ) -> Result<ExitCode> {
        let target = match self.target {
            Some(t) if !t.is_empty() => PathBuf::from(t),
            _ => return Err(anyhow::anyhow!("cd: missing argument")),
        };

        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()))?;

        env::set_current_dir(&canonical)
            .with_context(|| format!("cd: can't chdir to {}", canonical.display()))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// List background jobs that have not been reported as completed yet.
pub struct Jobs {}

impl BuiltinCommand for Jobs {
    fn name() -> &'static str {
        "jobs"
    }

    fn execute(
        self,
        out: &mut dyn Write,
        _env: &mut Environment,
        jobs: &mut JobTable,
    ) -> Result<ExitCode> {
        writeln!(out, "Background Jobs:")?;
        if jobs.is_empty() {
            writeln!(out, "none")?;
        } else {
            for entry in jobs.list() {
                writeln!(out, "[{}] {} {}", entry.slot, entry.pid, entry.name)?;
            }
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Leave the interpreter. Refused while background jobs are still tracked.
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored; exit statuses are not supported.
    pub args: Vec<String>,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn execute(
        self,
        out: &mut dyn Write,
        env: &mut Environment,
        jobs: &mut JobTable,
    ) -> Result<ExitCode> {
        if !jobs.is_empty() {
            writeln!(out, "There are still background jobs running.")?;
            return Ok(1);
        }
        env.should_exit = true;
        Ok(0)
    }
}

/// Replace the prompt shown before each interactive read.
///
/// Recognizes only the exact form `set prompt = <value>`. Any other `set`
/// invocation is not a builtin and falls through to PATH lookup like an
/// ordinary command.
pub struct SetPrompt {
    pub value: String,
}

impl CommandFactory for Factory<SetPrompt> {
    fn try_create(
        &self,
        _env: &Environment,
        name: &str,
        args: &[&str],
    ) -> Option<Box<dyn ExecutableCommand>> {
        if name != "set" {
            return None;
        }
        match args {
            ["prompt", "=", value] => Some(Box::new(SetPrompt {
                value: value.to_string(),
            })),
            _ => None,
        }
    }
}

impl ExecutableCommand for SetPrompt {
    fn execute(
        self: Box<Self>,
        _out: &mut dyn Write,
        env: &mut Environment,
        _jobs: &mut JobTable,
    ) -> Result<ExitCode> {
        env.prompt = self.value;
        Ok(0)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::{Child, Command};
    use std::sync::{Mutex, MutexGuard, OnceLock};

    /// Serializes tests that read or change the process working directory.
    fn lock_current_dir() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn run_builtin<T: BuiltinCommand>(
        args: &[&str],
        out: &mut Vec<u8>,
        env: &mut Environment,
        jobs: &mut JobTable,
    ) -> Result<ExitCode> {
        let cmd = T::from_args(&[T::name()], args).expect("arguments should parse");
        cmd.execute(out, env, jobs)
    }

    /// A child that is already dead but still occupies a table slot until
    /// the next reconciliation.
    fn reaped_child() -> (Child, u32) {
        let mut child = Command::new("/bin/sh").args(["-c", "exit 0"]).spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        (child, pid)
    }

    #[test]
    fn test_cd_changes_both_process_and_environment_dir() {
        let _guard = lock_current_dir();
        let cwd_before = env::current_dir().unwrap();

        let tmp = env::temp_dir().join(format!("builtin_cd_{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        fs::create_dir_all(&tmp).unwrap();

        let mut environment = Environment::new();
        let mut jobs = JobTable::new();
        let mut out = Vec::new();
        let code = run_builtin::<Cd>(
            &[tmp.to_str().unwrap()],
            &mut out,
            &mut environment,
            &mut jobs,
        )
        .unwrap();

        let canonical = fs::canonicalize(&tmp).unwrap();
        let reached = env::current_dir().unwrap();
        env::set_current_dir(&cwd_before).unwrap();
        let _ = fs::remove_dir_all(&tmp);

        assert_eq!(code, 0);
        assert_eq!(environment.current_dir, canonical);
        assert_eq!(reached, canonical);
        assert!(out.is_empty());
    }

    #[test]
    fn test_cd_without_argument_reports_missing_argument() {
        let _guard = lock_current_dir();
        let cwd_before = env::current_dir().unwrap();

        let mut environment = Environment::new();
        let mut jobs = JobTable::new();
        let mut out = Vec::new();
        let err = run_builtin::<Cd>(&[], &mut out, &mut environment, &mut jobs).unwrap_err();

        assert_eq!(err.to_string(), "cd: missing argument");
        assert_eq!(env::current_dir().unwrap(), cwd_before);
    }

    #[test]
    fn test_cd_to_missing_directory_fails_recoverably() {
        let _guard = lock_current_dir();
        let cwd_before = env::current_dir().unwrap();

        let mut environment = Environment::new();
        let mut jobs = JobTable::new();
        let mut out = Vec::new();
        let err = run_builtin::<Cd>(
            &["/no/such/directory/anywhere"],
            &mut out,
            &mut environment,
            &mut jobs,
        )
        .unwrap_err();

        assert!(err.to_string().starts_with("cd: can't canonicalize"));
        assert_eq!(env::current_dir().unwrap(), cwd_before);
        assert_eq!(environment.current_dir, Environment::new().current_dir);
    }

    #[test]
    fn test_jobs_renders_none_for_an_empty_table() {
        let mut environment = Environment::new();
        let mut jobs = JobTable::new();
        let mut out = Vec::new();

        let code = run_builtin::<Jobs>(&[], &mut out, &mut environment, &mut jobs).unwrap();

        assert_eq!(code, 0);
        assert_eq!(String::from_utf8(out).unwrap(), "Background Jobs:\nnone\n");
    }

    #[test]
    fn test_jobs_lists_entries_in_slot_order() {
        let mut environment = Environment::new();
        let mut jobs = JobTable::new();

        let (first, first_pid) = reaped_child();
        let (second, second_pid) = reaped_child();
        jobs.register(first, "first").unwrap();
        jobs.register(second, "second").unwrap();

        let mut out = Vec::new();
        let code = run_builtin::<Jobs>(&[], &mut out, &mut environment, &mut jobs).unwrap();

        assert_eq!(code, 0);
        let expected =
            format!("Background Jobs:\n[1] {first_pid} first\n[2] {second_pid} second\n");
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_exit_refuses_while_jobs_are_tracked() {
        let mut environment = Environment::new();
        let mut jobs = JobTable::new();
        let (child, _) = reaped_child();
        jobs.register(child, "held").unwrap();

        let mut out = Vec::new();
        let code = run_builtin::<Exit>(&[], &mut out, &mut environment, &mut jobs).unwrap();

        assert_eq!(code, 1);
        assert!(!environment.should_exit);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "There are still background jobs running.\n"
        );

        // once the table drains, exit goes through
        jobs.reconcile();
        let mut out = Vec::new();
        let code = run_builtin::<Exit>(&[], &mut out, &mut environment, &mut jobs).unwrap();
        assert_eq!(code, 0);
        assert!(environment.should_exit);
        assert!(out.is_empty());
    }

    #[test]
    fn test_set_prompt_factory_matches_only_the_exact_shape() {
        let environment = Environment::new();
        let factory = Factory::<SetPrompt>::default();

        assert!(factory
            .try_create(&environment, "set", &["prompt", "=", "% "])
            .is_some());
        assert!(factory
            .try_create(&environment, "set", &["prompt", "="])
            .is_none());
        assert!(factory
            .try_create(&environment, "set", &["editor", "=", "vi"])
            .is_none());
        assert!(factory
            .try_create(&environment, "set", &["prompt", "=", "a", "b"])
            .is_none());
        assert!(factory
            .try_create(&environment, "prompt", &["=", "x"])
            .is_none());
    }

    #[test]
    fn test_set_prompt_updates_the_environment() {
        let mut environment = Environment::new();
        let mut jobs = JobTable::new();
        let factory = Factory::<SetPrompt>::default();

        let cmd = factory
            .try_create(&environment, "set", &["prompt", "=", "%"])
            .unwrap();
        let mut out = Vec::new();
        let code = cmd.execute(&mut out, &mut environment, &mut jobs).unwrap();

        assert_eq!(code, 0);
        assert_eq!(environment.prompt, "%");
        assert!(out.is_empty());
    }

    #[test]
    fn test_factory_ignores_other_command_names() {
        let environment = Environment::new();
        let factory = Factory::<Cd>::default();
        assert!(factory.try_create(&environment, "ls", &[]).is_none());
    }

    #[test]
    fn test_invalid_arguments_render_usage_and_fail() {
        let mut environment = Environment::new();
        let mut jobs = JobTable::new();
        let factory = Factory::<Jobs>::default();

        let cmd = factory
            .try_create(&environment, "jobs", &["--bogus"])
            .expect("factory recognizes the name even with bad arguments");
        let mut out = Vec::new();
        let code = cmd.execute(&mut out, &mut environment, &mut jobs).unwrap();

        assert_eq!(code, 1);
        assert!(!out.is_empty());
    }

    #[test]
    fn test_help_renders_usage_and_succeeds() {
        let mut environment = Environment::new();
        let mut jobs = JobTable::new();
        let factory = Factory::<Jobs>::default();

        let cmd = factory.try_create(&environment, "jobs", &["--help"]).unwrap();
        let mut out = Vec::new();
        let code = cmd.execute(&mut out, &mut environment, &mut jobs).unwrap();

        assert_eq!(code, 0);
        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.contains("Usage"));
    }
}
