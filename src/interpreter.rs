use crate::command::{CommandFactory, ExitCode};
use crate::env::Environment;
use crate::external::ExternalCommand;
use crate::jobs::JobTable;
use crate::lexer;
use anyhow::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::Write;
use tracing::debug;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports commands defined in this crate: builtins and
/// [`ExternalCommand`].
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// The interactive command interpreter.
///
/// Owns the [`Environment`] and the [`JobTable`] for the whole session and
/// dispatches each input line: builtins first, then the external-command
/// path. Completed background jobs are reported immediately before a
/// non-builtin command runs, so `jobs` and the other builtins observe the
/// table exactly as the previous command left it.
///
/// Example
/// ```
/// use minish::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.dispatch("jobs").unwrap();
/// assert_eq!(code, 0);
/// ```
pub struct Interpreter {
    env: Environment,
    jobs: JobTable,
    builtins: Vec<Box<dyn CommandFactory>>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of builtin factories.
    pub fn new(builtins: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            jobs: JobTable::new(),
            builtins,
        }
    }

    /// The default interpreter with a job table bounded at `capacity`.
    pub fn with_job_capacity(capacity: usize) -> Self {
        Self {
            jobs: JobTable::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Execute one input line and return its exit code.
    ///
    /// An empty (or all-whitespace) line does nothing and succeeds. Errors
    /// are recoverable: the caller reports them and the session continues.
    pub fn dispatch(&mut self, line: &str) -> Result<ExitCode> {
        self.dispatch_with_output(line, &mut std::io::stdout())
    }

    /// Like [`Interpreter::dispatch`], but with the interpreter's reporting
    /// redirected into `out`.
    pub fn dispatch_with_output(&mut self, line: &str, out: &mut dyn Write) -> Result<ExitCode> {
        let words = lexer::split_words(line);
        let Some((name, rest)) = words.split_first() else {
            return Ok(0);
        };
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();

        for factory in &self.builtins {
            if let Some(cmd) = factory.try_create(&self.env, name, &args) {
                debug!(name = %name, "dispatching builtin");
                return cmd.execute(out, &mut self.env, &mut self.jobs);
            }
        }

        // completions are reported only when a non-builtin is about to run,
        // so builtins observe the table unchanged
        self.reap_completed(out)?;

        match Factory::<ExternalCommand>::default().try_create(&self.env, name, &args) {
            Some(cmd) => cmd.execute(out, &mut self.env, &mut self.jobs),
            None => Err(anyhow::anyhow!("command not found: {}", name)),
        }
    }

    /// Report every background job that has terminated since the last check.
    fn reap_completed(&mut self, out: &mut dyn Write) -> Result<()> {
        for done in self.jobs.reconcile() {
            match done.result {
                Ok(_) => writeln!(out, "[{}] {} {} Completed", done.slot, done.pid, done.name)?,
                Err(err) => eprintln!("failed to poll job [{}] {}: {}", done.slot, done.pid, err),
            }
        }
        Ok(())
    }

    /// Read-eval-print loop over standard input.
    ///
    /// Recoverable command failures are printed to standard error and the
    /// loop continues; only the inability to read input ends it. `^C`
    /// discards the current line, end-of-file leaves the loop the same way
    /// a successful `exit` does.
    pub fn repl(&mut self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        while !self.env.should_exit {
            let prompt = format!("{} ", self.env.prompt);
            match rl.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str())?;
                    }
                    if let Err(err) = self.dispatch(&line) {
                        eprintln!("{err}");
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    /// Execute a single command given as argv and return its exit code.
    ///
    /// This is the non-interactive entry point: builtins are bypassed and
    /// the words go straight to the external-command path.
    pub fn run_argv(&mut self, argv: &[String]) -> Result<ExitCode> {
        self.run_argv_with_output(argv, &mut std::io::stdout())
    }

    fn run_argv_with_output(&mut self, argv: &[String], out: &mut dyn Write) -> Result<ExitCode> {
        let Some((name, rest)) = argv.split_first() else {
            return Ok(0);
        };
        let args: Vec<&str> = rest.iter().map(String::as_str).collect();
        match Factory::<ExternalCommand>::default().try_create(&self.env, name, &args) {
            Some(cmd) => cmd.execute(out, &mut self.env, &mut self.jobs),
            None => Err(anyhow::anyhow!("command not found: {}", name)),
        }
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default builtins: `cd`,
    /// `set prompt = <value>`, `jobs` and `exit`. Anything else resolves
    /// through PATH.
    fn default() -> Self {
        use crate::builtin::*;
        Self::new(vec![
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<SetPrompt>::default()),
            Box::new(Factory::<Jobs>::default()),
            Box::new(Factory::<Exit>::default()),
        ])
    }
}
