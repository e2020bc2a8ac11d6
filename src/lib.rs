//! A small interactive command interpreter with background-job tracking.
//!
//! Input lines are split into words and dispatched: a handful of builtins
//! (`cd`, `set prompt = <value>`, `jobs`, `exit`) run in-process, everything
//! else resolves through PATH and runs as a child process. A foreground
//! child is awaited and summarized with wall-clock and resource-usage
//! metrics; a command ending in `&` is handed to a bounded job table and
//! reaped later without ever blocking the prompt.
//!
//! The main entry point is [`Interpreter`], which owns the session state
//! (environment, prompt, job table) and drives both the interactive loop
//! and the single-command mode. The [`command`] and [`env`] modules expose
//! the traits and types needed to plug in additional commands.

mod builtin;
pub mod command;
pub mod env;
pub mod external;
mod interpreter;
pub mod jobs;
mod lexer;
pub mod usage;

/// Convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and an example.
pub use interpreter::Interpreter;
