use anyhow::Result;
use minish::Interpreter;
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> ExitCode {
    // stderr for logs; stdout carries only command output and job reports.
    // Silent unless RUST_LOG asks for something.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("minish: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let mut interpreter = Interpreter::default();

    if argv.is_empty() {
        interpreter.repl()?;
        Ok(ExitCode::SUCCESS)
    } else {
        let code = interpreter.run_argv(&argv)?;
        Ok(ExitCode::from(code as u8))
    }
}
