mod arena;
mod ast;
mod codegen;
mod diagnostics;
mod driver;
mod import;
mod lexer;
mod logger;
mod parser;
mod sym;
mod typeck;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use driver::DriverArgs;
use logger::{Level, Logger};

/// Compiler front-end and C back-end for the Rhumb language.
#[derive(Parser)]
#[command(name = "rhumbc", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a source file to a C translation unit.
    Compile {
        /// Source file to compile.
        source: PathBuf,

        /// Output path. Defaults to the source basename with `.s` appended.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Shorthand for `-l 3` (debug level).
        #[arg(short, long)]
        verbose: bool,

        /// Log level, 0 (error) through 4 (trace).
        #[arg(short = 'l', long = "level")]
        level: Option<u8>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let Command::Compile { source, output, verbose, level } = cli.command;

    let logger = match level {
        Some(n) => Logger::new(Level::from_cli(n)),
        None if verbose => Logger::verbose(),
        None => Logger::new(Level::Warn),
    };

    let args = DriverArgs { source, output, log_level: logger };
    let code = driver::run(&args);
    ExitCode::from(code as u8)
}
