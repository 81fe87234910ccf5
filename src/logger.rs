//! Leveled logging and stage timing.
//!
//! A `Logger`/`PerfHandle` pair: a sink plus a `perf(id) -> PerfHandle` stopwatch you
//! `stop()` to log elapsed time, extended with a severity level gated by the CLI's
//! `-v`/`-l` flags. There is no config-file log target — output goes straight to
//! stderr at whatever level the user asked for.

use std::fmt;
use std::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl Level {
    /// Maps the CLI's `-l 0..4` flag onto a level, clamping out-of-range values.
    pub fn from_cli(n: u8) -> Self {
        match n {
            0 => Level::Error,
            1 => Level::Warn,
            2 => Level::Info,
            3 => Level::Debug,
            _ => Level::Trace,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        }
    }
}

/// Writes leveled messages to stderr, gated by a configured maximum level.
pub struct Logger {
    level: Level,
    timer: Instant,
}

impl Logger {
    pub fn new(level: Level) -> Self {
        Logger {
            level,
            timer: Instant::now(),
        }
    }

    /// `-v` without an explicit `-l` is shorthand for debug level.
    pub fn verbose() -> Self {
        Self::new(Level::Debug)
    }

    pub fn error<M: fmt::Display>(&self, message: M) {
        self.log(Level::Error, message);
    }

    pub fn warn<M: fmt::Display>(&self, message: M) {
        self.log(Level::Warn, message);
    }

    pub fn info<M: fmt::Display>(&self, message: M) {
        self.log(Level::Info, message);
    }

    pub fn debug<M: fmt::Display>(&self, message: M) {
        self.log(Level::Debug, message);
    }

    pub fn trace<M: fmt::Display>(&self, message: M) {
        self.log(Level::Trace, message);
    }

    fn log<M: fmt::Display>(&self, level: Level, message: M) {
        if level > self.level {
            return;
        }
        eprintln!(
            "[{:>9.5}] {}: {}",
            self.timer.elapsed().as_secs_f32(),
            level.label(),
            message
        );
    }

    /// Returns a handle which, when `stop()`-ed, logs the elapsed time at `debug`
    /// level — used to bracket each pipeline stage (lex, parse, typecheck, codegen).
    pub fn perf<'a, S: Into<String>>(&'a self, id: S) -> PerfHandle<'a> {
        PerfHandle {
            logger: self,
            id: id.into(),
            started: Instant::now(),
        }
    }
}

pub struct PerfHandle<'a> {
    logger: &'a Logger,
    id: String,
    started: Instant,
}

impl<'a> PerfHandle<'a> {
    pub fn stop(self) {
        let elapsed = self.started.elapsed().as_secs_f32();
        self.logger
            .debug(format_args!("\"{}\" took {:.5} secs", self.id, elapsed));
    }
}
