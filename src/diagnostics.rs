//! Located diagnostics: `file:line: message` on stderr, colorized (`term::color`,
//! `Attr::Bold`) when stderr is a tty, one line per diagnostic.

use std::fmt;
use std::io::IsTerminal;

use term::color;

/// A resolved source location: plain strings, so diagnostics don't need the arena
/// alive just to be printed (unlike [`crate::ast::Loc`], which stores an interned
/// file-name handle).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub severity: Severity,
    pub loc: Option<SourceLoc>,
    pub message: String,
}

impl Diagnostic {
    pub fn error<S: Into<String>>(loc: Option<SourceLoc>, message: S) -> Self {
        Diagnostic {
            severity: Severity::Error,
            loc,
            message: message.into(),
        }
    }

    pub fn warning<S: Into<String>>(loc: Option<SourceLoc>, message: S) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            loc,
            message: message.into(),
        }
    }
}

/// Accumulates diagnostics across an entire compilation pass so that one run can
/// enumerate as many lex/parse/type errors as possible instead of stopping at the
/// first one.
#[derive(Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics { items: Vec::new() }
    }

    pub fn push(&mut self, diag: Diagnostic) {
        self.items.push(diag);
    }

    pub fn error<S: Into<String>>(&mut self, loc: Option<SourceLoc>, message: S) {
        self.push(Diagnostic::error(loc, message));
    }

    pub fn warning<S: Into<String>>(&mut self, loc: Option<SourceLoc>, message: S) {
        self.push(Diagnostic::warning(loc, message));
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Writes every accumulated diagnostic to stderr as `file:line: message`,
    /// colorizing the severity tag when stderr is a tty.
    pub fn emit(&self) {
        let colorize = std::io::stderr().is_terminal();
        let mut term = if colorize { term::stderr() } else { None };

        for diag in &self.items {
            let tag = match diag.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            let color = match diag.severity {
                Severity::Error => color::RED,
                Severity::Warning => color::YELLOW,
            };

            if let Some(t) = term.as_mut() {
                let _ = t.fg(color);
                let _ = t.attr(term::Attr::Bold);
            }
            if let Some(loc) = &diag.loc {
                eprint!("{}: {}: ", loc, tag);
            } else {
                eprint!("{}: ", tag);
            }
            if let Some(t) = term.as_mut() {
                let _ = t.reset();
            }
            eprintln!("{}", diag.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_errors_ignores_warnings() {
        let mut diags = Diagnostics::new();
        diags.warning(None, "unused import");
        assert!(!diags.has_errors());
        diags.error(None, "unknown identifier");
        assert!(diags.has_errors());
    }
}
