//! Compiler driver: wires lexing, import resolution, parsing, type checking and code
//! generation into the single pipeline the CLI invokes, and decides the process exit
//! code.
//!
//! Each phase is timed through a perf handle, and sub-steps report into a single
//! diagnostics sink rather than bubbling up typed errors.

use std::fs;
use std::path::{Path, PathBuf};

use crate::arena::UniqueStringArena;
use crate::ast::{FileName, Ident};
use crate::codegen;
use crate::diagnostics::Diagnostics;
use crate::import;
use crate::logger::Logger;
use crate::typeck;

/// The arenas shared across one compilation. AST nodes still carry identifiers as
/// plain `String`s (see `crate::ast`'s module doc) — parsing and codegen have no need
/// for handle-stable identity — but every name the type checker binds into a
/// [`crate::sym::SymbolTable`] is interned here, so two symbols with the same spelling
/// share one handle instead of a fresh heap allocation per occurrence.
pub struct CompilerArenas {
    pub files: UniqueStringArena<FileName>,
    pub names: UniqueStringArena<Ident>,
}

impl CompilerArenas {
    pub fn new() -> Self {
        CompilerArenas { files: UniqueStringArena::new(), names: UniqueStringArena::new() }
    }
}

impl Default for CompilerArenas {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DriverArgs {
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    pub log_level: Logger,
}

/// Runs the full pipeline for `args`. Returns the process exit code (0 success, 1 on any failure) — the driver never panics on a user-facing error, only on a bug.
pub fn run(args: &DriverArgs) -> i32 {
    let logger = &args.log_level;
    let mut arenas = CompilerArenas::new();
    let mut diags = Diagnostics::new();

    let parse_timer = logger.perf("lex+import+parse");
    let mut module = import::resolve(&args.source, &mut arenas.files, &mut diags);
    parse_timer.stop();

    if diags.has_errors() {
        diags.emit();
        return 1;
    }

    let typeck_timer = logger.perf("typecheck");
    typeck::check_module(&mut module, &arenas.files, &mut arenas.names, &mut diags);
    typeck_timer.stop();

    if diags.has_errors() {
        diags.emit();
        return 1;
    }
    diags.emit();

    let codegen_timer = logger.perf("codegen");
    let source_name = args.source.to_string_lossy().into_owned();
    let c_source = codegen::emit(&module, &source_name);
    codegen_timer.stop();

    let output_path = args.output.clone().unwrap_or_else(|| default_output_path(&args.source));
    match fs::write(&output_path, c_source) {
        Ok(()) => {
            logger.info(format_args!("wrote {}", output_path.display()));
            0
        }
        Err(e) => {
            logger.error(format_args!("cannot write {}: {}", output_path.display(), e));
            1
        }
    }
}

/// Default output: the source basename with `.s` appended) — kept as-is even
/// though the emitted text is C, since that is the literal external contract.
fn default_output_path(source: &Path) -> PathBuf {
    let mut name = source.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".s");
    source.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_path_appends_dot_s_to_the_basename() {
        let out = default_output_path(Path::new("src/program.rh"));
        assert_eq!(out, Path::new("src/program.rh.s"));
    }
}
