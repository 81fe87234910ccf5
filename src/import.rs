//! Import resolution: `import "relative/path.ext"` reads, tokenises, parses, and
//! splices another file's statements before the importer's, de-duplicating by
//! canonical path and rejecting cycles.
//!
//! The directory/path-canonicalization/caching shape is modeled on
//! `driver.rs::find_static_files`, which walked a project tree caching visited paths
//! by their canonical form; here the "tree" is the import graph instead of a
//! directory listing.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::arena::UniqueStringArena;
use crate::ast::{FileName, Module, Stmt, StmtKind};
use crate::diagnostics::{Diagnostics, SourceLoc};
use crate::lexer;
use crate::parser;

/// Resolves `entry` and every file it (transitively) imports into a single [`Module`].
/// `files` interns every filename visited, so later diagnostics and code generation
/// share the same handles the lexer attached to each token.
pub fn resolve(entry: &Path, files: &mut UniqueStringArena<FileName>, diags: &mut Diagnostics) -> Module {
    let mut visiting: Vec<PathBuf> = Vec::new();
    let mut resolved: HashSet<PathBuf> = HashSet::new();
    let mut statements = Vec::new();
    resolve_file(entry, None, files, diags, &mut visiting, &mut resolved, &mut statements);
    Module::new(statements)
}

#[allow(clippy::too_many_arguments)]
fn resolve_file(
    path: &Path,
    importer_loc: Option<SourceLoc>,
    files: &mut UniqueStringArena<FileName>,
    diags: &mut Diagnostics,
    visiting: &mut Vec<PathBuf>,
    resolved: &mut HashSet<PathBuf>,
    out: &mut Vec<Stmt>,
) {
    let canonical = match path.canonicalize() {
        Ok(p) => p,
        Err(e) => {
            diags.error(importer_loc, format!("cannot resolve import {:?}: {}", path, e));
            return;
        }
    };

    // Diamond imports (two files importing a common third file) are spliced once, at
    // the point of their first encounter.
    if resolved.contains(&canonical) {
        return;
    }
    if visiting.contains(&canonical) {
        diags.error(importer_loc, format!("import cycle detected at {}", canonical.display()));
        return;
    }

    let source = match fs::read_to_string(&canonical) {
        Ok(s) => s,
        Err(e) => {
            diags.error(importer_loc, format!("cannot read {}: {}", canonical.display(), e));
            return;
        }
    };

    let filename = canonical.to_string_lossy().into_owned();
    let file_handle = files.alloc(&filename);
    visiting.push(canonical.clone());

    let tokens = lexer::lex(&source, &filename, file_handle, diags);
    let module = parser::parse_module(tokens, &filename, diags);
    let dir = canonical.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

    for stmt in module.statements {
        if let StmtKind::Import { path: import_path } = &stmt.kind {
            let loc = SourceLoc { file: files.get(stmt.token.loc.file).to_string(), line: stmt.token.loc.line };
            let resolved_path = dir.join(import_path);
            resolve_file(&resolved_path, Some(loc), files, diags, visiting, resolved, out);
        } else {
            out.push(stmt);
        }
    }

    visiting.pop();
    resolved.insert(canonical);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn splices_imported_statements_before_the_importer() {
        let dir = std::env::temp_dir().join(format!("rhumbc_import_test_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        write_temp(&dir, "lib.rh", "fn helper(): int => 1\n");
        let entry = write_temp(&dir, "main.rh", "import \"lib.rh\"\nfn main =>\n  print(helper())\n");

        let mut files: UniqueStringArena<FileName> = UniqueStringArena::new();
        let mut diags = Diagnostics::new();
        let module = resolve(&entry, &mut files, &mut diags);

        assert!(!diags.has_errors(), "{:?}", diags.iter().map(|d| &d.message).collect::<Vec<_>>());
        let names: Vec<&str> = module
            .statements
            .iter()
            .filter_map(|s| match &s.kind {
                StmtKind::Function { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["helper", "main"]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn diamond_import_is_spliced_only_once() {
        let dir = std::env::temp_dir().join(format!("rhumbc_import_diamond_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        write_temp(&dir, "base.rh", "fn base(): int => 1\n");
        write_temp(&dir, "a.rh", "import \"base.rh\"\nfn a(): int => base()\n");
        write_temp(&dir, "b.rh", "import \"base.rh\"\nfn b(): int => base()\n");
        let entry = write_temp(&dir, "main.rh", "import \"a.rh\"\nimport \"b.rh\"\nfn main =>\n  print(a() + b())\n");

        let mut files: UniqueStringArena<FileName> = UniqueStringArena::new();
        let mut diags = Diagnostics::new();
        let module = resolve(&entry, &mut files, &mut diags);

        assert!(!diags.has_errors(), "{:?}", diags.iter().map(|d| &d.message).collect::<Vec<_>>());
        let base_count = module
            .statements
            .iter()
            .filter(|s| matches!(&s.kind, StmtKind::Function { name, .. } if name == "base"))
            .count();
        assert_eq!(base_count, 1);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn import_cycle_reports_an_error_instead_of_looping() {
        let dir = std::env::temp_dir().join(format!("rhumbc_import_cycle_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        write_temp(&dir, "a.rh", "import \"b.rh\"\nfn a(): int => 1\n");
        write_temp(&dir, "b.rh", "import \"a.rh\"\nfn b(): int => 1\n");
        let entry = dir.join("a.rh");

        let mut files: UniqueStringArena<FileName> = UniqueStringArena::new();
        let mut diags = Diagnostics::new();
        resolve(&entry, &mut files, &mut diags);

        assert!(diags.has_errors());

        fs::remove_dir_all(&dir).ok();
    }
}
