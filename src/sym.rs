//! Lexical scope stack of name to [`Symbol`] bindings.
//!
//! A struct-of-maps data layout implements the usual "stack of scopes" shape:
//! innermost-first lookup, unique names per scope, no qualified-name resolution.

use std::collections::HashMap;

use crate::arena::S;
use crate::ast::{FunctionModifier, Ident, MemoryQualifier, Type};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Function,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    /// Interned handle for the same spelling, allocated once per unique name by
    /// whichever `UniqueStringArena<Ident>` the type checker was given. Two symbols
    /// named `n` in different scopes get equal handles even though they're distinct
    /// bindings — `handle` identifies the spelling, not the binding; `SymbolTable`
    /// still keys lookup by scope plus `name`.
    pub handle: S<Ident>,
    pub ty: Type,
    pub kind: SymbolKind,
    pub qualifier: MemoryQualifier,
    pub modifier: FunctionModifier,
}

impl Symbol {
    pub fn is_function(&self) -> bool {
        self.kind == SymbolKind::Function
    }

    /// A function is implicitly `shared` when it returns a heap-borne type, even if
    /// the source never wrote the modifier.
    pub fn effective_modifier(&self) -> FunctionModifier {
        if self.is_function() && self.modifier == FunctionModifier::Default {
            let returns_heap = match &self.ty {
                Type::Function { ret, .. } => ret.is_heap_borne(),
                _ => false,
            };
            if returns_heap {
                return FunctionModifier::Shared;
            }
        }
        self.modifier
    }
}

#[derive(Default)]
struct Scope {
    bindings: HashMap<String, Symbol>,
}

/// A stack of lexical scopes. Scope 0 is the module (global) scope and is never
/// popped.
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope::default()],
        }
    }

    pub fn push(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop the module scope");
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Adds `symbol` to the innermost scope. Returns `false` (and leaves the table
    /// unchanged) if a binding with the same name already exists in that scope —
    /// callers turn this into a "duplicate declaration" diagnostic.
    pub fn add(&mut self, symbol: Symbol) -> bool {
        let scope = self.scopes.last_mut().expect("scope stack is never empty");
        if scope.bindings.contains_key(&symbol.name) {
            return false;
        }
        scope.bindings.insert(symbol.name.clone(), symbol);
        true
    }

    /// Looks up `name`, walking from the innermost scope outward.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        for scope in self.scopes.iter().rev() {
            if let Some(sym) = scope.bindings.get(name) {
                return Some(sym);
            }
        }
        None
    }

    /// Like [`Self::lookup`] but only within the innermost scope (used to check for
    /// shadowing-as-duplicate within a single parameter list or block).
    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.scopes.last().and_then(|s| s.bindings.get(name))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::UniqueStringArena;

    fn var(name: &str, ty: Type) -> Symbol {
        let mut names: UniqueStringArena<Ident> = UniqueStringArena::new();
        Symbol {
            name: name.to_string(),
            handle: names.alloc(name),
            ty,
            kind: SymbolKind::Variable,
            qualifier: MemoryQualifier::Default,
            modifier: FunctionModifier::Default,
        }
    }

    #[test]
    fn innermost_binding_shadows_outer() {
        let mut table = SymbolTable::new();
        table.add(var("n", Type::Int));
        table.push();
        table.add(var("n", Type::String));
        assert_eq!(table.lookup("n").unwrap().ty, Type::String);
        table.pop();
        assert_eq!(table.lookup("n").unwrap().ty, Type::Int);
    }

    #[test]
    fn duplicate_name_in_same_scope_is_rejected() {
        let mut table = SymbolTable::new();
        assert!(table.add(var("n", Type::Int)));
        assert!(!table.add(var("n", Type::Long)));
    }

    #[test]
    fn function_returning_string_is_implicitly_shared() {
        let f = Symbol {
            ty: Type::Function {
                ret: Box::new(Type::String),
                params: vec![],
            },
            kind: SymbolKind::Function,
            ..var("f", Type::Nil)
        };
        assert_eq!(f.effective_modifier(), FunctionModifier::Shared);
    }

    #[test]
    fn symbols_with_the_same_spelling_share_an_interned_handle() {
        let mut names: UniqueStringArena<Ident> = UniqueStringArena::new();
        let a = names.alloc("n");
        let b = names.alloc("n");
        assert_eq!(a, b);
    }
}
