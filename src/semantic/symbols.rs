use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// A variable symbol. Created once per declaration and never mutated;
/// redeclaring a name creates a new symbol that shadows the old one.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
    pub intrinsic: bool,
}

/// Compile-time scopes used by the binder.
///
/// Variables and types live in separate namespaces. Each scope is a stack of
/// definitions and lookup scans innermost scope first, latest definition
/// first, so the last definition of a name wins.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<Vec<SymbolId>>,
    type_scopes: Vec<Vec<(String, Type)>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
            scopes: vec![Vec::new()],
            type_scopes: vec![Vec::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
        self.type_scopes.push(Vec::new());
    }

    pub fn pop_scope(&mut self) {
        // the global scope is never popped
        if self.scopes.len() > 1 {
            self.scopes.pop();
            self.type_scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Defines a symbol in the current scope.
    pub fn define(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(id);
        }
        id
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .copied()
            .find(|id| self.get(*id).name == name)
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn define_type(&mut self, name: &str, ty: Type) {
        if let Some(scope) = self.type_scopes.last_mut() {
            scope.push((name.to_string(), ty));
        }
    }

    pub fn lookup_type(&self, name: &str) -> Option<&Type> {
        self.type_scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(n, _)| n == name)
            .map(|(_, ty)| ty)
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

    fn var(name: &str, ty: Type) -> Symbol {
        Symbol {
            name: name.to_string(),
            ty,
            mutable: false,
            intrinsic: false,
        }
    }

    #[test]
    fn test_innermost_and_latest_wins() {
        let mut table = SymbolTable::new();
        let outer = table.define(var("x", Type::INT));
        table.push_scope();
        assert_eq!(table.lookup("x"), Some(outer));
        let inner = table.define(var("x", Type::STRING));
        let again = table.define(var("x", Type::BOOL));
        assert_ne!(inner, again);
        assert_eq!(table.lookup("x"), Some(again));
        table.pop_scope();
        assert_eq!(table.lookup("x"), Some(outer));
        assert_eq!(table.get(outer).ty, Type::INT);
    }

    #[test]
    fn test_type_namespace_is_separate() {
        let mut table = SymbolTable::new();
        table.define_type("x", Type::FLOAT);
        assert_eq!(table.lookup("x"), None);
        assert_eq!(table.lookup_type("x"), Some(&Type::FLOAT));
        table.push_scope();
        table.define_type("x", Type::CHAR);
        assert_eq!(table.lookup_type("x"), Some(&Type::CHAR));
        table.pop_scope();
        assert_eq!(table.lookup_type("x"), Some(&Type::FLOAT));
    }

    #[test]
    fn test_global_scope_survives_pop() {
        let mut table = SymbolTable::new();
        table.pop_scope();
        table.define(var("g", Type::Any));
        assert_eq!(table.depth(), 1);
        assert!(table.lookup("g").is_some());
    }
}
