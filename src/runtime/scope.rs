use crate::lang::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

struct Frame {
    vars: HashMap<String, Value>,
    enclosing: Option<Scope>,
}

/// A lexical scope. Cloning shares the same frame, so writes through one
/// handle are visible through every other, including nested VMs and
/// closures that captured it.
#[derive(Clone)]
pub struct Scope(Rc<RefCell<Frame>>);

impl Scope {
    /// A root scope with no parent.
    pub fn global() -> Self {
        Scope(Rc::new(RefCell::new(Frame {
            vars: HashMap::new(),
            enclosing: None,
        })))
    }

    pub fn child(&self) -> Self {
        Scope(Rc::new(RefCell::new(Frame {
            vars: HashMap::new(),
            enclosing: Some(self.clone()),
        })))
    }

    pub fn enclosing(&self) -> Option<Scope> {
        self.0.borrow().enclosing.clone()
    }

    /// Declares `name` in this scope, shadowing any outer declaration.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.borrow_mut().vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let frame = self.0.borrow();
        match frame.vars.get(name) {
            Some(value) => Some(value.clone()),
            None => frame.enclosing.as_ref().and_then(|outer| outer.get(name)),
        }
    }

    /// Assigns to the nearest scope that declares `name`, or declares it
    /// here if no scope does.
    pub fn assign(&self, name: &str, value: Value) {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            {
                let mut frame = scope.0.borrow_mut();
                if let Some(slot) = frame.vars.get_mut(name) {
                    *slot = value;
                    return;
                }
            }
            current = scope.enclosing();
        }
        self.define(name, value);
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // closures capture scopes that hold the closures, so never recurse
        let frame = self.0.borrow();
        let mut names: Vec<&String> = frame.vars.keys().collect();
        names.sort();
        f.debug_struct("Scope")
            .field("vars", &names)
            .field("has_enclosing", &frame.enclosing.is_some())
            .finish()
    }
}
