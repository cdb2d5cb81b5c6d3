// ABOUTME: Scope chain holding variable and constant bindings during evaluation

use crate::error::RuntimeError;
use crate::value::Value;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// A binding frame with two axes: `parent` links block scopes to their
/// enclosing scope, while `global` always points at the program root. A
/// function-call scope deliberately has no parent, so a callee can never see
/// its caller's locals; globals stay reachable through the second axis.
#[derive(Debug)]
pub struct Scope {
    parent: Option<Rc<Scope>>,
    global: Weak<Scope>,
    variables: RefCell<IndexMap<String, Value>>,
    constants: RefCell<IndexMap<String, Value>>,
}

impl Scope {
    /// Creates the program-wide root scope. Its `global` pointer refers to
    /// itself.
    pub fn global() -> Rc<Self> {
        Rc::new_cyclic(|this| Scope {
            parent: None,
            global: this.clone(),
            variables: RefCell::new(IndexMap::new()),
            constants: RefCell::new(IndexMap::new()),
        })
    }

    /// Child scope for a block: enclosing bindings stay visible.
    pub fn block(enclosing: &Rc<Scope>) -> Rc<Self> {
        Rc::new(Scope {
            parent: Some(enclosing.clone()),
            global: enclosing.global.clone(),
            variables: RefCell::new(IndexMap::new()),
            constants: RefCell::new(IndexMap::new()),
        })
    }

    /// Scope for a function invocation: no parent, so the caller's locals are
    /// not visible, but the global root still is.
    pub fn call(enclosing: &Rc<Scope>) -> Rc<Self> {
        Rc::new(Scope {
            parent: None,
            global: enclosing.global.clone(),
            variables: RefCell::new(IndexMap::new()),
            constants: RefCell::new(IndexMap::new()),
        })
    }

    fn global_scope(&self) -> Rc<Scope> {
        self.global.upgrade().expect("global scope outlives evaluation")
    }

    /// Adds a variable binding in this scope. The name must be fresh across
    /// both tables.
    pub fn declare_variable(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        if self.has_local(name) {
            return Err(RuntimeError::Redeclaration(name.to_string()));
        }
        self.variables.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }

    /// Adds a constant binding in this scope. Constants are insertion-only.
    pub fn declare_constant(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        if self.has_local(name) {
            return Err(RuntimeError::Redeclaration(name.to_string()));
        }
        self.constants.borrow_mut().insert(name.to_string(), value);
        Ok(())
    }

    /// True when `name` is bound in this scope's own tables.
    pub fn has_local(&self, name: &str) -> bool {
        self.variables.borrow().contains_key(name) || self.constants.borrow().contains_key(name)
    }

    /// This scope's own variable binding for `name`, ignoring the chain.
    pub fn local_variable(&self, name: &str) -> Option<Value> {
        self.variables.borrow().get(name).cloned()
    }

    /// Resolves `name`: own variables, own constants, then the parent chain;
    /// a scope without a parent falls back to the global tables. The fallback
    /// is what lets a call scope (parent-less but not the root) reach
    /// globally-declared bindings.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.variables.borrow().get(name) {
            return Some(value.clone());
        }
        if let Some(value) = self.constants.borrow().get(name) {
            return Some(value.clone());
        }
        match &self.parent {
            Some(parent) => parent.lookup(name),
            None => {
                let global = self.global_scope();
                let found = global.variables.borrow().get(name).cloned();
                found.or_else(|| global.constants.borrow().get(name).cloned())
            }
        }
    }

    /// Resolves `name` against constants only, walking the parent chain
    /// without the global fallback. Used for the implicit `self` binding.
    pub fn lookup_constant(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.constants.borrow().get(name) {
            return Some(value.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.lookup_constant(name))
    }

    /// Rebinds an existing variable. The chain is searched scope by scope,
    /// variables before constants: a constant hit anywhere on the chain is a
    /// constant-assignment error even when a global variable of the same
    /// name exists behind it.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        if self.variables.borrow().contains_key(name) {
            self.variables.borrow_mut().insert(name.to_string(), value);
            return Ok(());
        }
        if self.constants.borrow().contains_key(name) {
            return Err(RuntimeError::ConstantAssignment(name.to_string()));
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => {
                let global = self.global_scope();
                if global.variables.borrow().contains_key(name) {
                    global.variables.borrow_mut().insert(name.to_string(), value);
                    Ok(())
                } else if global.constants.borrow().contains_key(name) {
                    Err(RuntimeError::ConstantAssignment(name.to_string()))
                } else {
                    Err(RuntimeError::UnresolvedIdentifier(name.to_string()))
                }
            }
        }
    }

    /// Snapshot of this scope's variables in insertion order.
    pub fn variable_bindings(&self) -> Vec<(String, Value)> {
        self.variables
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Snapshot of this scope's constants in insertion order.
    pub fn constant_bindings(&self) -> Vec<(String, Value)> {
        self.constants
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}
