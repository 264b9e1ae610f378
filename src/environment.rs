use crate::error::{RuntimeError, RuntimeResult};
use crate::value::Value;
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared handle to a scope.  Closures hold clones of this to keep their
/// defining scope alive after the frame that created it has returned.
pub type EnvRef = Rc<RefCell<Environment>>;

/// One lexical scope: its own bindings plus the enclosing scope, if any.
/// The scope with no parent is the global one.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<EnvRef>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: EnvRef) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Wraps a fresh child of `enclosing` in a shared handle.
    pub fn child_of(enclosing: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(enclosing))))
    }

    /// Inserts or overwrites `name` in this scope only.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn get(&self, name: &str, line: usize) -> RuntimeResult<Value> {
        if let Some(value) = self.values.get(name) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name, line)
        } else {
            Err(RuntimeError::undefined_variable(name, line))
        }
    }

    /// Updates the nearest scope that owns `name`; never creates a binding.
    pub fn assign(&mut self, name: &str, value: Value, line: usize) -> RuntimeResult<()> {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value, line)
        } else {
            Err(RuntimeError::undefined_variable(name, line))
        }
    }
}

/// Walks exactly `hops` parent links up from `env`.
pub fn ancestor(env: &EnvRef, hops: usize) -> RuntimeResult<EnvRef> {
    let mut current = Rc::clone(env);

    for _ in 0..hops {
        let parent = current.borrow().enclosing.clone().ok_or_else(|| {
            RuntimeError::internal(format!(
                "scope chain is shorter than resolved distance {}",
                hops
            ))
        })?;
        current = parent;
    }

    Ok(current)
}

/// Reads `name` from the scope exactly `hops` links up, without searching
/// further.
pub fn get_at(env: &EnvRef, hops: usize, name: &str) -> RuntimeResult<Value> {
    debug!("get_at: '{}' at distance {}", name, hops);

    let scope = ancestor(env, hops)?;
    let value = scope.borrow().values.get(name).cloned();

    value.ok_or_else(|| {
        RuntimeError::internal(format!(
            "resolved variable '{}' missing at distance {}",
            name, hops
        ))
    })
}

/// Writes `name` in the scope exactly `hops` links up.
pub fn assign_at(env: &EnvRef, hops: usize, name: &str, value: Value) -> RuntimeResult<()> {
    debug!("assign_at: '{}' at distance {}", name, hops);

    let scope = ancestor(env, hops)?;
    let mut scope = scope.borrow_mut();

    match scope.values.get_mut(name) {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(RuntimeError::internal(format!(
            "resolved variable '{}' missing at distance {}",
            name, hops
        ))),
    }
}
