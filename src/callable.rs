//! Callable objects and the class/instance model.
//!
//! Three things can be called: host-provided [`NativeFunction`]s, user
//! [`LoxFunction`]s (plain functions and methods bound to an instance), and
//! classes, where calling constructs a new [`LoxInstance`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::ast::{FunctionDecl, Name};
use crate::environment::{self, EnvRef, Environment};
use crate::error::{RuntimeError, RuntimeResult};
use crate::interpreter::{Completion, Interpreter};
use crate::value::Value;

/// Anything a call expression can invoke.
pub trait Callable {
    /// Number of arguments the callee expects.
    fn arity(&self) -> usize;

    /// Invokes the callee.  `args.len() == self.arity()` has already been
    /// checked by the caller; `line` is the call site.
    fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
        line: usize,
    ) -> RuntimeResult<Value>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Native functions
// ─────────────────────────────────────────────────────────────────────────────

pub type NativeFn = fn(&[Value]) -> Result<Value, String>;

/// A function implemented by the host.
pub struct NativeFunction {
    name: &'static str,
    arity: usize,
    func: NativeFn,
}

impl NativeFunction {
    pub fn new(name: &'static str, arity: usize, func: NativeFn) -> Self {
        Self { name, arity, func }
    }

    pub fn name(&self) -> &str {
        self.name
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.name)
    }
}

impl Callable for NativeFunction {
    fn arity(&self) -> usize {
        self.arity
    }

    fn call(&self, _: &mut Interpreter, args: Vec<Value>, line: usize) -> RuntimeResult<Value> {
        debug!("Calling native function '{}'", self.name);

        (self.func)(&args).map_err(|message| RuntimeError::Native {
            name: self.name.to_string(),
            message,
            line,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User functions and bound methods
// ─────────────────────────────────────────────────────────────────────────────

/// A user-defined function paired with the scope it was declared in.
///
/// A function declared in a local scope is also bound in that scope, so the
/// scope and the function keep each other alive.  Such scopes are only
/// reclaimed when the process exits.
pub struct LoxFunction {
    declaration: Rc<FunctionDecl>,
    closure: EnvRef,
    is_initializer: bool,
}

impl LoxFunction {
    pub fn new(declaration: Rc<FunctionDecl>, closure: EnvRef, is_initializer: bool) -> Self {
        Self {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    /// Returns a copy of this method whose closure additionally binds
    /// `this` to `instance`.  The original method is left untouched.
    pub fn bind(&self, instance: Rc<LoxInstance>) -> LoxFunction {
        let env = Environment::child_of(&self.closure);
        env.borrow_mut().define("this", Value::Instance(instance));

        LoxFunction {
            declaration: Rc::clone(&self.declaration),
            closure: env,
            is_initializer: self.is_initializer,
        }
    }

    fn bound_this(&self) -> RuntimeResult<Value> {
        environment::get_at(&self.closure, 0, "this")
    }
}

impl fmt::Debug for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name())
    }
}

impl Callable for LoxFunction {
    fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
        _line: usize,
    ) -> RuntimeResult<Value> {
        debug!("Calling user-defined function '{}'", self.name());

        // Parent is the closure, not the caller's scope.
        let env = Environment::child_of(&self.closure);
        for (param, arg) in self.declaration.params.iter().zip(args) {
            env.borrow_mut().define(&param.lexeme, arg);
        }

        let completion = interpreter.execute_block(&self.declaration.body, env)?;

        if self.is_initializer {
            return self.bound_this();
        }

        match completion {
            Completion::Return(value) => Ok(value),
            Completion::Normal => Ok(Value::Nil),
            Completion::Break | Completion::Continue => Err(RuntimeError::internal(format!(
                "loop control escaped function '{}'",
                self.name()
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Classes
// ─────────────────────────────────────────────────────────────────────────────

pub struct LoxClass {
    name: String,
    superclass: Option<Rc<LoxClass>>,
    methods: HashMap<String, Rc<LoxFunction>>,
}

impl LoxClass {
    pub fn new(
        name: String,
        superclass: Option<Rc<LoxClass>>,
        methods: HashMap<String, Rc<LoxFunction>>,
    ) -> Self {
        Self {
            name,
            superclass,
            methods,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Own methods first, then the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        match self.methods.get(name) {
            Some(method) => Some(Rc::clone(method)),
            None => self
                .superclass
                .as_ref()
                .and_then(|superclass| superclass.find_method(name)),
        }
    }
}

impl fmt::Debug for LoxClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class {}>", self.name)
    }
}

impl Callable for Rc<LoxClass> {
    fn arity(&self) -> usize {
        self.find_method("init").map_or(0, |init| init.arity())
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
        line: usize,
    ) -> RuntimeResult<Value> {
        debug!("Instantiating class '{}'", self.name);

        let instance = Rc::new(LoxInstance::new(Rc::clone(self)));

        if let Some(init) = self.find_method("init") {
            init.bind(Rc::clone(&instance))
                .call(interpreter, args, line)?;
        }

        Ok(Value::Instance(instance))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Instances
// ─────────────────────────────────────────────────────────────────────────────

pub struct LoxInstance {
    class: Rc<LoxClass>,
    fields: RefCell<HashMap<String, Value>>,
}

impl LoxInstance {
    pub fn new(class: Rc<LoxClass>) -> Self {
        Self {
            class,
            fields: RefCell::new(HashMap::new()),
        }
    }

    pub fn class(&self) -> &Rc<LoxClass> {
        &self.class
    }

    /// Field first, then a method bound to this instance.
    pub fn get(self: &Rc<Self>, name: &Name) -> RuntimeResult<Value> {
        if let Some(value) = self.fields.borrow().get(&name.lexeme) {
            return Ok(value.clone());
        }

        match self.class.find_method(&name.lexeme) {
            Some(method) => Ok(Value::Function(Rc::new(method.bind(Rc::clone(self))))),
            None => Err(RuntimeError::UndefinedProperty {
                name: name.lexeme.clone(),
                line: name.line,
            }),
        }
    }

    /// Fields are created on first assignment.
    pub fn set(&self, name: &Name, value: Value) {
        self.fields.borrow_mut().insert(name.lexeme.clone(), value);
    }
}

impl fmt::Debug for LoxInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} instance>", self.class.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declaration(name: &str) -> Rc<FunctionDecl> {
        Rc::new(FunctionDecl {
            name: Name::new(name, 1),
            params: Vec::new(),
            body: Vec::new(),
        })
    }

    #[test]
    fn scope_binding_its_own_closure_stays_alive() {
        let global: EnvRef = Rc::new(RefCell::new(Environment::new()));
        let scope = Environment::child_of(&global);

        let function = LoxFunction::new(declaration("f"), Rc::clone(&scope), false);
        scope
            .borrow_mut()
            .define("f", Value::Function(Rc::new(function)));

        let weak = Rc::downgrade(&scope);
        drop(scope);

        assert!(weak.upgrade().is_some());
    }

    #[test]
    fn scope_without_self_reference_is_released() {
        let global: EnvRef = Rc::new(RefCell::new(Environment::new()));
        let scope = Environment::child_of(&global);

        let function = LoxFunction::new(declaration("f"), Rc::clone(&scope), false);
        global
            .borrow_mut()
            .define("f", Value::Function(Rc::new(function)));
        global.borrow_mut().define("f", Value::Nil);

        let weak = Rc::downgrade(&scope);
        drop(scope);

        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn class_arity_comes_from_inherited_init() {
        let global: EnvRef = Rc::new(RefCell::new(Environment::new()));
        let init = Rc::new(FunctionDecl {
            name: Name::new("init", 1),
            params: vec![Name::new("a", 1), Name::new("b", 1)],
            body: Vec::new(),
        });

        let mut methods = HashMap::new();
        methods.insert(
            "init".to_string(),
            Rc::new(LoxFunction::new(init, Rc::clone(&global), true)),
        );
        let base = Rc::new(LoxClass::new("Base".to_string(), None, methods));
        let derived = Rc::new(LoxClass::new(
            "Derived".to_string(),
            Some(Rc::clone(&base)),
            HashMap::new(),
        ));

        assert_eq!(derived.arity(), 2);
        assert!(derived.find_method("missing").is_none());
    }
}
