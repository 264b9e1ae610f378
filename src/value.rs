use std::fmt;
use std::rc::Rc;

use crate::callable::{Callable, LoxClass, LoxFunction, LoxInstance, NativeFunction};

/// A run-time value.
///
/// Primitives are held inline; functions, classes and instances are shared
/// objects compared by identity.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    NativeFunction(Rc<NativeFunction>),
    /// User function, or a method bound to an instance.
    Function(Rc<LoxFunction>),
    Class(Rc<LoxClass>),
    Instance(Rc<LoxInstance>),
}

impl Value {
    /// `nil` and `false` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Language-level `==`: primitives by value, objects by identity,
    /// different kinds never equal.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::NativeFunction(a), Value::NativeFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// The callable capability, if this value has it.
    pub fn as_callable(&self) -> Option<&dyn Callable> {
        match self {
            Value::NativeFunction(f) => Some(&**f as &dyn Callable),
            Value::Function(f) => Some(&**f as &dyn Callable),
            Value::Class(c) => Some(c as &dyn Callable),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

/// Integral numbers print without a fractional part; everything else uses
/// the shortest representation that round-trips.  `-0` keeps its sign.
pub fn format_number(n: f64) -> String {
    let negative_zero = n == 0.0 && n.is_sign_negative();

    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 && !negative_zero {
        let mut buf = itoa::Buffer::new();
        buf.format(n as i64).to_string()
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),

            Value::Bool(b) => write!(f, "{}", b),

            Value::Number(n) => f.write_str(&format_number(*n)),

            Value::String(s) => write!(f, "{}", s),

            Value::NativeFunction(native) => write!(f, "<native fn {}>", native.name()),

            Value::Function(function) => write!(f, "<fn {}>", function.name()),

            Value::Class(class) => write!(f, "{}", class.name()),

            Value::Instance(instance) => write!(f, "{} instance", instance.class().name()),
        }
    }
}
