use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use chrono::Utc;
use log::{debug, info};

use crate::ast::{
    BinaryOp, Expr, ExprId, FunctionDecl, LiteralValue, LogicalOp, Name, Stmt, UnaryOp,
};
use crate::callable::{LoxClass, LoxFunction, NativeFunction};
use crate::environment::{self, EnvRef, Environment};
use crate::error::{RuntimeError, RuntimeResult};
use crate::resolver::Locals;
use crate::value::Value;

/// How a statement finished.  `Return`, `Break` and `Continue` are
/// structured jumps routed to the nearest call or loop boundary; they are
/// never errors.
#[derive(Debug)]
pub enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// Tree-walking evaluator.  One instance owns one global scope, which
/// persists across successive `interpret` calls.
pub struct Interpreter {
    globals: EnvRef,
    environment: EnvRef,
    locals: Locals,
    out: Box<dyn Write>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Creates an Interpreter printing to stdout.
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }

    /// Creates an Interpreter whose `print` output goes to `out`, and
    /// defines native functions such as `clock`.
    pub fn with_output<W: Write + 'static>(out: W) -> Self {
        info!("Initializing Interpreter");

        let globals = Rc::new(RefCell::new(Environment::new()));

        debug!("Defining native function 'clock'");

        globals.borrow_mut().define(
            "clock",
            Value::NativeFunction(Rc::new(NativeFunction::new("clock", 0, |_args: &[Value]| {
                let millis = Utc::now().timestamp_millis();
                Ok(Value::Number(millis as f64 / 1000.0))
            }))),
        );

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: Locals::new(),
            out: Box::new(out),
        }
    }

    /// Runs a resolved program.  `locals` is kept so functions declared now
    /// still resolve correctly when called from later inputs.
    pub fn interpret(&mut self, statements: &[Stmt], locals: Locals) -> RuntimeResult<()> {
        debug!("Interpreting {} statements", statements.len());
        self.locals.merge(locals);

        for stmt in statements {
            match self.execute(stmt)? {
                Completion::Normal => {}
                stray => {
                    return Err(RuntimeError::internal(format!(
                        "{:?} escaped to top level",
                        stray
                    )));
                }
            }
        }

        info!("Interpretation completed successfully");
        Ok(())
    }

    /// Evaluates a bare expression and returns its printable form.  Nothing
    /// in a bare expression outlives it, so its annotations are dropped
    /// again afterwards.
    pub fn evaluate_to_string(&mut self, expr: &Expr, locals: Locals) -> RuntimeResult<String> {
        self.locals.merge(locals.clone());
        let result = self.evaluate(expr);
        self.locals.forget(&locals);

        Ok(result?.to_string())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt) -> RuntimeResult<Completion> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Completion::Normal)
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;
                writeln!(self.out, "{}", value)?;
                debug!("Printed value: {}", value);
                Ok(Completion::Normal)
            }

            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Defining variable '{}' = {}", name.lexeme, value);
                self.environment.borrow_mut().define(&name.lexeme, value);
                Ok(Completion::Normal)
            }

            Stmt::Block(statements) => {
                let env = Environment::child_of(&self.environment);
                self.execute_block(statements, env)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    self.execute(else_stmt)
                } else {
                    Ok(Completion::Normal)
                }
            }

            Stmt::While {
                condition,
                body,
                increment,
            } => self.execute_while(condition, body, increment.as_ref()),

            Stmt::Function(decl) => {
                debug!("Defining function '{}'", decl.name.lexeme);
                let function =
                    LoxFunction::new(Rc::clone(decl), Rc::clone(&self.environment), false);
                self.environment
                    .borrow_mut()
                    .define(&decl.name.lexeme, Value::Function(Rc::new(function)));
                Ok(Completion::Normal)
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                self.execute_class(name, superclass.as_ref(), methods)?;
                Ok(Completion::Normal)
            }

            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                debug!("Returning value: {}", value);
                Ok(Completion::Return(value))
            }

            Stmt::Break { .. } => Ok(Completion::Break),

            Stmt::Continue { .. } => Ok(Completion::Continue),
        }
    }

    /// Runs `statements` with `environment` as the current scope, restoring
    /// the previous scope however the block exits.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: EnvRef,
    ) -> RuntimeResult<Completion> {
        let previous = std::mem::replace(&mut self.environment, environment);
        let result = self.execute_statements(statements);
        self.environment = previous;
        result
    }

    fn execute_statements(&mut self, statements: &[Stmt]) -> RuntimeResult<Completion> {
        for stmt in statements {
            match self.execute(stmt)? {
                Completion::Normal => {}
                jump => return Ok(jump),
            }
        }
        Ok(Completion::Normal)
    }

    fn execute_while(
        &mut self,
        condition: &Expr,
        body: &Stmt,
        increment: Option<&Expr>,
    ) -> RuntimeResult<Completion> {
        debug!("Entering while loop");

        while self.evaluate(condition)?.is_truthy() {
            match self.execute(body)? {
                Completion::Normal | Completion::Continue => {}
                Completion::Break => break,
                ret @ Completion::Return(_) => return Ok(ret),
            }

            if let Some(increment) = increment {
                self.evaluate(increment)?;
            }
        }

        debug!("Exited while loop");
        Ok(Completion::Normal)
    }

    fn execute_class(
        &mut self,
        name: &Name,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
    ) -> RuntimeResult<()> {
        debug!("Defining class '{}'", name.lexeme);

        let superclass = match superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),
                _ => return Err(RuntimeError::NotAClass { line: expr.line() }),
            },
            None => None,
        };

        self.environment
            .borrow_mut()
            .define(&name.lexeme, Value::Nil);

        let enclosing = superclass.as_ref().map(|superclass| {
            let env = Environment::child_of(&self.environment);
            env.borrow_mut()
                .define("super", Value::Class(Rc::clone(superclass)));
            std::mem::replace(&mut self.environment, env)
        });

        let methods: HashMap<String, Rc<LoxFunction>> = methods
            .iter()
            .map(|method| {
                let is_initializer = method.name.lexeme == "init";
                let function = LoxFunction::new(
                    Rc::clone(method),
                    Rc::clone(&self.environment),
                    is_initializer,
                );
                (method.name.lexeme.clone(), Rc::new(function))
            })
            .collect();

        let class = LoxClass::new(name.lexeme.clone(), superclass, methods);

        if let Some(enclosing) = enclosing {
            self.environment = enclosing;
        }

        self.environment
            .borrow_mut()
            .assign(&name.lexeme, Value::Class(Rc::new(class)), name.line)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        match expr {
            Expr::Literal(literal) => Ok(evaluate_literal(literal)),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary {
                operator,
                line,
                right,
            } => self.evaluate_unary(*operator, *line, right),

            Expr::Binary {
                left,
                operator,
                line,
                right,
            } => self.evaluate_binary(left, *operator, *line, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left_val = self.evaluate(left)?;
                let short_circuit = match operator {
                    LogicalOp::Or => left_val.is_truthy(),
                    LogicalOp::And => !left_val.is_truthy(),
                };
                if short_circuit {
                    Ok(left_val)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Variable { id, name } => self.look_up_variable(*id, name),

            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value)?;
                match self.locals.depth(*id) {
                    Some(hops) => environment::assign_at(
                        &self.environment,
                        hops,
                        &name.lexeme,
                        value.clone(),
                    )?,
                    None => self
                        .globals
                        .borrow_mut()
                        .assign(&name.lexeme, value.clone(), name.line)?,
                }
                Ok(value)
            }

            Expr::Call {
                callee,
                paren_line,
                arguments,
            } => self.evaluate_call(callee, *paren_line, arguments),

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => instance.get(name),
                _ => Err(RuntimeError::NoProperties { line: name.line }),
            },

            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(RuntimeError::NoFields { line: name.line });
                };
                let value = self.evaluate(value)?;
                instance.set(name, value.clone());
                Ok(value)
            }

            Expr::This { id, keyword } => self.look_up_variable(*id, keyword),

            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method),
        }
    }

    fn evaluate_unary(
        &mut self,
        operator: UnaryOp,
        line: usize,
        right: &Expr,
    ) -> RuntimeResult<Value> {
        let right_val = self.evaluate(right)?;

        match operator {
            UnaryOp::Negate => match right_val {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(RuntimeError::type_mismatch("Operand must be a number.", line)),
            },
            UnaryOp::Not => Ok(Value::Bool(!right_val.is_truthy())),
        }
    }

    fn evaluate_binary(
        &mut self,
        left: &Expr,
        operator: BinaryOp,
        line: usize,
        right: &Expr,
    ) -> RuntimeResult<Value> {
        let left_val = self.evaluate(left)?;
        let right_val = self.evaluate(right)?;
        debug!(
            "Binary {:?}: left={}, right={}",
            operator, left_val, right_val
        );

        match operator {
            BinaryOp::Equal => return Ok(Value::Bool(left_val.equals(&right_val))),
            BinaryOp::NotEqual => return Ok(Value::Bool(!left_val.equals(&right_val))),
            BinaryOp::Add => {
                return match (left_val, right_val) {
                    (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                    (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
                    (Value::String(a), Value::Number(b)) => {
                        Ok(Value::String(a + &crate::value::format_number(b)))
                    }
                    _ => Err(RuntimeError::type_mismatch(
                        "Operands must be two numbers or the left operand must be a string.",
                        line,
                    )),
                };
            }
            _ => {}
        }

        let (Value::Number(a), Value::Number(b)) = (left_val, right_val) else {
            return Err(RuntimeError::type_mismatch("Operands must be numbers.", line));
        };

        let result = match operator {
            BinaryOp::Subtract => Value::Number(a - b),
            BinaryOp::Multiply => Value::Number(a * b),
            BinaryOp::Divide => {
                if b == 0.0 {
                    return Err(RuntimeError::DivisionByZero { line });
                }
                Value::Number(a / b)
            }
            BinaryOp::Greater => Value::Bool(a > b),
            BinaryOp::GreaterEqual => Value::Bool(a >= b),
            BinaryOp::Less => Value::Bool(a < b),
            BinaryOp::LessEqual => Value::Bool(a <= b),
            BinaryOp::Add | BinaryOp::Equal | BinaryOp::NotEqual => {
                return Err(RuntimeError::internal("operator handled above"));
            }
        };

        Ok(result)
    }

    fn evaluate_call(
        &mut self,
        callee: &Expr,
        paren_line: usize,
        arguments: &[Expr],
    ) -> RuntimeResult<Value> {
        let callee_val = self.evaluate(callee)?;

        let mut args = Vec::with_capacity(arguments.len());
        for arg in arguments {
            args.push(self.evaluate(arg)?);
        }

        let Some(callable) = callee_val.as_callable() else {
            return Err(RuntimeError::NotCallable { line: paren_line });
        };

        if args.len() != callable.arity() {
            return Err(RuntimeError::ArityMismatch {
                expected: callable.arity(),
                got: args.len(),
                line: paren_line,
            });
        }

        debug!("Calling {} with {} argument(s)", callee_val, args.len());
        callable.call(self, args, paren_line)
    }

    fn evaluate_super(
        &mut self,
        id: ExprId,
        keyword: &Name,
        method: &Name,
    ) -> RuntimeResult<Value> {
        let hops = self
            .locals
            .depth(id)
            .ok_or_else(|| RuntimeError::internal("unresolved 'super'"))?;

        let bound = environment::get_at(&self.environment, hops, &keyword.lexeme)?;
        let Value::Class(superclass) = bound else {
            return Err(RuntimeError::internal("'super' is not bound to a class"));
        };

        // `this` always lives one scope inside the one binding `super`.
        let this_hops = hops
            .checked_sub(1)
            .ok_or_else(|| RuntimeError::internal("'super' resolved without a 'this' scope"))?;
        let this = environment::get_at(&self.environment, this_hops, "this")?;
        let Value::Instance(instance) = this else {
            return Err(RuntimeError::internal("'this' is not bound to an instance"));
        };

        match superclass.find_method(&method.lexeme) {
            Some(found) => Ok(Value::Function(Rc::new(found.bind(instance)))),
            None => Err(RuntimeError::UndefinedProperty {
                name: method.lexeme.clone(),
                line: method.line,
            }),
        }
    }

    /// Resolved locals use the hop count; everything else must be a global.
    fn look_up_variable(&self, id: ExprId, name: &Name) -> RuntimeResult<Value> {
        match self.locals.depth(id) {
            Some(hops) => environment::get_at(&self.environment, hops, &name.lexeme),
            None => self.globals.borrow().get(&name.lexeme, name.line),
        }
    }
}

fn evaluate_literal(literal: &LiteralValue) -> Value {
    match literal {
        LiteralValue::Number(n) => Value::Number(*n),
        LiteralValue::Str(s) => Value::String(s.clone()),
        LiteralValue::True => Value::Bool(true),
        LiteralValue::False => Value::Bool(false),
        LiteralValue::Nil => Value::Nil,
    }
}
