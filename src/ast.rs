//! Owned abstract syntax tree consumed by the resolver and the interpreter.
//!
//! Nodes own their data so a program can outlive the source buffer and the
//! token slice it was parsed from.  Function bodies sit behind an [`Rc`] so
//! every closure created from a declaration shares one copy of it.
//!
//! Nodes that name a variable (`Variable`, `Assign`, `This`, `Super`) carry an
//! [`ExprId`]: the key under which the resolver records how many scopes to
//! walk at run time.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_EXPR_ID: AtomicUsize = AtomicUsize::new(0);

/// Stable identity of a variable-referencing expression node.
///
/// Ids are unique for the whole process, so annotations from separate
/// parses (e.g. successive REPL inputs) can share one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(usize);

impl ExprId {
    pub fn fresh() -> Self {
        ExprId(NEXT_EXPR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// An identifier occurrence together with its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Name {
    pub lexeme: String,
    pub line: usize,
}

impl Name {
    pub fn new<S: Into<String>>(lexeme: S, line: usize) -> Self {
        Self {
            lexeme: lexeme.into(),
            line,
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lexeme)
    }
}

/// A literal constant that appears directly in the source code.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Number(f64),
    Str(String),
    True,
    False,
    Nil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Equal,
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Expression nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(LiteralValue),

    /// Parenthesised sub‑expression.
    Grouping(Box<Expr>),

    Unary {
        operator: UnaryOp,
        line: usize,
        right: Box<Expr>,
    },

    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        line: usize,
        right: Box<Expr>,
    },

    /// Short‑circuiting `and` / `or`.
    Logical {
        left: Box<Expr>,
        operator: LogicalOp,
        right: Box<Expr>,
    },

    Variable {
        id: ExprId,
        name: Name,
    },

    Assign {
        id: ExprId,
        name: Name,
        value: Box<Expr>,
    },

    Call {
        callee: Box<Expr>,
        /// Line of the closing `)`, used for error reporting.
        paren_line: usize,
        arguments: Vec<Expr>,
    },

    /// `object.name`
    Get {
        object: Box<Expr>,
        name: Name,
    },

    /// `object.name = value`
    Set {
        object: Box<Expr>,
        name: Name,
        value: Box<Expr>,
    },

    This {
        id: ExprId,
        keyword: Name,
    },

    /// `super.method`
    Super {
        id: ExprId,
        keyword: Name,
        method: Name,
    },
}

impl Expr {
    pub fn variable(name: Name) -> Self {
        Expr::Variable {
            id: ExprId::fresh(),
            name,
        }
    }

    /// Best-effort source line; literals carry none and report 0.
    pub fn line(&self) -> usize {
        match self {
            Expr::Literal(_) => 0,

            Expr::Grouping(expr) => expr.line(),

            Expr::Unary { line, .. } | Expr::Binary { line, .. } => *line,

            Expr::Logical { left, .. } => left.line(),

            Expr::Variable { name, .. }
            | Expr::Assign { name, .. }
            | Expr::Get { name, .. }
            | Expr::Set { name, .. } => name.line,

            Expr::Call { paren_line, .. } => *paren_line,

            Expr::This { keyword, .. } | Expr::Super { keyword, .. } => keyword.line,
        }
    }
}

/// A function or method declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Name,
    pub params: Vec<Name>,
    pub body: Vec<Stmt>,
}

/// Statement nodes.  A program is a `Vec<Stmt>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expression(Expr),

    Print(Expr),

    Var {
        name: Name,
        initializer: Option<Expr>,
    },

    Block(Vec<Stmt>),

    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// `while` loop; `for` loops desugar to this with an `increment` that
    /// runs after every iteration, including one cut short by `continue`.
    While {
        condition: Expr,
        body: Box<Stmt>,
        increment: Option<Expr>,
    },

    Function(Rc<FunctionDecl>),

    Return {
        keyword: Name,
        value: Option<Expr>,
    },

    Break {
        keyword: Name,
    },

    Continue {
        keyword: Name,
    },

    Class {
        name: Name,
        /// Always an `Expr::Variable` when present.
        superclass: Option<Expr>,
        methods: Vec<Rc<FunctionDecl>>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expr_ids_are_unique() {
        let a = Expr::variable(Name::new("a", 1));
        let b = Expr::variable(Name::new("a", 1));

        let (Expr::Variable { id: first, .. }, Expr::Variable { id: second, .. }) = (a, b) else {
            panic!("expected variables");
        };

        assert_ne!(first, second);
    }
}
