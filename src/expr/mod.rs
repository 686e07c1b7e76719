//! Expression engine
//!
//! User formulas are plain text. They go through two rewrite passes
//! (`normalize`), are parsed against a function namespace into an AST
//! (`parser`), and are evaluated with a small per-call environment
//! (`expression`). Curve-derived operators live in `calculus`.

pub mod builtins;
pub mod calculus;
pub mod expression;
pub mod normalize;
pub mod parser;

use thiserror::Error;

pub use builtins::{Builtin, FactorialCache};
pub use calculus::{central_difference, integrate, romberg, second_difference};
pub use expression::{Bindings, CurveLookup, Environment, EvalContext, Expression, NoCurves};
pub use normalize::{expand_readability, normalize, normalize_spacing};
pub use parser::{BinaryOp, Callable, CurveOp, FunctionTable, Node, UnaryOp, Var, parse};

/// Variable names a formula may reference.
pub const VARIABLES: [&str; 6] = ["x", "y", "t", "h", "a", "n"];

/// Runtime value of an expression node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Number(f64),
    Boolean(bool),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::Boolean(_) => ValueKind::Boolean,
        }
    }

    pub fn as_number(&self) -> Result<f64, EvalError> {
        match *self {
            Value::Number(v) => Ok(v),
            Value::Boolean(_) => Err(EvalError::TypeMismatch {
                expected: ValueKind::Number,
                found: ValueKind::Boolean,
            }),
        }
    }

    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match *self {
            Value::Boolean(v) => Ok(v),
            Value::Number(_) => Err(EvalError::TypeMismatch {
                expected: ValueKind::Boolean,
                found: ValueKind::Number,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Number,
    Boolean,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::Number => f.write_str("number"),
            ValueKind::Boolean => f.write_str("boolean"),
        }
    }
}

/// A formula failed to parse or referenced an unknown name
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot compile `{text}`: {message}")]
pub struct CompileError {
    /// Normalized text that was handed to the parser
    pub text: String,
    pub message: String,
}

/// Evaluation failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("type mismatch: expected {expected}, got {found}")]
    TypeMismatch { expected: ValueKind, found: ValueKind },
    #[error("variable `{0}` is not bound")]
    UnboundVariable(String),
    #[error("expression `{0}` is not compiled")]
    NotCompiled(String),
    #[error("{name}() argument {position} must be a number")]
    ArgumentType { name: String, position: usize },
    #[error("{0}() range is too long")]
    SeriesTooLong(String),
    #[error("{0}() nests too deeply")]
    RecursionLimit(String),
}

impl EvalError {
    /// Fatal errors halt a running simulation until the next rebuild
    pub fn is_fatal(&self) -> bool {
        matches!(self, EvalError::TypeMismatch { .. })
    }
}
