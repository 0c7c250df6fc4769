//! evalcore - an extensible eval/apply core for a small Lisp
//!
//! This crate evaluates already-parsed expression trees against a mutable,
//! lexically scoped environment. It provides the classic eval/apply loop, a
//! pluggable table of special forms, a desugaring layer for derived forms and
//! three interchangeable argument-evaluation strategies.
//!
//! ```scheme
//! (define (add a b) (+ a b))       ; procedure definition sugar
//! (let* ((x 3) (y (+ x 2))) y)     ; derived forms rewrite to lambda/if
//! (letrec ((even? ...) (odd? ...)) ; mutual recursion through one frame
//!   (even? 10))
//! ```
//!
//! ## Evaluation Strategies
//!
//! - **Strict**: operands are evaluated left to right before application.
//! - **Lazy**: operands become unmemoized thunks, forced when a primitive
//!   needs a concrete value or a conditional inspects truthiness.
//! - **Mixed**: each parameter declares its own mode, `x`, `(x lazy)` or
//!   `(x lazy-memo)`; memoizing thunks run their expression at most once.
//!
//! ## Truthiness
//!
//! Every value except `nil` and `false` is true, including `0` and `""`.
//!
//! ## Modules
//!
//! - `ast`: expression and value representations
//! - `environment`: frame arena with lookup/set!/define
//! - `specialforms`: the extensible special-form table
//! - `desugar`: pure rewrites of derived forms into core forms
//! - `evaluator`: the eval/apply core and strategy handling
//! - `primitives`: the default primitive library
//! - `scheme`: S-expression reader (feature `scheme`)

use thiserror::Error as ThisError;

/// Maximum parsing depth to prevent stack overflow in the reader
pub const MAX_PARSE_DEPTH: usize = 64;

/// Default maximum evaluation depth. Each procedure application and each
/// thunk force in progress counts one level; nesting within a body does not.
pub const DEFAULT_MAX_EVAL_DEPTH: usize = 2048;

/// Error types for the evaluator
#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum Error {
    /// Program text could not be read into an expression tree
    #[error("ParseError: {0}")]
    ParseError(String),
    /// Lookup or `set!` exhausted the frame chain
    #[error("Unbound variable: {0}")]
    UnboundVariable(String),
    /// Lookup found a binding that has not been assigned yet (letrec)
    #[error("Unassigned variable: {0}")]
    UnassignedVariable(String),
    /// A `cond` else clause appeared before the final clause
    #[error("Malformed cond: else clause is not last in {0}")]
    MalformedElseClause(String),
    /// A special form was given operands of the wrong shape
    #[error("Ill-formed special form: {0}")]
    SyntaxError(String),
    #[error("ArityError: procedure expected {expected} arguments but got {got}")]
    ArityError { expected: usize, got: usize },
    #[error("Type error: {0}")]
    TypeError(String),
    /// Failure raised inside a primitive, passed through unmodified
    #[error("{0}")]
    PrimitiveError(String),
    #[error("EvaluationError: {0}")]
    EvalError(String),
}

impl Error {
    /// Create an ArityError
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError { expected, got }
    }

    /// Create a SyntaxError naming the offending form
    pub(crate) fn syntax(form: &str, detail: impl std::fmt::Display) -> Self {
        Error::SyntaxError(format!("{form}: {detail}"))
    }
}

pub mod ast;
pub mod desugar;
pub mod environment;
pub mod evaluator;
pub mod primitives;
pub mod specialforms;

#[cfg(feature = "scheme")]
pub mod scheme;

pub use ast::{Expr, Value};
pub use environment::{FrameId, LookupPolicy};
pub use evaluator::{EvalConfig, Interpreter, Strategy};
