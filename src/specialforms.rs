//! Special-form table.
//!
//! A combination whose operator is a symbol registered here is dispatched to
//! the handler with its operands unevaluated. Everything else is an
//! application. The table is per interpreter, so hosts can add or replace
//! forms without touching the evaluator.
//!
//! ## Core Forms
//!
//! `quote`, `set!`, `define`, `if`, `lambda` and `begin` are implemented
//! directly by the evaluator, as are `and` and `or`, which must hand back
//! the deciding operand's value without evaluating it a second time.
//!
//! ## Derived Forms
//!
//! `cond`, `let`, `let*`, `letrec`, `unless` and `when` are rewritten by
//! [`crate::desugar`] and the rewritten expression is evaluated in the same
//! frame.
//!
//! ## Adding New Forms
//!
//! 1. **Implement the handler** following the [`SpecialForm`] signature
//! 2. **Register it** with [`crate::Interpreter::register_special_form`]
//! 3. **Evaluate sub-expressions** with [`crate::Interpreter::eval_expr`],
//!    passing `depth` through unchanged

use crate::Error;
use crate::ast::{Expr, Value};
use crate::desugar;
use crate::environment::FrameId;
use crate::evaluator::{
    Interpreter, eval_and, eval_begin, eval_define, eval_if, eval_lambda, eval_or, eval_quote,
    eval_set,
};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Handler for a special form: receives the unevaluated operands, the active
/// frame and the current evaluation depth.
pub type SpecialForm = fn(&mut Interpreter, &[Expr], FrameId, usize) -> Result<Value, Error>;

/// Generate a handler that desugars its operands and evaluates the result
macro_rules! derived_form {
    ($name:ident, $operands:ident => $rewrite:expr) => {
        fn $name(
            interp: &mut Interpreter,
            $operands: &[Expr],
            env: FrameId,
            depth: usize,
        ) -> Result<Value, Error> {
            let rewritten: Expr = $rewrite?;
            trace!(form = %rewritten, "desugared");
            interp.eval_expr(&rewritten, env, depth)
        }
    };
}

derived_form!(eval_cond, operands => desugar::cond(operands));
derived_form!(eval_let, operands => desugar::let_form(operands));
derived_form!(eval_let_star, operands => desugar::let_star(operands));
derived_form!(eval_letrec, operands => desugar::letrec(operands));
derived_form!(eval_unless, operands => desugar::unless(operands));
derived_form!(eval_when, operands => desugar::when(operands));

/// Forms every interpreter starts with
const STANDARD_FORMS: &[(&str, SpecialForm)] = &[
    ("quote", eval_quote),
    ("set!", eval_set),
    ("define", eval_define),
    ("if", eval_if),
    ("lambda", eval_lambda),
    ("begin", eval_begin),
    ("cond", eval_cond),
    ("and", eval_and),
    ("or", eval_or),
    ("let", eval_let),
    ("let*", eval_let_star),
    ("letrec", eval_letrec),
    ("unless", eval_unless),
    ("when", eval_when),
];

/// Mapping from operator symbol to handler
#[derive(Clone, Default)]
pub struct SpecialFormTable {
    forms: HashMap<String, SpecialForm>,
}

impl std::fmt::Debug for SpecialFormTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.tags()).finish()
    }
}

impl SpecialFormTable {
    /// An empty table; every combination is then an application
    pub fn new() -> Self {
        SpecialFormTable {
            forms: HashMap::new(),
        }
    }

    /// The core and derived forms
    pub fn standard() -> Self {
        let mut table = Self::new();
        for &(tag, handler) in STANDARD_FORMS {
            table.register(tag, handler);
        }
        debug!(count = table.forms.len(), "registered standard special forms");
        table
    }

    /// Add or replace a handler, returning the one it displaced
    pub fn register(&mut self, tag: &str, handler: SpecialForm) -> Option<SpecialForm> {
        self.forms.insert(tag.to_owned(), handler)
    }

    pub fn get(&self, tag: &str) -> Option<SpecialForm> {
        self.forms.get(tag).copied()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.forms.contains_key(tag)
    }

    /// Registered tags in sorted order
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.forms.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}
