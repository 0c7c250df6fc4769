//! Argument-evaluation strategies and thunk forcing

use super::Interpreter;
use crate::Error;
use crate::ast::{Expr, ParamMode, Procedure, Thunk, Value};
use crate::environment::{FrameId, LookupPolicy};
use std::rc::Rc;
use tracing::trace;

/// How operands of a compound procedure become arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Evaluate every operand left to right before application
    #[default]
    Strict,
    /// Delay every operand in an unmemoized thunk
    Lazy,
    /// Follow each parameter's declared mode
    Mixed,
}

impl Interpreter {
    /// Evaluate an expression and force the result
    pub(crate) fn actual_value(
        &mut self,
        expr: &Expr,
        env: FrameId,
        depth: usize,
    ) -> Result<Value, Error> {
        let value = self.eval_expr(expr, env, depth)?;
        self.force(value, depth)
    }

    /// Force a thunk until a non-thunk value remains. Non-thunks pass through.
    pub(crate) fn force(&mut self, value: Value, depth: usize) -> Result<Value, Error> {
        let Value::Thunk(thunk) = value else {
            return Ok(value);
        };

        if let Some(cached) = thunk.cached() {
            trace!(expr = %thunk.expr(), "thunk memo hit");
            return Ok(cached.clone());
        }

        trace!(expr = %thunk.expr(), memo = thunk.is_memoized(), "forcing thunk");
        let depth = self.descend(depth)?;
        let result = self.actual_value(thunk.expr(), thunk.env(), depth)?;
        if self.config.lookup == LookupPolicy::CheckUnassigned && result.is_unassigned() {
            return Err(Error::UnassignedVariable(thunk.expr().to_string()));
        }
        Ok(thunk.store(result))
    }

    /// Operands for a primitive: always forced, left to right
    pub(crate) fn strict_arguments(
        &mut self,
        operands: &[Expr],
        env: FrameId,
        depth: usize,
    ) -> Result<Vec<Value>, Error> {
        operands
            .iter()
            .map(|operand| self.actual_value(operand, env, depth))
            .collect()
    }

    /// Operands for a compound procedure, per the configured strategy
    pub(crate) fn procedure_arguments(
        &mut self,
        proc: &Procedure,
        operands: &[Expr],
        env: FrameId,
        depth: usize,
    ) -> Result<Vec<Value>, Error> {
        match self.config.strategy {
            Strategy::Strict => self.strict_arguments(operands, env, depth),
            Strategy::Lazy => Ok(operands
                .iter()
                .map(|operand| delay(operand, env, false))
                .collect()),
            Strategy::Mixed => {
                if proc.params.len() != operands.len() {
                    return Err(Error::arity_error(proc.params.len(), operands.len()));
                }
                proc.params
                    .iter()
                    .zip(operands)
                    .map(|(param, operand)| match param.mode {
                        ParamMode::Strict => self.actual_value(operand, env, depth),
                        ParamMode::Lazy => Ok(delay(operand, env, false)),
                        ParamMode::LazyMemo => Ok(delay(operand, env, true)),
                    })
                    .collect()
            }
        }
    }
}

fn delay(operand: &Expr, env: FrameId, memo: bool) -> Value {
    Value::Thunk(Rc::new(Thunk::new(operand.clone(), env, memo)))
}

#[cfg(all(test, feature = "scheme"))]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;
    use crate::evaluator::EvalConfig;
    use std::cell::Cell;

    fn interpreter_with_counter(strategy: Strategy) -> (Interpreter, Rc<Cell<i64>>) {
        let mut interp = Interpreter::new(EvalConfig::default().with_strategy(strategy));
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        interp.register_primitive("tick", move |_: &[Value]| {
            counter.set(counter.get() + 1);
            Ok(Value::Number(counter.get()))
        })
        .unwrap();
        (interp, calls)
    }

    #[test]
    fn test_strict_evaluates_unused_operands() {
        let (mut interp, calls) = interpreter_with_counter(Strategy::Strict);
        interp.eval_str("(define (ignore x) 0)").unwrap();
        assert_eq!(interp.eval_str("(ignore (tick))").unwrap(), val(0));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_lazy_skips_unused_operands() {
        let (mut interp, calls) = interpreter_with_counter(Strategy::Lazy);
        interp.eval_str("(define (ignore x) 0)").unwrap();
        assert_eq!(interp.eval_str("(ignore (tick))").unwrap(), val(0));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_lazy_thunks_rerun_on_every_force() {
        let (mut interp, calls) = interpreter_with_counter(Strategy::Lazy);
        interp.eval_str("(define (twice x) (+ x x))").unwrap();
        assert_eq!(interp.eval_str("(twice (tick))").unwrap(), val(3));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_mixed_modes_per_parameter() {
        let (mut interp, calls) = interpreter_with_counter(Strategy::Mixed);
        interp
            .eval_str("(define (twice-memo (x lazy-memo)) (+ x x))")
            .unwrap();
        assert_eq!(interp.eval_str("(twice-memo (tick))").unwrap(), val(2));
        assert_eq!(calls.get(), 1);

        interp.eval_str("(define (twice-lazy (x lazy)) (+ x x))").unwrap();
        assert_eq!(interp.eval_str("(twice-lazy (tick))").unwrap(), val(5));
        assert_eq!(calls.get(), 3);

        interp.eval_str("(define (skip (x lazy) y) y)").unwrap();
        assert_eq!(interp.eval_str("(skip (tick) 7)").unwrap(), val(7));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_mixed_rejects_unknown_modes_and_arity() {
        let (mut interp, _) = interpreter_with_counter(Strategy::Mixed);
        let err = interp.eval_str("(lambda ((x eager)) x)").unwrap_err();
        assert!(err.to_string().contains("unknown parameter mode"), "{err}");

        interp.eval_str("(define (f (x lazy)) x)").unwrap();
        assert_eq!(
            interp.eval_str("(f 1 2)").unwrap_err(),
            Error::arity_error(1, 2)
        );
    }

    #[test]
    fn test_lazy_errors_surface_at_forcing_site() {
        let (mut interp, _) = interpreter_with_counter(Strategy::Lazy);
        interp.eval_str("(define (id x) x)").unwrap();
        let err = interp.eval_str("(id (/ 1 0))").unwrap_err();
        assert!(err.to_string().contains("division by zero"), "{err}");
    }

    #[test]
    fn test_force_memoizes_first_value() {
        let (mut interp, calls) = interpreter_with_counter(Strategy::Mixed);
        let global = interp.global_frame();
        let thunk = delay(&crate::scheme::parse_scheme("(tick)").unwrap(), global, true);

        assert_eq!(interp.force(thunk.clone(), 0).unwrap(), val(1));
        assert_eq!(interp.force(thunk.clone(), 0).unwrap(), val(1));
        assert_eq!(calls.get(), 1);

        let Value::Thunk(inner) = &thunk else {
            panic!("expected thunk, got {thunk:?}");
        };
        assert_eq!(inner.cached(), Some(&val(1)));
    }

    #[test]
    fn test_forcing_unassigned_marker_fails() {
        let mut interp = Interpreter::new(EvalConfig::default().with_strategy(Strategy::Lazy));
        let err = interp.eval_str("(letrec ((a b) (b 1)) a)").unwrap_err();
        assert!(matches!(err, Error::UnassignedVariable(_)), "got {err:?}");
    }
}
