use crate::ast::{Atom, Expr, ParamMode, ParamSpec, Primitive, Procedure, Value};
use crate::environment::{FrameId, Frames, LookupPolicy};
use crate::primitives::default_primitives;
use crate::specialforms::{SpecialForm, SpecialFormTable};
use crate::{DEFAULT_MAX_EVAL_DEPTH, Error};
use std::rc::Rc;
use tracing::{debug, trace};

pub mod strategy;

pub use strategy::Strategy;

/// Remaining native stack below which evaluation switches to a fresh segment
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each additional stack segment
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Evaluator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// How operands become arguments at application time
    pub strategy: Strategy,
    /// Whether variable lookup rejects the `letrec` unassigned marker
    pub lookup: LookupPolicy,
    /// Maximum nesting of procedure applications and thunk forces before
    /// failing with `EvalError`
    pub max_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            strategy: Strategy::Strict,
            lookup: LookupPolicy::CheckUnassigned,
            max_depth: DEFAULT_MAX_EVAL_DEPTH,
        }
    }
}

impl EvalConfig {
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_lookup(mut self, lookup: LookupPolicy) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// The eval/apply core. Owns the frame arena and the special-form table.
pub struct Interpreter {
    frames: Frames,
    global: FrameId,
    forms: SpecialFormTable,
    config: EvalConfig,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(EvalConfig::default())
    }
}

impl Interpreter {
    /// Create an interpreter whose global frame holds the default primitives
    pub fn new(config: EvalConfig) -> Self {
        Self::with_primitives(config, default_primitives())
    }

    /// Create an interpreter whose global frame holds exactly `primitives`
    pub fn with_primitives<I>(config: EvalConfig, primitives: I) -> Self
    where
        I: IntoIterator<Item = Primitive>,
    {
        let mut frames = Frames::new();
        let global = frames.new_root(
            primitives
                .into_iter()
                .map(|prim| (prim.name.clone(), Value::Primitive(prim))),
        );
        debug!(?config, "created global frame");

        Interpreter {
            frames,
            global,
            forms: SpecialFormTable::standard(),
            config,
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn global_frame(&self) -> FrameId {
        self.global
    }

    pub fn frames(&self) -> &Frames {
        &self.frames
    }

    pub fn special_forms(&self) -> &SpecialFormTable {
        &self.forms
    }

    /// Register a native callable in the global frame.
    ///
    /// ```
    /// use evalcore::{Error, Interpreter, Value};
    ///
    /// let mut interp = Interpreter::default();
    /// interp.register_primitive("answer", |_args: &[Value]| -> Result<Value, Error> {
    ///     Ok(Value::Number(42))
    /// })?;
    /// assert_eq!(interp.lookup_global("answer").map(|v| v.is_applicable()), Ok(true));
    /// # Ok::<(), Error>(())
    /// ```
    pub fn register_primitive<F>(&mut self, name: &str, func: F) -> Result<(), Error>
    where
        F: Fn(&[Value]) -> Result<Value, Error> + 'static,
    {
        let primitive = Primitive::new(name, func);
        self.frames
            .define(self.global, name, Value::Primitive(primitive))
    }

    /// Add or replace a special form. Handlers receive the unevaluated
    /// operands, the active frame and the current depth; they evaluate
    /// sub-expressions through [`Interpreter::eval_expr`], passing the depth
    /// through unchanged.
    pub fn register_special_form(&mut self, tag: &str, handler: SpecialForm) {
        debug!(tag, "registering special form");
        self.forms.register(tag, handler);
    }

    pub fn define_global(&mut self, name: &str, value: Value) -> Result<(), Error> {
        self.frames.define(self.global, name, value)
    }

    pub fn lookup_global(&self, name: &str) -> Result<Value, Error> {
        self.frames.lookup(self.global, name, self.config.lookup)
    }

    /// Evaluate a top-level form in the global frame, forcing the result
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, Error> {
        self.eval_in(expr, self.global)
    }

    /// Evaluate in an arbitrary frame, forcing the result
    pub fn eval_in(&mut self, expr: &Expr, frame: FrameId) -> Result<Value, Error> {
        let value = self.eval_expr(expr, frame, 0)?;
        self.force(value, 0)
    }

    /// Evaluate top-level forms in order, returning the last forced value
    pub fn eval_program(&mut self, program: &[Expr]) -> Result<Value, Error> {
        let mut result = Value::Nil;
        for expr in program {
            result = self.eval(expr)?;
        }
        Ok(result)
    }

    /// Read and evaluate every form in `input`
    #[cfg(feature = "scheme")]
    pub fn eval_str(&mut self, input: &str) -> Result<Value, Error> {
        let program = crate::scheme::parse_program(input)?;
        self.eval_program(&program)
    }

    /// Apply an applicable value to already evaluated arguments
    pub fn apply(&mut self, procedure: &Value, args: Vec<Value>) -> Result<Value, Error> {
        match procedure {
            Value::Primitive(prim) => {
                let args = args
                    .into_iter()
                    .map(|arg| self.force(arg, 0))
                    .collect::<Result<Vec<_>, _>>()?;
                prim.call(&args)
            }
            Value::Procedure(proc) => {
                let result = self.apply_procedure(proc, args, 0)?;
                self.force(result, 0)
            }
            other => Err(Error::TypeError(format!(
                "Cannot apply non-procedure: {other}"
            ))),
        }
    }

    /// Evaluate an expression. The result may be an unforced thunk under the
    /// lazy and mixed strategies.
    ///
    /// `depth` counts the procedure applications and thunk forces in
    /// progress; plain nesting inside one body does not add to it.
    pub fn eval_expr(&mut self, expr: &Expr, env: FrameId, depth: usize) -> Result<Value, Error> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
            self.eval_expr_inner(expr, env, depth)
        })
    }

    fn eval_expr_inner(&mut self, expr: &Expr, env: FrameId, depth: usize) -> Result<Value, Error> {
        match expr {
            Expr::Atom(atom) => Ok(Value::from(atom)),

            Expr::Variable(name) => self.frames.lookup(env, name, self.config.lookup),

            Expr::Combination(_) => {
                let Some((operator, operands)) = expr.as_combination() else {
                    return Err(Error::syntax("application", "empty combination"));
                };

                if let Some(handler) = expr.operator_tag().and_then(|tag| self.forms.get(tag)) {
                    return handler(self, operands, env, depth);
                }

                self.eval_application(operator, operands, env, depth)
            }
        }
    }

    /// Depth for a procedure body or thunk about to run one level deeper
    fn descend(&self, depth: usize) -> Result<usize, Error> {
        if depth >= self.config.max_depth {
            return Err(Error::EvalError(format!(
                "Evaluation depth limit exceeded (max: {})",
                self.config.max_depth
            )));
        }
        Ok(depth + 1)
    }

    /// Evaluate each expression left to right, returning the last value, or
    /// nil for an empty sequence
    pub fn eval_sequence(
        &mut self,
        exprs: &[Expr],
        env: FrameId,
        depth: usize,
    ) -> Result<Value, Error> {
        let mut result = Value::Nil;
        for expr in exprs {
            result = self.eval_expr(expr, env, depth)?;
        }
        Ok(result)
    }

    fn eval_application(
        &mut self,
        operator: &Expr,
        operands: &[Expr],
        env: FrameId,
        depth: usize,
    ) -> Result<Value, Error> {
        let procedure = self.actual_value(operator, env, depth)?;

        match &procedure {
            Value::Primitive(prim) => {
                let args = self.strict_arguments(operands, env, depth)?;
                prim.call(&args)
            }
            Value::Procedure(proc) => {
                let args = self.procedure_arguments(proc, operands, env, depth)?;
                self.apply_procedure(proc, args, depth)
            }
            other => Err(Error::TypeError(format!(
                "Cannot apply non-procedure: {other}"
            ))),
        }
    }

    /// Bind arguments in a fresh child of the closure frame and run the body
    fn apply_procedure(
        &mut self,
        proc: &Rc<Procedure>,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Value, Error> {
        if proc.params.len() != args.len() {
            return Err(Error::arity_error(proc.params.len(), args.len()));
        }

        let depth = self.descend(depth)?;
        let bindings = proc
            .params
            .iter()
            .map(|param| param.name.clone())
            .zip(args);
        let frame = self.frames.extend(proc.closure, bindings)?;
        trace!(procedure = proc.name.as_deref().unwrap_or("lambda"), ?frame, depth, "apply");

        self.eval_sequence(&proc.body, frame, depth)
    }

    fn parse_params(&self, params: &Expr) -> Result<Vec<ParamSpec>, Error> {
        let items: &[Expr] = match params {
            Expr::Combination(items) => items,
            Expr::Atom(Atom::EmptyList) => &[],
            other => {
                return Err(Error::syntax(
                    "lambda",
                    format!("parameters must be a list, got {other}"),
                ));
            }
        };

        let mut specs: Vec<ParamSpec> = Vec::with_capacity(items.len());
        for item in items {
            let spec = match item {
                Expr::Variable(name) => ParamSpec::strict(name.as_str()),
                Expr::Combination(annotated) if self.config.strategy == Strategy::Mixed => {
                    match annotated.as_slice() {
                        [Expr::Variable(name), Expr::Variable(tag)] => {
                            let mode = ParamMode::from_tag(tag).ok_or_else(|| {
                                Error::syntax("lambda", format!("unknown parameter mode {tag}"))
                            })?;
                            ParamSpec {
                                name: name.clone(),
                                mode,
                            }
                        }
                        _ => {
                            return Err(Error::syntax(
                                "lambda",
                                format!("parameter must be name or (name mode), got {item}"),
                            ));
                        }
                    }
                }
                Expr::Combination(_) => {
                    return Err(Error::syntax(
                        "lambda",
                        format!("parameter modes require the mixed strategy, got {item}"),
                    ));
                }
                _ => {
                    return Err(Error::syntax(
                        "lambda",
                        format!("parameters must be symbols, got {item}"),
                    ));
                }
            };

            if specs.iter().any(|existing| existing.name == spec.name) {
                return Err(Error::syntax(
                    "lambda",
                    format!("duplicate parameter name {}", spec.name),
                ));
            }
            specs.push(spec);
        }
        Ok(specs)
    }

    fn make_procedure(
        &self,
        name: Option<&str>,
        params: &Expr,
        body: &[Expr],
        env: FrameId,
    ) -> Result<Value, Error> {
        if body.is_empty() {
            return Err(Error::syntax("lambda", "body must not be empty"));
        }
        Ok(Value::Procedure(Rc::new(Procedure {
            name: name.map(str::to_owned),
            params: self.parse_params(params)?,
            body: body.to_vec(),
            closure: env,
        })))
    }
}

/// Evaluate quote special form
pub(crate) fn eval_quote(
    _interp: &mut Interpreter,
    args: &[Expr],
    _env: FrameId,
    _depth: usize,
) -> Result<Value, Error> {
    match args {
        [datum] => Ok(datum.to_datum()),
        _ => Err(Error::syntax(
            "quote",
            format!("expected 1 operand, got {}", args.len()),
        )),
    }
}

/// Evaluate set! special form
pub(crate) fn eval_set(
    interp: &mut Interpreter,
    args: &[Expr],
    env: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [Expr::Variable(name), expr] => {
            let value = interp.eval_expr(expr, env, depth)?;
            interp.frames.set(env, name, value)?;
            Ok(Value::Unspecified)
        }
        [_, _] => Err(Error::syntax("set!", "target must be a symbol")),
        _ => Err(Error::syntax(
            "set!",
            format!("expected 2 operands, got {}", args.len()),
        )),
    }
}

/// Evaluate define special form, `(define name expr)` or
/// `(define (name params...) body...)`
pub(crate) fn eval_define(
    interp: &mut Interpreter,
    args: &[Expr],
    env: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    match args {
        [Expr::Variable(name), expr] => {
            let value = interp.eval_expr(expr, env, depth)?;
            interp.frames.define(env, name.as_str(), value)?;
            Ok(Value::Unspecified)
        }
        [Expr::Combination(signature), body @ ..] => {
            let [Expr::Variable(name), params @ ..] = signature.as_slice() else {
                return Err(Error::syntax("define", "procedure name must be a symbol"));
            };
            let params = if params.is_empty() {
                Expr::Atom(Atom::EmptyList)
            } else {
                Expr::Combination(params.to_vec())
            };
            let procedure = interp.make_procedure(Some(name.as_str()), &params, body, env)?;
            interp.frames.define(env, name.as_str(), procedure)?;
            Ok(Value::Unspecified)
        }
        [_, _] => Err(Error::syntax("define", "target must be a symbol")),
        _ => Err(Error::syntax(
            "define",
            format!("expected 2 operands, got {}", args.len()),
        )),
    }
}

/// Evaluate if special form; a missing alternative yields nil
pub(crate) fn eval_if(
    interp: &mut Interpreter,
    args: &[Expr],
    env: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    let (predicate, consequent, alternative) = match args {
        [predicate, consequent] => (predicate, consequent, None),
        [predicate, consequent, alternative] => (predicate, consequent, Some(alternative)),
        _ => {
            return Err(Error::syntax(
                "if",
                format!("expected 2 or 3 operands, got {}", args.len()),
            ));
        }
    };

    if interp.actual_value(predicate, env, depth)?.is_true() {
        interp.eval_expr(consequent, env, depth)
    } else {
        match alternative {
            Some(alternative) => interp.eval_expr(alternative, env, depth),
            None => Ok(Value::Nil),
        }
    }
}

/// Evaluate and special form. Each operand is forced once, left to right,
/// stopping at the first false value; `(and)` is true.
pub(crate) fn eval_and(
    interp: &mut Interpreter,
    args: &[Expr],
    env: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    let mut result = Value::Bool(true);
    for operand in args {
        result = interp.actual_value(operand, env, depth)?;
        if !result.is_true() {
            break;
        }
    }
    Ok(result)
}

/// Evaluate or special form. Each operand is forced once, left to right,
/// stopping at the first true value; `(or)` is nil.
pub(crate) fn eval_or(
    interp: &mut Interpreter,
    args: &[Expr],
    env: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    let mut result = Value::Nil;
    for operand in args {
        result = interp.actual_value(operand, env, depth)?;
        if result.is_true() {
            break;
        }
    }
    Ok(result)
}

/// Evaluate lambda special form
pub(crate) fn eval_lambda(
    interp: &mut Interpreter,
    args: &[Expr],
    env: FrameId,
    _depth: usize,
) -> Result<Value, Error> {
    match args {
        [params, body @ ..] => interp.make_procedure(None, params, body, env),
        [] => Err(Error::syntax("lambda", "missing parameter list")),
    }
}

/// Evaluate begin special form
pub(crate) fn eval_begin(
    interp: &mut Interpreter,
    args: &[Expr],
    env: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    interp.eval_sequence(args, env, depth)
}

#[cfg(all(test, feature = "scheme"))]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;
    use crate::scheme::parse_scheme;
    use std::cell::Cell;

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        Error,                       // Evaluation should fail (any error)
    }
    use TestResult::{Error, EvalResult, SpecificError};

    /// Test environment containing test cases that share state
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    fn symbol(name: &str) -> TestResult {
        EvalResult(Value::Symbol(name.to_owned()))
    }

    /// Macro for setup expressions that return Unspecified (like define)
    macro_rules! test_setup {
        ($expr:expr) => {
            ($expr, EvalResult(Value::Unspecified))
        };
    }

    /// Run tests in isolated environments with shared state
    fn run_tests_in_environment(config: EvalConfig, test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let mut interp = Interpreter::new(config);

            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &mut interp, &test_id);
            }
        }
    }

    /// Execute a single test case with detailed error reporting
    fn execute_test_case(input: &str, expected: &TestResult, interp: &mut Interpreter, test_id: &str) {
        let expr = match parse_scheme(input) {
            Ok(expr) => expr,
            Err(parse_err) => {
                panic!("{test_id}: unexpected parse error for '{input}': {parse_err:?}");
            }
        };

        match (interp.eval(&expr), expected) {
            (Ok(actual), EvalResult(expected_val)) => match (&actual, expected_val) {
                (Value::Unspecified, Value::Unspecified) => {}
                _ => assert_eq!(
                    actual, *expected_val,
                    "{test_id}: unexpected result for '{input}'"
                ),
            },
            (Err(_), Error) => {}
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Ok(actual), Error) => {
                panic!("{test_id}: expected error, got {actual:?}");
            }
            (Ok(actual), SpecificError(expected_text)) => {
                panic!("{test_id}: expected error containing '{expected_text}', got {actual:?}");
            }
            (Err(err), EvalResult(expected_val)) => {
                panic!("{test_id}: expected {expected_val:?}, got error {err:?}");
            }
        }
    }

    fn run_comprehensive_tests(config: EvalConfig, test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let mut interp = Interpreter::new(config);
            let test_id = format!("#{}", i + 1);
            execute_test_case(input, expected, &mut interp, &test_id);
        }
    }

    #[test]
    fn test_core_forms_data_driven() {
        let test_cases = vec![
            // === SELF-EVALUATING FORMS ===
            ("42", success(42)),
            ("-271", success(-271)),
            ("\"hello\"", success("hello")),
            ("\"\"", success("")),
            ("true", success(true)),
            ("#f", success(false)),
            ("nil", EvalResult(Value::Nil)),
            ("()", EvalResult(Value::List(vec![]))),
            // === QUOTE ===
            ("(quote a)", symbol("a")),
            ("'a", symbol("a")),
            (
                "'(1 b \"c\")",
                EvalResult(Value::List(vec![
                    val(1),
                    Value::Symbol("b".into()),
                    val("c"),
                ])),
            ),
            ("(quote)", SpecificError("quote")),
            // === IF AND TRUTHINESS ===
            ("(if 1 'a 'b)", symbol("a")),
            ("(if nil 'a 'b)", symbol("b")),
            ("(if false 'a 'b)", symbol("b")),
            ("(if 0 'a 'b)", symbol("a")),
            ("(if \"\" 'a 'b)", symbol("a")),
            ("(if () 'a 'b)", symbol("a")),
            ("(if false 'a)", EvalResult(Value::Nil)),
            ("(if true 'a)", symbol("a")),
            ("(if)", SpecificError("if")),
            // === BEGIN ===
            ("(begin 1 2 3 4)", success(4)),
            ("(begin)", EvalResult(Value::Nil)),
            // === LAMBDA AND APPLICATION ===
            ("((lambda (x) (* x x)) 7)", success(49)),
            ("((lambda () 5))", success(5)),
            ("((lambda (x y) (+ x y)) 1)", SpecificError("expected 2 arguments but got 1")),
            ("((lambda (x x) x) 1 2)", SpecificError("duplicate parameter")),
            ("((lambda (x)) 1)", SpecificError("body must not be empty")),
            ("((lambda ((x lazy)) x) 1)", SpecificError("mixed strategy")),
            ("(1 2 3)", SpecificError("Cannot apply non-procedure")),
            // === VARIABLES ===
            ("undefined-var", SpecificError("Unbound variable: undefined-var")),
            ("(set! undefined-var 1)", SpecificError("Unbound variable: undefined-var")),
            // === DERIVED FORMS ===
            ("(cond (false 1) (else 2 3))", success(3)),
            ("(cond (nil 1) (2 => (lambda (x) (* x 10))))", success(20)),
            ("(cond (false 1))", EvalResult(Value::Nil)),
            ("(and 1 2 3)", success(3)),
            ("(and 1 nil)", EvalResult(Value::Nil)),
            ("(and)", success(true)),
            ("(or 1 nil)", success(1)),
            ("(or nil false)", success(false)),
            ("(or)", EvalResult(Value::Nil)),
            ("(let ((x 2) (y 3)) (* x y))", success(6)),
            ("(let* ((x 3) (y (+ x 2)) (z (+ x y 5))) (* x z))", success(39)),
            ("(unless false 1 2)", success(1)),
            ("(unless true 1 2)", success(2)),
            ("(when true 1 2)", success(2)),
            ("(when false 1 2)", EvalResult(Value::Nil)),
            // === IDENTITY VERSUS STRUCTURE ===
            ("(eq? car car)", success(true)),
            ("(eq? car cdr)", success(false)),
            ("(eq? '(1) '(1))", success(false)),
            ("(equal? '(1) '(1))", success(true)),
            ("(eq? (lambda (x) x) (lambda (x) x))", success(false)),
            ("(let ((f (lambda (x) x))) (eq? f f))", success(true)),
            // === PRIMITIVE FAILURES ===
            ("(/ 1 0)", SpecificError("division by zero")),
            ("(+ 1 \"a\")", Error),
        ];

        run_comprehensive_tests(EvalConfig::default(), test_cases);
    }

    #[test]
    fn test_definitions_and_mutation() {
        let environment_test_cases = vec![
            TestEnvironment(vec![
                test_setup!("(define foo 666)"),
                ("foo", success(666)),
            ]),
            TestEnvironment(vec![
                test_setup!("(define (add a b) (+ a b))"),
                ("(add 3 4)", success(7)),
                ("(add 3)", SpecificError("ArityError")),
            ]),
            TestEnvironment(vec![
                test_setup!("(define foo 555)"),
                test_setup!("(set! foo 666)"),
                ("foo", success(666)),
            ]),
            TestEnvironment(vec![
                // define writes into the innermost frame only
                test_setup!("(define x 1)"),
                test_setup!("(define (shadow) (define x 2) x)"),
                ("(shadow)", success(2)),
                ("x", success(1)),
                // set! reaches the enclosing binding
                test_setup!("(define (bump) (set! x (+ x 10)) x)"),
                ("(bump)", success(11)),
                ("x", success(11)),
            ]),
            TestEnvironment(vec![
                // Closures share their captured frame
                test_setup!(
                    "(define (make-counter) (let ((n 0)) (lambda () (set! n (+ n 1)) n)))"
                ),
                test_setup!("(define c1 (make-counter))"),
                test_setup!("(define c2 (make-counter))"),
                ("(c1)", success(1)),
                ("(c1)", success(2)),
                ("(c2)", success(1)),
            ]),
            TestEnvironment(vec![
                // Static scoping: the body sees the closure frame, not the caller's
                test_setup!("(define y 'global)"),
                test_setup!("(define (get-y) y)"),
                ("(let ((y 'local)) (get-y))", symbol("global")),
            ]),
            TestEnvironment(vec![
                test_setup!(
                    "(define (fib n) (let loop ((a 0) (b 1) (count n)) (if (= count 0) a (loop b (+ a b) (- count 1)))))"
                ),
                ("(fib 4)", success(3)),
                ("(fib 10)", success(55)),
            ]),
            TestEnvironment(vec![
                test_setup!(
                    "(define (fact n) (letrec ((f (lambda (k) (if (= k 0) 1 (* k (f (- k 1))))))) (f n)))"
                ),
                ("(fact 10)", success(3628800)),
                (
                    "(letrec ((even? (lambda (n) (if (= n 0) true (odd? (- n 1))))) (odd? (lambda (n) (if (= n 0) false (even? (- n 1)))))) (even? 10))",
                    success(true),
                ),
                ("(letrec ((a b) (b 1)) a)", SpecificError("Unassigned variable: b")),
            ]),
        ];

        run_tests_in_environment(EvalConfig::default(), environment_test_cases);
    }

    #[test]
    fn test_and_or_evaluate_deciding_operand_once() {
        for strategy in [Strategy::Strict, Strategy::Lazy, Strategy::Mixed] {
            let environment_test_cases = vec![TestEnvironment(vec![
                test_setup!("(define n 0)"),
                ("(or (begin (set! n (+ n 1)) n) 99)", success(1)),
                ("n", success(1)),
                ("(and (begin (set! n (+ n 1)) nil) 99)", EvalResult(Value::Nil)),
                ("n", success(2)),
                ("(and 1 (begin (set! n (+ n 1)) n))", success(3)),
                ("n", success(3)),
                ("(cond ((begin (set! n (+ n 1)) n)) (else 0))", success(4)),
                ("n", success(4)),
                ("(or false (begin (set! n (+ n 1)) nil))", EvalResult(Value::Nil)),
                ("n", success(5)),
            ])];

            run_tests_in_environment(
                EvalConfig::default().with_strategy(strategy),
                environment_test_cases,
            );
        }
    }

    #[test]
    fn test_frames_from_another_interpreter_are_rejected() {
        let mut home = Interpreter::default();
        let mut other = Interpreter::default();
        other.eval_str("(define (ten) 10)").unwrap();
        let foreign = other.lookup_global("ten").unwrap();

        let err = home.apply(&foreign, vec![]).unwrap_err();
        assert!(matches!(err, crate::Error::EvalError(_)), "got {err:?}");

        let err = home
            .eval_in(&parse_scheme("ten").unwrap(), other.global_frame())
            .unwrap_err();
        assert!(matches!(err, crate::Error::EvalError(_)), "got {err:?}");

        assert_eq!(other.apply(&foreign, vec![]).unwrap(), val(10));
    }

    #[test]
    fn test_begin_evaluates_every_form_once() {
        let mut interp = Interpreter::default();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        interp.register_primitive("tick", move |args: &[Value]| {
            counter.set(counter.get() + 1);
            Ok(args.first().cloned().unwrap_or(Value::Nil))
        })
        .unwrap();

        let expr = parse_scheme("(begin (tick 1) (tick 2) (tick 3) (tick 4))").unwrap();
        assert_eq!(interp.eval(&expr).unwrap(), val(4));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_cond_rejects_misplaced_else_before_evaluating() {
        let mut interp = Interpreter::default();
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        interp.register_primitive("tick", move |_: &[Value]| {
            counter.set(counter.get() + 1);
            Ok(Value::Bool(true))
        })
        .unwrap();

        let expr = parse_scheme("(cond ((tick) 1) (else 2) ((tick) 3))").unwrap();
        let err = interp.eval(&expr).unwrap_err();
        assert!(matches!(err, crate::Error::MalformedElseClause(_)), "got {err:?}");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_unassigned_marker_visible_with_plain_lookup() {
        let mut interp = Interpreter::new(EvalConfig::default().with_lookup(LookupPolicy::Plain));
        let expr = parse_scheme("(letrec ((a b) (b 1)) a)").unwrap();
        assert!(interp.eval(&expr).unwrap().is_unassigned());
    }

    #[test]
    fn test_self_application_without_named_recursion() {
        let mut interp = Interpreter::default();
        interp
            .eval_str(
                "(define (parity n)
                   ((lambda (ev? od?) (ev? ev? od? n))
                    (lambda (ev? od? k) (if (= k 0) true (od? ev? od? (- k 1))))
                    (lambda (ev? od? k) (if (= k 0) false (ev? ev? od? (- k 1))))))",
            )
            .unwrap();

        assert_eq!(interp.eval_str("(parity 0)").unwrap(), val(true));
        assert_eq!(interp.eval_str("(parity 1)").unwrap(), val(false));
        assert_eq!(interp.eval_str("(parity 2)").unwrap(), val(true));
    }

    #[test]
    fn test_custom_special_form() {
        fn eval_swap_if(
            interp: &mut Interpreter,
            args: &[Expr],
            env: FrameId,
            depth: usize,
        ) -> Result<Value, crate::Error> {
            let [predicate, a, b] = args else {
                return Err(crate::Error::syntax("swap-if", "expected 3 operands"));
            };
            if interp.eval_expr(predicate, env, depth)?.is_true() {
                interp.eval_expr(b, env, depth)
            } else {
                interp.eval_expr(a, env, depth)
            }
        }

        let mut interp = Interpreter::default();
        interp.register_special_form("swap-if", eval_swap_if);
        assert_eq!(interp.eval_str("(swap-if true 1 2)").unwrap(), val(2));
        assert!(interp.special_forms().contains("swap-if"));
    }

    #[test]
    fn test_apply_and_globals() {
        let mut interp = Interpreter::default();
        interp.eval_str("(define (twice f x) (f (f x)))").unwrap();
        let twice = interp.lookup_global("twice").unwrap();
        let double = interp.eval_str("(lambda (x) (* 2 x))").unwrap();

        assert_eq!(interp.apply(&twice, vec![double, val(5)]).unwrap(), val(20));

        let plus = interp.lookup_global("+").unwrap();
        assert_eq!(interp.apply(&plus, vec![val(1), val(2)]).unwrap(), val(3));
        assert!(interp.apply(&val(1), vec![]).is_err());

        interp.define_global("answer", val(42)).unwrap();
        assert_eq!(interp.eval_str("answer").unwrap(), val(42));
    }

    #[test]
    fn test_with_primitives_builds_global_frame() {
        let mut interp = Interpreter::with_primitives(
            EvalConfig::default(),
            [Primitive::new("one", |_: &[Value]| Ok(Value::Number(1)))],
        );
        assert_eq!(interp.eval_str("(one)").unwrap(), val(1));
        assert!(interp.eval_str("(+ 1 2)").is_err());
    }

    #[test]
    fn test_evaluation_depth_limit() {
        let depth_test_environments = vec![TestEnvironment(vec![
            test_setup!(
                "(define make-deep (lambda (self depth) (if (= depth 0) 42 (+ 1 (self self (- depth 1))))))"
            ),
            ("(make-deep make-deep 10)", success(52)),
            ("(make-deep make-deep 100000)", SpecificError("depth")),
            // Only applications count, so long loops stay well inside the limit
            test_setup!("(define (count-down i) (if (= i 0) 'done (count-down (- i 1))))"),
            ("(count-down 1000)", symbol("done")),
        ])];

        run_tests_in_environment(EvalConfig::default(), depth_test_environments);
    }
}
