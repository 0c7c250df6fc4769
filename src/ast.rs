//! This module defines the expression trees the evaluator consumes and the
//! runtime values it produces. [`Expr`] is the immutable, already-parsed
//! program representation: atoms, variables and combinations. [`Value`] covers
//! everything evaluation can yield, including quoted data, procedures closing
//! over a frame, opaque primitives and suspended computations ([`Thunk`]).
//! Ergonomic helpers such as [`sym`], [`num`] and [`list`] build expression
//! trees in code and tests.

use crate::Error;
use crate::environment::FrameId;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

/// Type alias for number values in the interpreter
pub(crate) type NumberType = i64;

/// Marker held by `letrec` bindings until their `set!` runs.
///
/// The field is private so only this crate can produce one, and the reader
/// has no syntax for it. As a [`Value`] it never compares equal to anything.
#[derive(Clone, Copy, PartialEq)]
pub struct Unassigned(());

pub(crate) const UNASSIGNED: Unassigned = Unassigned(());

impl fmt::Debug for Unassigned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<unassigned>")
    }
}

/// Self-evaluating leaves of an expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Number(NumberType),
    String(String),
    Bool(bool),
    Nil,
    /// The empty sequence `()`
    EmptyList,
    Unassigned(Unassigned),
}

/// Parsed expression tree
///
/// A `Combination` holds its operator first followed by the operands, and is
/// never empty when produced by the reader or the desugaring layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Atom(Atom),
    Variable(String),
    Combination(Vec<Expr>),
}

impl Expr {
    pub fn is_self_evaluating(&self) -> bool {
        matches!(self, Expr::Atom(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Expr::Variable(_))
    }

    /// Split a combination into operator and operands
    pub fn as_combination(&self) -> Option<(&Expr, &[Expr])> {
        match self {
            Expr::Combination(items) => items.split_first(),
            _ => None,
        }
    }

    /// Name of the leading operator when it is a plain symbol
    pub fn operator_tag(&self) -> Option<&str> {
        match self.as_combination() {
            Some((Expr::Variable(name), _)) => Some(name),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expr::Variable(name) => Some(name),
            _ => None,
        }
    }

    /// Convert syntax to data, as `quote` sees it
    pub fn to_datum(&self) -> Value {
        match self {
            Expr::Atom(atom) => Value::from(atom),
            Expr::Variable(name) => Value::Symbol(name.clone()),
            Expr::Combination(items) => Value::List(items.iter().map(Expr::to_datum).collect()),
        }
    }
}

/// Helper for creating variable references
pub fn sym<S: AsRef<str>>(name: S) -> Expr {
    Expr::Variable(name.as_ref().to_owned())
}

pub fn num(n: NumberType) -> Expr {
    Expr::Atom(Atom::Number(n))
}

pub fn string<S: Into<String>>(s: S) -> Expr {
    Expr::Atom(Atom::String(s.into()))
}

pub fn boolean(b: bool) -> Expr {
    Expr::Atom(Atom::Bool(b))
}

pub fn nil() -> Expr {
    Expr::Atom(Atom::Nil)
}

pub(crate) fn unassigned() -> Expr {
    Expr::Atom(Atom::Unassigned(UNASSIGNED))
}

/// Helper for creating combinations: `list(vec![sym("+"), num(1), num(2)])`
pub fn list(items: Vec<Expr>) -> Expr {
    Expr::Combination(items)
}

/// How a procedure parameter turns its operand into an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamMode {
    #[default]
    Strict,
    /// Wrapped in a thunk that re-runs on every force
    Lazy,
    /// Wrapped in a thunk that caches its first forced value
    LazyMemo,
}

impl ParamMode {
    /// Parse a mode annotation as written in `(x lazy)`
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "strict" => Some(ParamMode::Strict),
            "lazy" => Some(ParamMode::Lazy),
            "lazy-memo" => Some(ParamMode::LazyMemo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub mode: ParamMode,
}

impl ParamSpec {
    pub fn strict(name: impl Into<String>) -> Self {
        ParamSpec {
            name: name.into(),
            mode: ParamMode::Strict,
        }
    }
}

/// User-defined procedure closing over the frame it was created in
#[derive(Debug)]
pub struct Procedure {
    /// Set by the `(define (name ...) ...)` form, used in traces and display
    pub name: Option<String>,
    pub params: Vec<ParamSpec>,
    pub body: Vec<Expr>,
    pub closure: FrameId,
}

/// Canonical erased signature for native callables.
///
/// Primitives always receive fully forced argument values.
pub type PrimitiveFn = dyn Fn(&[Value]) -> Result<Value, Error>;

/// Opaque native callable injected by the host
#[derive(Clone)]
pub struct Primitive {
    pub name: String,
    func: Rc<PrimitiveFn>,
}

impl Primitive {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, Error> + 'static,
    {
        Primitive {
            name: name.into(),
            func: Rc::new(func),
        }
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, Error> {
        (self.func)(args)
    }

    /// Whether both handles share one native function, regardless of name
    pub fn same_function(&self, other: &Primitive) -> bool {
        Rc::ptr_eq(&self.func, &other.func)
    }
}

/// Suspended computation: an expression paired with the frame it must be
/// evaluated in. Building one never evaluates anything.
pub struct Thunk {
    expr: Expr,
    env: FrameId,
    memo: bool,
    cache: OnceCell<Value>,
}

impl Thunk {
    pub(crate) fn new(expr: Expr, env: FrameId, memo: bool) -> Self {
        Thunk {
            expr,
            env,
            memo,
            cache: OnceCell::new(),
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn env(&self) -> FrameId {
        self.env
    }

    pub fn is_memoized(&self) -> bool {
        self.memo
    }

    /// Cached value of a forced memoizing thunk. Always `None` for plain thunks.
    pub fn cached(&self) -> Option<&Value> {
        self.cache.get()
    }

    /// Populate the cache. The first stored value wins, so a re-entrant force
    /// cannot overwrite it.
    pub(crate) fn store(&self, value: Value) -> Value {
        if !self.memo {
            return value;
        }
        self.cache.get_or_init(|| value).clone()
    }
}

/// Runtime values
#[derive(Clone)]
pub enum Value {
    /// Numbers (integers only)
    Number(NumberType),
    String(String),
    Bool(bool),
    Nil,
    /// Symbols produced by `quote`
    Symbol(String),
    /// Lists produced by `quote` and list primitives; `()` is the empty list
    List(Vec<Value>),
    Procedure(Rc<Procedure>),
    Primitive(Primitive),
    Thunk(Rc<Thunk>),
    /// Result of `define` and `set!`; never equals anything
    Unspecified,
    Unassigned(Unassigned),
}

impl Value {
    /// Everything except `nil` and `false` counts as true
    pub fn is_true(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_unassigned(&self) -> bool {
        matches!(self, Value::Unassigned(_))
    }

    pub fn as_number(&self) -> Option<NumberType> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_applicable(&self) -> bool {
        matches!(self, Value::Procedure(_) | Value::Primitive(_))
    }
}

impl From<&Atom> for Value {
    fn from(atom: &Atom) -> Self {
        match atom {
            Atom::Number(n) => Value::Number(*n),
            Atom::String(s) => Value::String(s.clone()),
            Atom::Bool(b) => Value::Bool(*b),
            Atom::Nil => Value::Nil,
            Atom::EmptyList => Value::List(vec![]),
            Atom::Unassigned(marker) => Value::Unassigned(*marker),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper for expected values in tests: `val(42)`, `val([1, 2])`
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

fn write_sequence<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    write!(f, "(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, ")")
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Number(n) => write!(f, "{n}"),
            Atom::String(s) => write_string_literal(f, s),
            Atom::Bool(b) => write!(f, "{b}"),
            Atom::Nil => write!(f, "nil"),
            Atom::EmptyList => write!(f, "()"),
            Atom::Unassigned(_) => write!(f, "#<unassigned>"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Atom(atom) => write!(f, "{atom}"),
            Expr::Variable(name) => write!(f, "{name}"),
            Expr::Combination(items) => write_sequence(f, items),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write_string_literal(f, s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Nil => write!(f, "nil"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::List(items) => write_sequence(f, items),
            Value::Procedure(proc) => match &proc.name {
                Some(name) => write!(f, "#<procedure:{name}>"),
                None => write!(f, "#<procedure>"),
            },
            Value::Primitive(prim) => write!(f, "#<primitive:{}>", prim.name),
            Value::Thunk(thunk) => match thunk.cached() {
                Some(v) => write!(f, "#<thunk:forced {v}>"),
                None => write!(f, "#<thunk>"),
            },
            Value::Unspecified => write!(f, "#<unspecified>"),
            Value::Unassigned(_) => write!(f, "#<unassigned>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Nil => write!(f, "Nil"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Procedure(proc) => write!(
                f,
                "Procedure(name={:?}, params={:?}, closure={:?})",
                proc.name, proc.params, proc.closure
            ),
            Value::Primitive(prim) => write!(f, "Primitive({})", prim.name),
            Value::Thunk(thunk) => write!(
                f,
                "Thunk(expr={}, memo={}, cached={:?})",
                thunk.expr,
                thunk.memo,
                thunk.cached()
            ),
            Value::Unspecified => write!(f, "Unspecified"),
            Value::Unassigned(_) => write!(f, "Unassigned"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Procedure(a), Value::Procedure(b)) => Rc::ptr_eq(a, b),
            // Compare primitives by name, not function pointer
            (Value::Primitive(a), Value::Primitive(b)) => a.name == b.name,
            (Value::Thunk(a), Value::Thunk(b)) => Rc::ptr_eq(a, b),
            _ => false, // Unspecified and Unassigned never equal anything
        }
    }
}
