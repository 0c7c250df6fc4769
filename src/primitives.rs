//! Default primitive library.
//!
//! Primitives are native callables bound in the global frame. They always
//! receive fully forced arguments, whatever the evaluation strategy.
//!
//! ```scheme
//! (+ 1 2 3)          ; arithmetic
//! (< 1 2 3)          ; chained comparison
//! (cons 1 '(2 3))    ; list construction
//! (equal? "a" "b")   ; structural equality
//! (eq? f f)          ; identity
//! ```
//!
//! ## Error Handling
//!
//! - **Type Safety**: arithmetic rejects non-numbers, `(+ 1 "a")` errors
//! - **Overflow Detection**: arithmetic is checked and reports overflow
//! - **Arity Checking**: fixed-arity primitives validate their argument count
//!
//! Failures are reported as [`Error::PrimitiveError`] or [`Error::TypeError`]
//! and propagate out of `eval` unchanged.

use crate::Error;
use crate::ast::{NumberType, Primitive, Value};

type PrimitiveImpl = fn(&[Value]) -> Result<Value, Error>;

fn expect_arity(name: &str, args: &[Value], expected: usize) -> Result<(), Error> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(Error::PrimitiveError(format!(
            "{name}: expected {expected} arguments, got {}",
            args.len()
        )))
    }
}

fn expect_at_least(name: &str, args: &[Value], min: usize) -> Result<(), Error> {
    if args.len() >= min {
        Ok(())
    } else {
        Err(Error::PrimitiveError(format!(
            "{name}: expected at least {min} arguments, got {}",
            args.len()
        )))
    }
}

fn numbers(name: &str, args: &[Value]) -> Result<Vec<NumberType>, Error> {
    args.iter()
        .map(|arg| {
            arg.as_number()
                .ok_or_else(|| Error::TypeError(format!("{name}: expected number, got {arg}")))
        })
        .collect()
}

fn overflow(operation: &str) -> Error {
    Error::PrimitiveError(format!("Integer overflow in {operation}"))
}

/// Elements of a list argument; `nil` counts as the empty list
fn list_elements<'a>(name: &str, value: &'a Value) -> Result<&'a [Value], Error> {
    match value {
        Value::List(items) => Ok(items),
        Value::Nil => Ok(&[]),
        other => Err(Error::TypeError(format!("{name}: expected list, got {other}"))),
    }
}

// Macro to generate chained numeric comparison primitives
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            expect_at_least($op_str, args, 2)?;
            let nums = numbers($op_str, args)?;
            Ok(Value::Bool(nums.windows(2).all(|pair| pair[0] $op pair[1])))
        }
    };
}

numeric_comparison!(builtin_num_eq, ==, "=");
numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_gt, >, ">");
numeric_comparison!(builtin_le, <=, "<=");
numeric_comparison!(builtin_ge, >=, ">=");

fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    let mut sum: NumberType = 0;
    for n in numbers("+", args)? {
        sum = sum.checked_add(n).ok_or_else(|| overflow("addition"))?;
    }
    Ok(Value::Number(sum))
}

fn builtin_sub(args: &[Value]) -> Result<Value, Error> {
    expect_at_least("-", args, 1)?;
    let nums = numbers("-", args)?;
    let [first, rest @ ..] = nums.as_slice() else {
        return Err(Error::arity_error(1, 0));
    };

    if rest.is_empty() {
        return first
            .checked_neg()
            .map(Value::Number)
            .ok_or_else(|| overflow("negation"));
    }

    let mut result = *first;
    for n in rest {
        result = result.checked_sub(*n).ok_or_else(|| overflow("subtraction"))?;
    }
    Ok(Value::Number(result))
}

fn builtin_mul(args: &[Value]) -> Result<Value, Error> {
    let mut product: NumberType = 1;
    for n in numbers("*", args)? {
        product = product
            .checked_mul(n)
            .ok_or_else(|| overflow("multiplication"))?;
    }
    Ok(Value::Number(product))
}

/// Integer division truncating toward zero
fn builtin_div(args: &[Value]) -> Result<Value, Error> {
    expect_at_least("/", args, 2)?;
    let nums = numbers("/", args)?;
    let [first, rest @ ..] = nums.as_slice() else {
        return Err(Error::arity_error(2, 0));
    };

    let mut quotient = *first;
    for n in rest {
        if *n == 0 {
            return Err(Error::PrimitiveError("/: division by zero".into()));
        }
        quotient = quotient.checked_div(*n).ok_or_else(|| overflow("division"))?;
    }
    Ok(Value::Number(quotient))
}

fn builtin_remainder(args: &[Value]) -> Result<Value, Error> {
    expect_arity("remainder", args, 2)?;
    let nums = numbers("remainder", args)?;
    if nums[1] == 0 {
        return Err(Error::PrimitiveError("remainder: division by zero".into()));
    }
    nums[0]
        .checked_rem(nums[1])
        .map(Value::Number)
        .ok_or_else(|| overflow("remainder"))
}

fn builtin_not(args: &[Value]) -> Result<Value, Error> {
    expect_arity("not", args, 1)?;
    Ok(Value::Bool(!args[0].is_true()))
}

fn builtin_equal(args: &[Value]) -> Result<Value, Error> {
    expect_arity("equal?", args, 2)?;
    Ok(Value::Bool(args[0] == args[1]))
}

/// Identity rather than structure: procedures, primitives and thunks match
/// only themselves, lists only when both are empty. Other atoms compare by
/// value.
fn builtin_eq(args: &[Value]) -> Result<Value, Error> {
    expect_arity("eq?", args, 2)?;
    let same = match (&args[0], &args[1]) {
        (Value::List(a), Value::List(b)) => a.is_empty() && b.is_empty(),
        (Value::Primitive(a), Value::Primitive(b)) => a.same_function(b),
        (a, b) => a == b,
    };
    Ok(Value::Bool(same))
}

fn builtin_list(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::List(args.to_vec()))
}

fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    expect_arity("cons", args, 2)?;
    let tail = list_elements("cons", &args[1])?;
    let mut new_list = Vec::with_capacity(tail.len() + 1);
    new_list.push(args[0].clone());
    new_list.extend_from_slice(tail);
    Ok(Value::List(new_list))
}

fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    expect_arity("car", args, 1)?;
    match list_elements("car", &args[0])? {
        [first, ..] => Ok(first.clone()),
        [] => Err(Error::PrimitiveError("car of empty list".into())),
    }
}

fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    expect_arity("cdr", args, 1)?;
    match list_elements("cdr", &args[0])? {
        [_, rest @ ..] => Ok(Value::List(rest.to_vec())),
        [] => Err(Error::PrimitiveError("cdr of empty list".into())),
    }
}

fn builtin_null(args: &[Value]) -> Result<Value, Error> {
    expect_arity("null?", args, 1)?;
    Ok(Value::Bool(match &args[0] {
        Value::Nil => true,
        Value::List(items) => items.is_empty(),
        _ => false,
    }))
}

fn builtin_length(args: &[Value]) -> Result<Value, Error> {
    expect_arity("length", args, 1)?;
    let len = list_elements("length", &args[0])?.len();
    NumberType::try_from(len)
        .map(Value::Number)
        .map_err(|_| overflow("length"))
}

macro_rules! type_predicate {
    ($name:ident, $op_str:expr, $pattern:pat) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            expect_arity($op_str, args, 1)?;
            Ok(Value::Bool(matches!(&args[0], $pattern)))
        }
    };
}

type_predicate!(builtin_is_number, "number?", Value::Number(_));
type_predicate!(builtin_is_string, "string?", Value::String(_));
type_predicate!(builtin_is_symbol, "symbol?", Value::Symbol(_));
type_predicate!(builtin_is_procedure, "procedure?", Value::Procedure(_) | Value::Primitive(_));

fn builtin_string_append(args: &[Value]) -> Result<Value, Error> {
    let mut result = String::new();
    for arg in args {
        match arg {
            Value::String(s) => result.push_str(s),
            other => {
                return Err(Error::TypeError(format!(
                    "string-append: expected string, got {other}"
                )));
            }
        }
    }
    Ok(Value::String(result))
}

fn builtin_error(args: &[Value]) -> Result<Value, Error> {
    let parts: Vec<String> = args
        .iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            _ => format!("{value}"),
        })
        .collect();

    let message = if parts.is_empty() {
        "Error".to_owned()
    } else {
        parts.join(" ")
    };

    Err(Error::PrimitiveError(message))
}

const DEFAULT_PRIMITIVES: &[(&str, PrimitiveImpl)] = &[
    ("+", builtin_add),
    ("-", builtin_sub),
    ("*", builtin_mul),
    ("/", builtin_div),
    ("remainder", builtin_remainder),
    ("=", builtin_num_eq),
    ("<", builtin_lt),
    (">", builtin_gt),
    ("<=", builtin_le),
    (">=", builtin_ge),
    ("not", builtin_not),
    ("equal?", builtin_equal),
    ("eq?", builtin_eq),
    ("list", builtin_list),
    ("cons", builtin_cons),
    ("car", builtin_car),
    ("cdr", builtin_cdr),
    ("null?", builtin_null),
    ("length", builtin_length),
    ("number?", builtin_is_number),
    ("string?", builtin_is_string),
    ("symbol?", builtin_is_symbol),
    ("procedure?", builtin_is_procedure),
    ("string-append", builtin_string_append),
    ("error", builtin_error),
];

/// The primitives bound in a default interpreter's global frame
pub fn default_primitives() -> Vec<Primitive> {
    DEFAULT_PRIMITIVES
        .iter()
        .map(|&(name, func)| Primitive::new(name, func))
        .collect()
}
