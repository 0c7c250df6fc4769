//! Derived-form desugaring.
//!
//! Each function here is a pure rewrite from the operands of a derived form
//! to an equivalent expression built from core forms (`if`, `lambda`,
//! `begin`, `set!`, `define`) and applications. Nothing is evaluated, so
//! shape errors such as a misplaced `else` clause surface before any
//! sub-expression of the form runs.
//!
//! ```scheme
//! (let ((x 1) (y 2)) body)      => ((lambda (x y) body) 1 2)
//! (let* ((x 1) (y x)) body)     => (let ((x 1)) (let ((y x)) body))
//! (letrec ((f e)) body)         => (let ((f <unassigned>)) (set! f e) body)
//! (let loop ((i 0)) body)       => ((lambda () (define (loop i) body) (loop 0)))
//! (unless c a b)                => (if c b a)
//! (cond (p x) (else y))         => (if p x y)
//! (cond (p) (else y))           => (or p y)
//! ```
//!
//! `and` and `or` are not rewritten. They return the value of the operand
//! that decided the outcome, and an `if` fold would evaluate that operand
//! twice.

use crate::Error;
use crate::ast::{Atom, Expr, list, nil, sym, unassigned};

/// Parameter name used by the cond arrow rewrite. The reader cannot produce
/// a symbol starting with `#`, so user code can never capture it.
const COND_ARROW_VALUE: &str = "#cond-value";

fn form(tag: &str, operands: impl IntoIterator<Item = Expr>) -> Expr {
    let mut items = vec![sym(tag)];
    items.extend(operands);
    list(items)
}

fn if_form(predicate: Expr, consequent: Expr, alternative: Expr) -> Expr {
    form("if", [predicate, consequent, alternative])
}

/// Collapse a body into a single expression
fn sequence(body: &[Expr]) -> Expr {
    match body {
        [] => nil(),
        [only] => only.clone(),
        _ => form("begin", body.iter().cloned()),
    }
}

/// Elements of a parenthesised list operand, treating `()` as empty
fn list_items<'a>(form_name: &str, expr: &'a Expr) -> Result<&'a [Expr], Error> {
    match expr {
        Expr::Combination(items) => Ok(items),
        Expr::Atom(Atom::EmptyList) => Ok(&[]),
        other => Err(Error::syntax(form_name, format!("expected a list, got {other}"))),
    }
}

/// A single `(name value)` binding
struct Binding {
    name: Expr,
    value: Expr,
}

fn parse_bindings(form_name: &str, expr: &Expr) -> Result<Vec<Binding>, Error> {
    list_items(form_name, expr)?
        .iter()
        .map(|binding| match binding {
            Expr::Combination(pair) => match pair.as_slice() {
                [name @ Expr::Variable(_), value] => Ok(Binding {
                    name: name.clone(),
                    value: value.clone(),
                }),
                _ => Err(Error::syntax(
                    form_name,
                    format!("binding must be (name value), got {binding}"),
                )),
            },
            other => Err(Error::syntax(
                form_name,
                format!("binding must be (name value), got {other}"),
            )),
        })
        .collect()
}

fn require_body<'a>(form_name: &str, body: &'a [Expr]) -> Result<&'a [Expr], Error> {
    if body.is_empty() {
        return Err(Error::syntax(form_name, "body must not be empty"));
    }
    Ok(body)
}

fn params_list(names: impl IntoIterator<Item = Expr>) -> Expr {
    let names: Vec<Expr> = names.into_iter().collect();
    if names.is_empty() {
        Expr::Atom(Atom::EmptyList)
    } else {
        list(names)
    }
}

/// `(let ((n v) ...) body...)` or named `(let name ((n v) ...) body...)`
pub fn let_form(operands: &[Expr]) -> Result<Expr, Error> {
    match operands {
        [name @ Expr::Variable(_), bindings, body @ ..] => named_let(name, bindings, body),
        [bindings, body @ ..] => {
            let body = require_body("let", body)?;
            let bindings = parse_bindings("let", bindings)?;
            let (names, values): (Vec<Expr>, Vec<Expr>) =
                bindings.into_iter().map(|b| (b.name, b.value)).unzip();

            let lambda = form("lambda", std::iter::once(params_list(names)).chain(body.iter().cloned()));
            Ok(list(std::iter::once(lambda).chain(values).collect()))
        }
        [] => Err(Error::syntax("let", "missing bindings")),
    }
}

/// Defines a local procedure `name` inside a fresh zero-argument lambda and
/// calls it with the initial values, so the body can recurse on `name`.
fn named_let(name: &Expr, bindings: &Expr, body: &[Expr]) -> Result<Expr, Error> {
    let body = require_body("let", body)?;
    let bindings = parse_bindings("let", bindings)?;
    let (params, values): (Vec<Expr>, Vec<Expr>) =
        bindings.into_iter().map(|b| (b.name, b.value)).unzip();

    let signature = list(std::iter::once(name.clone()).chain(params).collect());
    let definition = form("define", std::iter::once(signature).chain(body.iter().cloned()));
    let call = list(std::iter::once(name.clone()).chain(values).collect());
    let wrapper = form("lambda", [Expr::Atom(Atom::EmptyList), definition, call]);
    Ok(list(vec![wrapper]))
}

/// Nest one `let` per binding so later bindings see earlier ones
pub fn let_star(operands: &[Expr]) -> Result<Expr, Error> {
    let [bindings, body @ ..] = operands else {
        return Err(Error::syntax("let*", "missing bindings"));
    };
    let body = require_body("let*", body)?;
    let items = list_items("let*", bindings)?;
    // Validate every binding up front
    parse_bindings("let*", bindings)?;

    Ok(match items.split_last() {
        None => form(
            "let",
            std::iter::once(Expr::Atom(Atom::EmptyList)).chain(body.iter().cloned()),
        ),
        Some((last, init)) => {
            let inner = form(
                "let",
                std::iter::once(list(vec![last.clone()])).chain(body.iter().cloned()),
            );
            init.iter()
                .rev()
                .fold(inner, |acc, binding| form("let", [list(vec![binding.clone()]), acc]))
        }
    })
}

/// Bind every name to the unassigned marker in one frame, then `set!` each
/// in order. Lambdas among the values close over that shared frame.
pub fn letrec(operands: &[Expr]) -> Result<Expr, Error> {
    let [bindings, body @ ..] = operands else {
        return Err(Error::syntax("letrec", "missing bindings"));
    };
    let body = require_body("letrec", body)?;
    let bindings = parse_bindings("letrec", bindings)?;

    let placeholders: Vec<Expr> = bindings
        .iter()
        .map(|b| list(vec![b.name.clone(), unassigned()]))
        .collect();
    let assignments = bindings
        .into_iter()
        .map(|b| form("set!", [b.name, b.value]));

    Ok(form(
        "let",
        std::iter::once(params_list(placeholders))
            .chain(assignments)
            .chain(body.iter().cloned()),
    ))
}

/// `(unless c a b)` => `(if c b a)`; a missing `b` becomes nil
pub fn unless(operands: &[Expr]) -> Result<Expr, Error> {
    match operands {
        [condition, usual, exceptional] => Ok(if_form(
            condition.clone(),
            exceptional.clone(),
            usual.clone(),
        )),
        [condition, usual] => Ok(if_form(condition.clone(), nil(), usual.clone())),
        _ => Err(Error::syntax(
            "unless",
            format!("expected 2 or 3 operands, got {}", operands.len()),
        )),
    }
}

/// `(when c body...)` => `(if c (begin body...) nil)`
pub fn when(operands: &[Expr]) -> Result<Expr, Error> {
    let [condition, body @ ..] = operands else {
        return Err(Error::syntax("when", "missing condition"));
    };
    let body = require_body("when", body)?;
    Ok(if_form(condition.clone(), sequence(body), nil()))
}

fn is_else_clause(clause: &Expr) -> bool {
    matches!(clause, Expr::Combination(items) if items.first().and_then(Expr::as_symbol) == Some("else"))
}

/// Fold cond clauses right to left into nested `if`s. A clause with only a
/// test becomes `(or test rest)` so its value is computed once.
///
/// An `else` clause anywhere but last fails with `MalformedElseClause`.
pub fn cond(operands: &[Expr]) -> Result<Expr, Error> {
    if let Some(position) = operands.iter().position(is_else_clause)
        && position + 1 != operands.len()
    {
        return Err(Error::MalformedElseClause(format!(
            "{}",
            form("cond", operands.iter().cloned())
        )));
    }

    operands.iter().rev().try_fold(nil(), |rest, clause| {
        let items = match clause {
            Expr::Combination(items) => items.as_slice(),
            other => {
                return Err(Error::syntax(
                    "cond",
                    format!("clause must be a non-empty list, got {other}"),
                ));
            }
        };

        Ok(match items {
            [] => return Err(Error::syntax("cond", "clause must be a non-empty list")),
            [Expr::Variable(tag), body @ ..] if tag == "else" => sequence(body),
            [test, Expr::Variable(arrow), receiver] if arrow == "=>" => {
                let value = sym(COND_ARROW_VALUE);
                let lambda = form(
                    "lambda",
                    [
                        list(vec![value.clone()]),
                        if_form(value.clone(), list(vec![receiver.clone(), value]), rest),
                    ],
                );
                list(vec![lambda, test.clone()])
            }
            [test] => form("or", [test.clone(), rest]),
            [test, body @ ..] => if_form(test.clone(), sequence(body), rest),
        })
    })
}
