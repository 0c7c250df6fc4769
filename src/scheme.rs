//! S-expression reader producing [`Expr`] trees.
//!
//! ```scheme
//! 42 -7 #x1A          ; numbers
//! "text\n"            ; strings with \n \t \r \\ \" escapes
//! true false #t #f    ; booleans
//! nil ()              ; nil and the empty list
//! 'x                  ; shorthand for (quote x)
//! ; comment to end of line
//! ```

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace1},
    combinator::{opt, recognize, value},
    error::ErrorKind,
    multi::{many0, many1, separated_list0},
    sequence::{pair, preceded, terminated},
};

use crate::Error;
use crate::MAX_PARSE_DEPTH;
use crate::ast::{Atom, Expr, NumberType};

/// Characters allowed in symbols besides alphanumerics
const SYMBOL_SPECIAL_CHARS: &str = "+-*/<>=!?_$";

/// Check if a string is a valid symbol name
/// Valid: non-empty, no leading digit, no "-digit" prefix, alphanumeric + SYMBOL_SPECIAL_CHARS
fn is_valid_symbol(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        None => false,
        Some(first_char) => {
            if first_char.is_ascii_digit() {
                return false;
            }

            if first_char == '-'
                && let Some(second_char) = chars.next()
                && second_char.is_ascii_digit()
            {
                return false;
            }

            name.chars()
                .all(|c| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c))
        }
    }
}

/// Convert nom parsing errors to user-friendly messages
fn parse_error_to_message(input: &str, error: nom::Err<nom::error::Error<&str>>) -> String {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            match e.code {
                ErrorKind::Char => format!("Expected character at position {position}"),
                ErrorKind::Tag => format!("Unexpected token at position {position}"),
                ErrorKind::TooLarge => {
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})")
                }
                _ => {
                    if position < input.len() {
                        let remaining_chars: String =
                            input.chars().skip(position).take(10).collect();
                        format!("Invalid syntax near '{remaining_chars}'")
                    } else {
                        "Unexpected end of input".into()
                    }
                }
            }
        }
        nom::Err::Incomplete(_) => "Incomplete input".into(),
    }
}

/// Line comment starting with `;`
fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(';'), take_while(|c: char| c != '\n'))).parse(input)
}

/// Whitespace or comments, possibly none
fn ws0(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((multispace1, comment)))).parse(input)
}

/// At least one whitespace character or comment
fn ws1(input: &str) -> IResult<&str, ()> {
    value((), many1(alt((multispace1, comment)))).parse(input)
}

/// Parse a number (integer only, supports decimal and hexadecimal)
fn parse_number(input: &str) -> IResult<&str, Expr> {
    alt((parse_hexadecimal, parse_decimal)).parse(input)
}

/// Parse a decimal number
fn parse_decimal(input: &str) -> IResult<&str, Expr> {
    let (input, number_str) = recognize(pair(
        opt(char('-')),
        take_while1(|c: char| c.is_ascii_digit()),
    ))
    .parse(input)?;

    match number_str.parse::<NumberType>() {
        Ok(n) => Ok((input, Expr::Atom(Atom::Number(n)))),
        // Overflow; symbol parsing rejects a leading digit anyway
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Digit,
        ))),
    }
}

/// Parse a hexadecimal number (#x or #X prefix)
fn parse_hexadecimal(input: &str) -> IResult<&str, Expr> {
    let (input, _) = char('#').parse(input)?;
    let (input, _) = alt((char('x'), char('X'))).parse(input)?;
    let (input, hex_digits) = take_while1(|c: char| c.is_ascii_hexdigit()).parse(input)?;

    match NumberType::from_str_radix(hex_digits, 16) {
        Ok(n) => Ok((input, Expr::Atom(Atom::Number(n)))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::HexDigit,
        ))),
    }
}

/// Parse a boolean (#t or #f)
fn parse_bool(input: &str) -> IResult<&str, Expr> {
    alt((
        value(Expr::Atom(Atom::Bool(true)), tag("#t")),
        value(Expr::Atom(Atom::Bool(false)), tag("#f")),
    ))
    .parse(input)
}

/// Parse a symbol; `true`, `false` and `nil` read as literals
fn parse_symbol(input: &str) -> IResult<&str, Expr> {
    let mut symbol_chars =
        take_while1(|c: char| c.is_alphanumeric() || SYMBOL_SPECIAL_CHARS.contains(c));

    let (remaining, candidate) = symbol_chars.parse(input)?;

    if !is_valid_symbol(candidate) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Alpha,
        )));
    }

    let expr = match candidate {
        "true" => Expr::Atom(Atom::Bool(true)),
        "false" => Expr::Atom(Atom::Bool(false)),
        "nil" => Expr::Atom(Atom::Nil),
        _ => Expr::Variable(candidate.into()),
    };
    Ok((remaining, expr))
}

/// Parse a string literal
fn parse_string(input: &str) -> IResult<&str, Expr> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => {
                return Ok((char_iter.as_str(), Expr::Atom(Atom::String(chars))));
            }
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    // Unknown escape, or backslash at end of input
                    Some(_) | None => {
                        return Err(nom::Err::Error(nom::error::Error::new(
                            remaining,
                            ErrorKind::Char,
                        )));
                    }
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => {
                // Unterminated string
                return Err(nom::Err::Error(nom::error::Error::new(
                    remaining,
                    ErrorKind::Char,
                )));
            }
        }
    }
}

/// Parse a parenthesised list; `()` reads as the empty-list literal
fn parse_list(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, _) = char('(').parse(input)?;
    let (input, _) = ws0.parse(input)?;

    let (input, elements) =
        separated_list0(ws1, |input| parse_sexpr(input, depth + 1)).parse(input)?;

    let (input, _) = ws0.parse(input)?;
    let (input, _) = char(')').parse(input)?;

    if elements.is_empty() {
        return Ok((input, Expr::Atom(Atom::EmptyList)));
    }
    Ok((input, Expr::Combination(elements)))
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = parse_sexpr(input, depth + 1)?;
    Ok((
        input,
        Expr::Combination(vec![Expr::Variable("quote".into()), expr]),
    ))
}

/// Parse an S-expression, rejecting nesting beyond `MAX_PARSE_DEPTH`
fn parse_sexpr(input: &str, depth: usize) -> IResult<&str, Expr> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    preceded(
        ws0,
        alt((
            |input| parse_quote(input, depth),
            |input| parse_list(input, depth),
            parse_number,
            parse_bool,
            parse_string,
            parse_symbol,
        )),
    )
    .parse(input)
}

/// Parse exactly one S-expression from input
pub fn parse_scheme(input: &str) -> Result<Expr, Error> {
    match terminated(|input| parse_sexpr(input, 0), ws0).parse(input) {
        Ok(("", expr)) => Ok(expr),
        Ok((remaining, _)) => Err(Error::ParseError(format!(
            "Unexpected remaining input: '{remaining}'"
        ))),
        Err(e) => Err(Error::ParseError(parse_error_to_message(input, e))),
    }
}

/// Parse a sequence of top-level S-expressions, such as a whole program
pub fn parse_program(input: &str) -> Result<Vec<Expr>, Error> {
    match terminated(many0(|input| parse_sexpr(input, 0)), ws0).parse(input) {
        Ok(("", exprs)) => Ok(exprs),
        Ok((remaining, _)) => Err(Error::ParseError(format!(
            "Unexpected remaining input: '{remaining}'"
        ))),
        Err(e) => Err(Error::ParseError(parse_error_to_message(input, e))),
    }
}
