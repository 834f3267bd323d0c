//! Pattern text parser built on `nom`.
//!
//! Grammar:
//!
//! ```text
//! query    := MATCH path (',' path)* (WHERE expr)?
//! path     := node (rel node)*
//! node     := '(' var? (':' Label)? props? ')'
//! rel      := '-[' detail ']->' | '<-[' detail ']-' | '-[' detail ']-'
//!           | '-->' | '<--' | '--'
//! detail   := var? (':' Label)? range? props?
//! range    := '*' int ('..' int)? | '*' '..' int
//! props    := '{' key (':' | '=') literal (',' key (':' | '=') literal)* '}'
//! expr     := and (OR and)*
//! and      := unary (AND unary)*
//! unary    := NOT unary | '(' expr ')' | operand op operand
//! operand  := var '.' key | literal | var
//! ```
//!
//! Keywords are case-insensitive. The path and property rules are shared with
//! the ASCII graph loader in [`crate::model::ascii`].

use std::iter;

use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while};
use nom::character::complete::{char, digit1, multispace0, satisfy};
use nom::combinator::{cut, eof, map, map_res, not, opt, recognize, value, verify};
use nom::error::{context, ContextError, ErrorKind, FromExternalError, ParseError};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::{IResult, Parser};

use crate::model::PropertyValue;
use crate::query::ast::{MatchQuery, NodePattern, PathBounds, PathPattern, RelDirection, RelPattern};
use crate::query::predicate::{CmpOp, Operand, Predicate};
use crate::types::{EpgmError, Result};

const RESERVED: &[&str] = &["match", "where", "and", "or", "not", "true", "false", "null"];

/// Parser error carrying the remaining input at the failure point.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PatternError<'a> {
    input: &'a str,
    message: Option<&'static str>,
}

impl<'a> PatternError<'a> {
    pub(crate) fn new(input: &'a str, message: &'static str) -> Self {
        Self {
            input,
            message: Some(message),
        }
    }

    /// Converts into [`EpgmError::QuerySyntax`] relative to the full text.
    pub(crate) fn into_syntax_error(self, text: &str) -> EpgmError {
        let rest = self.input.trim_start();
        let position = text.len().saturating_sub(rest.len());
        let found: String = match rest.split_whitespace().next() {
            Some(token) => format!("'{}'", token.chars().take(16).collect::<String>()),
            None => "end of input".to_owned(),
        };
        let message = self.message.unwrap_or("unexpected input");
        EpgmError::syntax(position, format!("{message}, found {found}"))
    }
}

impl<'a> ParseError<&'a str> for PatternError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        Self {
            input,
            message: None,
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }

    fn or(self, other: Self) -> Self {
        // keep whichever branch got further
        if other.input.len() <= self.input.len() {
            other
        } else {
            self
        }
    }
}

impl<'a> ContextError<&'a str> for PatternError<'a> {
    fn add_context(_input: &'a str, ctx: &'static str, mut other: Self) -> Self {
        if other.message.is_none() {
            other.message = Some(ctx);
        }
        other
    }
}

impl<'a, E> FromExternalError<&'a str, E> for PatternError<'a> {
    fn from_external_error(input: &'a str, _kind: ErrorKind, _e: E) -> Self {
        Self::new(input, "number out of range")
    }
}

pub(crate) type PResult<'a, O> = IResult<&'a str, O, PatternError<'a>>;

/// Runs `parser` over the whole of `text`, mapping failures to syntax errors.
pub(crate) fn finish<'a, O>(
    text: &'a str,
    parser: impl FnOnce(&'a str) -> PResult<'a, O>,
) -> Result<O> {
    match parser(text) {
        Ok((_, output)) => Ok(output),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
            Err(err.into_syntax_error(text))
        }
        Err(nom::Err::Incomplete(_)) => {
            Err(EpgmError::syntax(text.len(), "unexpected end of input"))
        }
    }
}

/// Parses a complete `MATCH` query.
pub fn parse_query(text: &str) -> Result<MatchQuery> {
    finish(text, match_query)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|kw| kw.eq_ignore_ascii_case(word))
}

pub(crate) fn sym<'a>(c: char) -> impl Parser<&'a str, Output = char, Error = PatternError<'a>> {
    preceded(multispace0, char(c))
}

fn symbol<'a>(text: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = PatternError<'a>> {
    preceded(multispace0, tag(text))
}

fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = PatternError<'a>> {
    preceded(
        multispace0,
        terminated(tag_no_case(word), not(satisfy(is_ident_char))),
    )
}

/// Any identifier, reserved words included (labels, property keys).
pub(crate) fn identifier(input: &str) -> PResult<'_, &str> {
    preceded(
        multispace0,
        recognize(pair(
            satisfy(|c: char| c.is_alphabetic() || c == '_'),
            take_while(is_ident_char),
        )),
    )
    .parse(input)
}

/// Identifier usable as a variable name.
pub(crate) fn variable(input: &str) -> PResult<'_, &str> {
    verify(identifier, |word: &str| !is_reserved(word)).parse(input)
}

pub(crate) fn end_of_input(input: &str) -> PResult<'_, &str> {
    context("expected end of input", preceded(multispace0, eof)).parse(input)
}

fn string_literal(input: &str) -> PResult<'_, PropertyValue> {
    let double = delimited(
        char('"'),
        take_while(|c: char| c != '"'),
        cut(context("unterminated string", char('"'))),
    );
    let single = delimited(
        char('\''),
        take_while(|c: char| c != '\''),
        cut(context("unterminated string", char('\''))),
    );
    map(alt((double, single)), |text: &str| {
        PropertyValue::String(text.to_owned())
    })
    .parse(input)
}

fn number_literal(input: &str) -> PResult<'_, PropertyValue> {
    map_res(
        recognize((opt(char('-')), digit1, opt(pair(char('.'), digit1)))),
        |text: &str| {
            if text.contains('.') {
                text.parse::<f64>().map(PropertyValue::Float).map_err(|_| ())
            } else {
                text.parse::<i64>().map(PropertyValue::Int).map_err(|_| ())
            }
        },
    )
    .parse(input)
}

/// `42`, `-1.5`, `"text"`, `'text'`, `true`, `false` or `null`.
pub(crate) fn literal(input: &str) -> PResult<'_, PropertyValue> {
    alt((
        value(PropertyValue::Bool(true), keyword("true")),
        value(PropertyValue::Bool(false), keyword("false")),
        value(PropertyValue::Null, keyword("null")),
        preceded(multispace0, alt((string_literal, number_literal))),
    ))
    .parse(input)
}

fn property_entry(input: &str) -> PResult<'_, (String, PropertyValue)> {
    map(
        (
            identifier,
            cut(context("expected ':' or '='", alt((sym(':'), sym('='))))),
            cut(context("expected literal", literal)),
        ),
        |(key, _, value)| (key.to_owned(), value),
    )
    .parse(input)
}

/// `{k: v, ...}` or `{k=v, ...}`.
pub(crate) fn property_map(input: &str) -> PResult<'_, Vec<(String, PropertyValue)>> {
    delimited(
        sym('{'),
        separated_list0(sym(','), property_entry),
        cut(context("expected '}'", sym('}'))),
    )
    .parse(input)
}

fn label(input: &str) -> PResult<'_, &str> {
    preceded(sym(':'), cut(context("expected label", identifier))).parse(input)
}

/// `(var:Label {k: v})`
pub(crate) fn node_pattern(input: &str) -> PResult<'_, NodePattern> {
    let (input, _) = sym('(').parse(input)?;
    let (input, var) = opt(variable).parse(input)?;
    let (input, label) = opt(label).parse(input)?;
    let (input, properties) = opt(property_map).parse(input)?;
    let (input, _) = cut(context("expected ')'", sym(')'))).parse(input)?;
    Ok((
        input,
        NodePattern {
            var: var.map(str::to_owned),
            label: label.map(str::to_owned),
            properties: properties.unwrap_or_default(),
        },
    ))
}

fn integer(input: &str) -> PResult<'_, u32> {
    map_res(preceded(multispace0, digit1), |digits: &str| digits.parse::<u32>()).parse(input)
}

fn path_bounds(input: &str) -> PResult<'_, PathBounds> {
    let (rest, _) = sym('*').parse(input)?;
    let (rest, lower) = opt(integer).parse(rest)?;
    let (rest, range) = opt(symbol("..")).parse(rest)?;
    let (rest, upper) = match range {
        Some(_) => opt(integer).parse(rest)?,
        None => (rest, None),
    };
    let (min, max) = match (lower, range, upper) {
        (Some(exact), None, _) => (exact, exact),
        (Some(min), Some(_), Some(max)) => (min, max),
        (None, Some(_), Some(max)) => (1, max),
        _ => {
            return Err(nom::Err::Failure(PatternError::new(
                input,
                "variable-length edge requires an upper bound",
            )))
        }
    };
    if min < 1 {
        return Err(nom::Err::Failure(PatternError::new(
            input,
            "path lower bound must be at least 1",
        )));
    }
    if min > max {
        return Err(nom::Err::Failure(PatternError::new(
            input,
            "path lower bound exceeds upper bound",
        )));
    }
    Ok((rest, PathBounds { min, max }))
}

type RelDetail<'a> = (
    Option<&'a str>,
    Option<&'a str>,
    Option<PathBounds>,
    Option<Vec<(String, PropertyValue)>>,
);

fn rel_detail(input: &str) -> PResult<'_, RelDetail<'_>> {
    delimited(
        sym('['),
        (opt(variable), opt(label), opt(path_bounds), opt(property_map)),
        cut(context("expected ']'", sym(']'))),
    )
    .parse(input)
}

/// `-[e:Label*1..2 {k: v}]->` and the short forms `-->`, `<--`, `--`.
pub(crate) fn rel_pattern(input: &str) -> PResult<'_, RelPattern> {
    let start = input;
    let (input, incoming) = opt(sym('<')).parse(input)?;
    let (input, _) = sym('-').parse(input)?;
    let (input, detail) = opt(rel_detail).parse(input)?;
    let (input, _) = cut(context("expected '-'", sym('-'))).parse(input)?;
    let (input, outgoing) = opt(sym('>')).parse(input)?;
    let direction = match (incoming.is_some(), outgoing.is_some()) {
        (true, true) => {
            return Err(nom::Err::Failure(PatternError::new(
                start,
                "edge cannot point in both directions",
            )))
        }
        (true, false) => RelDirection::Incoming,
        (false, true) => RelDirection::Outgoing,
        (false, false) => RelDirection::Undirected,
    };
    let (var, label, bounds, properties) = detail.unwrap_or((None, None, None, None));
    Ok((
        input,
        RelPattern {
            var: var.map(str::to_owned),
            label: label.map(str::to_owned),
            direction,
            bounds,
            properties: properties.unwrap_or_default(),
        },
    ))
}

/// `(a)-[e]->(b)<--(c)`
pub(crate) fn path_pattern(input: &str) -> PResult<'_, PathPattern> {
    let (input, start) = node_pattern(input)?;
    let (input, steps) = many0(pair(
        rel_pattern,
        cut(context("expected node pattern", node_pattern)),
    ))
    .parse(input)?;
    Ok((input, PathPattern { start, steps }))
}

fn comparison_op(input: &str) -> PResult<'_, CmpOp> {
    alt((
        value(CmpOp::Le, symbol("<=")),
        value(CmpOp::Ge, symbol(">=")),
        value(CmpOp::Ne, symbol("<>")),
        value(CmpOp::Ne, symbol("!=")),
        value(CmpOp::Eq, symbol("=")),
        value(CmpOp::Lt, symbol("<")),
        value(CmpOp::Gt, symbol(">")),
    ))
    .parse(input)
}

fn operand(input: &str) -> PResult<'_, Operand> {
    alt((
        map(literal, Operand::Literal),
        map(
            (
                variable,
                char('.'),
                cut(context("expected property key", identifier)),
            ),
            |(var, _, key)| Operand::Property {
                var: var.to_owned(),
                key: key.to_owned(),
            },
        ),
        map(variable, |var| Operand::Element(var.to_owned())),
    ))
    .parse(input)
}

fn comparison(input: &str) -> PResult<'_, Predicate> {
    let (input, lhs) = operand(input)?;
    let (input, op) = cut(context("expected comparison operator", comparison_op)).parse(input)?;
    let (input, rhs) = cut(context("expected operand", operand)).parse(input)?;
    Ok((input, Predicate::compare(lhs, op, rhs)))
}

fn unary(input: &str) -> PResult<'_, Predicate> {
    alt((
        map(preceded(keyword("NOT"), cut(unary)), |inner| {
            Predicate::Not(Box::new(inner))
        }),
        delimited(
            sym('('),
            cut(or_expr),
            cut(context("expected ')'", sym(')'))),
        ),
        context("expected predicate", comparison),
    ))
    .parse(input)
}

fn and_expr(input: &str) -> PResult<'_, Predicate> {
    let (input, first) = unary(input)?;
    let (input, rest) = many0(preceded(keyword("AND"), cut(unary))).parse(input)?;
    if rest.is_empty() {
        return Ok((input, first));
    }
    Ok((input, Predicate::And(iter::once(first).chain(rest).collect())))
}

fn or_expr(input: &str) -> PResult<'_, Predicate> {
    let (input, first) = and_expr(input)?;
    let (input, rest) = many0(preceded(keyword("OR"), cut(and_expr))).parse(input)?;
    if rest.is_empty() {
        return Ok((input, first));
    }
    Ok((input, Predicate::Or(iter::once(first).chain(rest).collect())))
}

fn match_query(input: &str) -> PResult<'_, MatchQuery> {
    let (input, _) = context("expected MATCH", keyword("MATCH")).parse(input)?;
    let (input, first) = cut(context("expected path pattern", path_pattern)).parse(input)?;
    let (input, rest) = many0(preceded(
        sym(','),
        cut(context("expected path pattern", path_pattern)),
    ))
    .parse(input)?;
    let (input, predicate) = opt(preceded(keyword("WHERE"), cut(or_expr))).parse(input)?;
    let (input, _) = end_of_input(input)?;
    Ok((
        input,
        MatchQuery {
            paths: iter::once(first).chain(rest).collect(),
            predicate,
        },
    ))
}
