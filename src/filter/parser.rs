//! Parser for the compact text form of a filter.
//!
//! Grammar (in rough EBNF):
//!
//! filter     = or_expr EOF
//! or_expr    = and_expr ("|" and_expr)*
//! and_expr   = unary ("&" unary)*
//! unary      = "!" unary | primary
//! primary    = "(" or_expr ")" | tag_expr
//! tag_expr   = KEY ( "!=" value | "=" value_list )?
//! value_list = value ( "|" value )*      -- no whitespace around "|"
//! value      = KEY | QUOTED
//!
//! A `|` surrounded by whitespace is always boolean OR, so
//! `highway=primary|secondary | name` reads as
//! `(highway in [primary, secondary]) or has(name)`.

use super::ast::FilterExpr;
use winnow::ModalResult;
use winnow::ascii::multispace0;
use winnow::combinator::{alt, cut_err, delimited, eof, not, opt, preceded, repeat, terminated};
use winnow::prelude::*;
use winnow::token::{take_till, take_while};

fn key<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(1.., |c: char| {
        c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.')
    })
    .parse_next(input)
}

fn quoted<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    delimited('"', take_till(0.., '"'), cut_err('"')).parse_next(input)
}

fn value(input: &mut &str) -> ModalResult<String> {
    alt((quoted, key)).map(str::to_owned).parse_next(input)
}

/// Succeeds when the next token starts a comparison, without consuming it.
fn comparison_ahead(input: &mut &str) -> ModalResult<()> {
    (multispace0, alt(("!=", "="))).void().parse_next(input)
}

fn tag_expr(input: &mut &str) -> ModalResult<FilterExpr> {
    let key = key.parse_next(input)?.to_owned();
    let _ = multispace0.parse_next(input)?;

    if opt("!=").parse_next(input)?.is_some() {
        let _ = multispace0.parse_next(input)?;
        let value = cut_err(value).parse_next(input)?;
        return Ok(FilterExpr::NotEquals { key, value });
    }

    if opt('=').parse_next(input)?.is_some() {
        let _ = multispace0.parse_next(input)?;
        let first = cut_err(value).parse_next(input)?;
        let rest: Vec<String> =
            repeat(0.., preceded('|', terminated(value, not(comparison_ahead))))
                .parse_next(input)?;

        if rest.is_empty() {
            return Ok(FilterExpr::Equals { key, value: first });
        }
        let mut values = Vec::with_capacity(rest.len() + 1);
        values.push(first);
        values.extend(rest);
        return Ok(FilterExpr::In { key, values });
    }

    Ok(FilterExpr::Has(key))
}

fn primary(input: &mut &str) -> ModalResult<FilterExpr> {
    alt((
        delimited(('(', multispace0), or_expr, (multispace0, cut_err(')'))),
        tag_expr,
    ))
    .parse_next(input)
}

fn unary(input: &mut &str) -> ModalResult<FilterExpr> {
    if opt('!').parse_next(input)?.is_some() {
        let _ = multispace0.parse_next(input)?;
        let inner = cut_err(unary).parse_next(input)?;
        return Ok(FilterExpr::Not(Box::new(inner)));
    }
    primary.parse_next(input)
}

fn and_expr(input: &mut &str) -> ModalResult<FilterExpr> {
    let first = unary.parse_next(input)?;
    let rest: Vec<FilterExpr> =
        repeat(0.., preceded((multispace0, '&', multispace0), cut_err(unary)))
            .parse_next(input)?;

    if rest.is_empty() {
        return Ok(first);
    }
    let mut all = vec![first];
    all.extend(rest);
    Ok(FilterExpr::All(all))
}

fn or_expr(input: &mut &str) -> ModalResult<FilterExpr> {
    let first = and_expr.parse_next(input)?;
    let rest: Vec<FilterExpr> =
        repeat(0.., preceded((multispace0, '|', multispace0), cut_err(and_expr)))
            .parse_next(input)?;

    if rest.is_empty() {
        return Ok(first);
    }
    let mut any = vec![first];
    any.extend(rest);
    Ok(FilterExpr::Any(any))
}

/// Parse the text form of a filter into a simplified AST.
pub fn parse_filter(input: &str) -> Result<FilterExpr, String> {
    if input.trim().is_empty() {
        return Ok(FilterExpr::True);
    }

    let mut remaining = input;
    let expr = delimited(multispace0, or_expr, (multispace0, eof))
        .parse_next(&mut remaining)
        .map_err(|e| {
            let offset = input.len() - remaining.len();
            format!("syntax error in '{}' near offset {}: {:?}", input, offset, e)
        })?;

    Ok(expr.simplify())
}
