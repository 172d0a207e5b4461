//! Expression parser, built on [pest](https://pest.rs/).
//!
//! The grammar is defined in `expr.pest`. This module converts pest's
//! parse tree into the typed AST defined in [`crate::ast`]. Binary
//! operators come out of the grammar as a flat operand/operator sequence
//! and are assembled here by precedence climbing over the operator table.
//!
//! Use [`parse_expr`] to convert source text into an [`Expr`].
//!
//! `?[` always reads as null-safe indexing. A ternary whose then-branch is
//! a list literal needs a space: `c ? [1] : [2]`.

use std::iter::Peekable;

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::ast::expr::*;
use crate::ast::operator::{Associativity, Operator, Precedence};
use crate::ast::span::{Span, Spanned};
use crate::ast::value::Value;
use crate::error::ParseError;

#[derive(Parser)]
#[grammar = "parser/expr.pest"]
struct ExprParser;

/// Parse source text into an [`Expr`].
///
/// Returns a list of [`ParseError`]s if the source contains invalid syntax.
/// Each error carries a source [`Span`](crate::Span) for diagnostic formatting.
pub fn parse_expr(source: &str) -> Result<Expr, Vec<ParseError>> {
    let mut pairs = ExprParser::parse(Rule::expression, source).map_err(|e| {
        let span = pest_span_to_span(&e);
        vec![ParseError::new(span, format!("parse error: {e}"))]
    })?;

    // expression = { SOI ~ expr ~ EOI }
    let expression = pairs.next().unwrap();
    let expr = expression.into_inner().next().unwrap();
    build_expr(expr)
}

fn pest_span_to_span(e: &pest::error::Error<Rule>) -> Span {
    match &e.location {
        pest::error::InputLocation::Pos(p) => Span::new(*p, *p + 1),
        pest::error::InputLocation::Span((s, e)) => Span::new(*s, *e),
    }
}

fn pair_span(pair: &Pair<Rule>) -> Span {
    let s = pair.as_span();
    Span::new(s.start(), s.end())
}

// -- Operators -----------------------------------------------------------

fn build_expr(pair: Pair<Rule>) -> Result<Expr, Vec<ParseError>> {
    let span = pair_span(&pair);
    let mut inner = pair.into_inner();

    let condition = build_binary(inner.next().unwrap())?;
    let Some(then_pair) = inner.next() else {
        return Ok(condition);
    };
    let then_branch = build_expr(then_pair)?;
    let else_branch = build_expr(inner.next().unwrap())?;

    Ok(Spanned::new(
        ExprKind::Conditional {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        },
        span,
    ))
}

fn build_binary(pair: Pair<Rule>) -> Result<Expr, Vec<ParseError>> {
    let mut inner = pair.into_inner();
    let first = build_unary(inner.next().unwrap())?;

    // Parse (bin_op ~ unary)* pairs
    let mut rest = Vec::new();
    while let Some(op_pair) = inner.next() {
        let op = parse_bin_op(&op_pair)?;
        let right = build_unary(inner.next().unwrap())?;
        rest.push((op, right));
    }

    let mut rest = rest.into_iter().peekable();
    Ok(climb(first, Precedence::LOWEST, &mut rest))
}

/// Fold `lhs (op operand)*` into a tree, consuming operators that bind at
/// least as tightly as `min`.
fn climb<I>(mut lhs: Expr, min: Precedence, rest: &mut Peekable<I>) -> Expr
where
    I: Iterator<Item = (Operator, Expr)>,
{
    while let Some((op, mut rhs)) = rest.next_if(|(op, _)| op.precedence() >= min) {
        while let Some((next, _)) = rest.peek() {
            let tighter = next.precedence() > op.precedence();
            let right_assoc = next.precedence() == op.precedence()
                && next.associativity() == Associativity::Right;
            if !tighter && !right_assoc {
                break;
            }
            let next_min = if tighter {
                Precedence::new(op.precedence().level() + 1)
            } else {
                op.precedence()
            };
            rhs = climb(rhs, next_min, rest);
        }
        lhs = make_binary(lhs, op, rhs);
    }
    lhs
}

fn make_binary(left: Expr, op: Operator, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    let kind = match op {
        Operator::NullCoalescing => ExprKind::NullCoalescing {
            left: Box::new(left),
            right: Box::new(right),
        },
        _ => ExprKind::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
    };
    Spanned::new(kind, span)
}

fn parse_bin_op(pair: &Pair<Rule>) -> Result<Operator, Vec<ParseError>> {
    Operator::binary(pair.as_str()).ok_or_else(|| {
        vec![ParseError::new(
            pair_span(pair),
            format!("unknown operator: {}", pair.as_str()),
        )]
    })
}

fn build_unary(pair: Pair<Rule>) -> Result<Expr, Vec<ParseError>> {
    let mut prefix = Vec::new();
    let mut operand = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::unary_op => {
                let op = match inner.as_str() {
                    "!" => Operator::Not,
                    "-" => Operator::Negative,
                    _ => unreachable!(),
                };
                prefix.push((op, pair_span(&inner)));
            }
            Rule::postfix => operand = Some(build_postfix(inner)?),
            _ => unreachable!(),
        }
    }

    let mut expr = operand.unwrap();
    // Innermost prefix operator applies first.
    for (op, op_span) in prefix.into_iter().rev() {
        let span = op_span.merge(expr.span);
        expr = Spanned::new(
            ExprKind::UnaryOp {
                op,
                operand: Box::new(expr),
            },
            span,
        );
    }
    Ok(expr)
}

fn build_postfix(pair: Pair<Rule>) -> Result<Expr, Vec<ParseError>> {
    let mut inner = pair.into_inner();
    let mut expr = build_primary(inner.next().unwrap())?;

    for op_pair in inner {
        let span = expr.span.merge(pair_span(&op_pair));
        let kind = match op_pair.as_rule() {
            Rule::field | Rule::null_safe_field => {
                let null_safe = op_pair.as_rule() == Rule::null_safe_field;
                let name = op_pair.into_inner().next().unwrap().as_str().to_string();
                ExprKind::DataAccess {
                    base: Box::new(expr),
                    key: AccessKey::Field(name),
                    null_safe,
                }
            }
            Rule::index | Rule::null_safe_index => {
                let null_safe = op_pair.as_rule() == Rule::null_safe_index;
                let index = build_expr(op_pair.into_inner().next().unwrap())?;
                ExprKind::DataAccess {
                    base: Box::new(expr),
                    key: AccessKey::Index(Box::new(index)),
                    null_safe,
                }
            }
            Rule::assert_non_null => ExprKind::UnaryOp {
                op: Operator::AssertNonNull,
                operand: Box::new(expr),
            },
            _ => unreachable!(),
        };
        expr = Spanned::new(kind, span);
    }
    Ok(expr)
}

// -- Primaries -----------------------------------------------------------

fn build_primary(pair: Pair<Rule>) -> Result<Expr, Vec<ParseError>> {
    let span = pair_span(&pair);
    let rule = pair.as_rule();

    match rule {
        Rule::expr => build_expr(pair),
        Rule::null_lit => Ok(Spanned::new(ExprKind::Null, span)),
        Rule::undefined_lit => Ok(Spanned::new(ExprKind::Literal(Value::Undefined), span)),
        Rule::bool_lit => {
            let b = pair.as_str() == "true";
            Ok(Spanned::new(ExprKind::Literal(Value::Bool(b)), span))
        }
        Rule::number => {
            let text = pair.as_str();
            let value = if text.contains('.') {
                text.parse().map(Value::Float).ok()
            } else {
                text.parse().map(Value::Int).ok()
            };
            let value = value.ok_or_else(|| {
                vec![ParseError::new(span, format!("invalid number: {text}"))
                    .with_hint("integers must fit in 64 bits")]
            })?;
            Ok(Spanned::new(ExprKind::Literal(value), span))
        }
        Rule::quoted_string => {
            let s = extract_string_content(pair);
            Ok(Spanned::new(ExprKind::Literal(Value::String(s)), span))
        }
        Rule::variable => {
            let var = build_variable(pair)?;
            Ok(Spanned::new(ExprKind::Variable(var), span))
        }
        Rule::list_literal => {
            let mut elements = Vec::new();
            for inner_pair in pair.into_inner() {
                elements.push(build_expr(inner_pair)?);
            }
            Ok(Spanned::new(ExprKind::ListLiteral(elements), span))
        }
        Rule::function_call => {
            let mut inner = pair.into_inner();
            let name = inner.next().unwrap().as_str().to_string();
            let mut args = Vec::new();
            for arg in inner {
                args.push(build_expr(arg)?);
            }
            Ok(Spanned::new(
                ExprKind::FunctionCall(FunctionCall { name, args }),
                span,
            ))
        }
        _ => Err(vec![ParseError::new(
            span,
            format!("unexpected rule in primary position: {:?}", rule),
        )]),
    }
}

fn build_variable(pair: Pair<Rule>) -> Result<VariableRef, Vec<ParseError>> {
    let mut parts = pair.into_inner();
    let scope_pair = parts.next().unwrap();
    let name = parts.next().unwrap().as_str();

    let kind = VarKind::from_scope(scope_pair.as_str()).ok_or_else(|| {
        vec![ParseError::new(
            pair_span(&scope_pair),
            format!("unknown variable scope: {}", scope_pair.as_str()),
        )
        .with_hint("expected `param`, `local`, or `range`")]
    })?;
    Ok(VariableRef::new(kind, name))
}

fn extract_string_content(pair: Pair<Rule>) -> String {
    // quoted_string = ${ "\"" ~ string_inner ~ "\"" }
    let inner = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");

    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('"') => result.push('"'),
                Some('\\') => result.push('\\'),
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }
    result
}
