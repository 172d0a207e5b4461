//! Precedence-aware expression printer.
//!
//! An operand next to an operator gets parentheses exactly when leaving
//! them out would change how the text parses back:
//!
//! - its precedence is lower than the operator's, or
//! - the precedence is equal and the operand sits on the side the
//!   associativity would regroup (a left-associative operand on the right,
//!   a right-associative operand on the left).
//!
//! A [`Printable::Leaf`] has a precedence but no associativity and is
//! compared by precedence alone. Everything here is a pure function.
//!
//! ```rust
//! use weaver_lazy::{parse_expr, print_expr};
//!
//! let expr = parse_expr("({{param:a}} + {{param:b}}) * 2").unwrap();
//! assert_eq!(print_expr(&expr), "({{param:a}} + {{param:b}}) * 2");
//! ```

use crate::ast::{AccessKey, Associativity, Expr, ExprKind, Operator, Precedence, Value};

/// A node of the tree being printed.
#[derive(Debug, Clone, PartialEq)]
pub enum Printable {
    Operation {
        op: Operator,
        operands: Vec<Printable>,
    },
    /// Opaque text with a known binding strength.
    Leaf { text: String, precedence: Precedence },
    /// Text that is never parenthesized.
    Atom(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandPosition {
    Left,
    Right,
}

impl OperandPosition {
    /// Whether an operand of equal precedence with associativity `assoc`
    /// would regroup when printed bare at this position.
    pub fn should_parenthesize(self, assoc: Associativity) -> bool {
        match self {
            OperandPosition::Left => assoc == Associativity::Right,
            OperandPosition::Right => assoc == Associativity::Left,
        }
    }
}

pub fn should_protect(op: Operator, operand: &Printable, position: OperandPosition) -> bool {
    match operand {
        Printable::Operation { op: inner, .. } => {
            inner.precedence() < op.precedence()
                || (inner.precedence() == op.precedence()
                    && position.should_parenthesize(inner.associativity()))
        }
        Printable::Leaf { precedence, .. } => *precedence < op.precedence(),
        Printable::Atom(_) => false,
    }
}

impl Printable {
    pub fn leaf(text: impl Into<String>) -> Self {
        Printable::Leaf {
            text: text.into(),
            precedence: Precedence::PRIMARY,
        }
    }

    pub fn operation(op: Operator, operands: Vec<Printable>) -> Self {
        Printable::Operation { op, operands }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) {
        match self {
            Printable::Leaf { text, .. } | Printable::Atom(text) => out.push_str(text),
            Printable::Operation { op, operands } => match operands.as_slice() {
                [operand] if op.is_postfix() => {
                    write_operand(out, *op, operand, OperandPosition::Left);
                    out.push_str(op.token());
                }
                [operand] => {
                    out.push_str(op.token());
                    write_operand(out, *op, operand, OperandPosition::Right);
                }
                [left, right] => {
                    write_operand(out, *op, left, OperandPosition::Left);
                    out.push(' ');
                    out.push_str(op.token());
                    out.push(' ');
                    write_operand(out, *op, right, OperandPosition::Right);
                }
                [condition, then_branch, else_branch] => {
                    write_operand(out, *op, condition, OperandPosition::Left);
                    out.push_str(" ? ");
                    write_operand(out, *op, then_branch, OperandPosition::Right);
                    out.push_str(" : ");
                    write_operand(out, *op, else_branch, OperandPosition::Right);
                }
                _ => unreachable!("operator arity is 1, 2 or 3"),
            },
        }
    }
}

fn write_operand(out: &mut String, op: Operator, operand: &Printable, position: OperandPosition) {
    if should_protect(op, operand, position) {
        out.push('(');
        operand.write_to(out);
        out.push(')');
    } else {
        operand.write_to(out);
    }
}

/// Render an expression back into source notation with minimal
/// parentheses.
pub fn print_expr(expr: &Expr) -> String {
    to_printable(expr).render()
}

pub fn to_printable(expr: &Expr) -> Printable {
    match &expr.node {
        ExprKind::Null => Printable::leaf("null"),
        ExprKind::Literal(value) => literal_leaf(value),
        ExprKind::ListLiteral(items) => Printable::leaf(format!("[{}]", join(items))),
        ExprKind::Variable(var) => Printable::leaf(format!("{{{{{}:{}}}}}", var.kind.scope(), var.name)),
        ExprKind::DataAccess {
            base,
            key,
            null_safe,
        } => {
            let base = to_printable(base);
            let mut text = if base_needs_parens(&base) {
                format!("({})", base.render())
            } else {
                base.render()
            };
            match key {
                AccessKey::Field(name) => {
                    text.push_str(if *null_safe { "?." } else { "." });
                    text.push_str(name);
                }
                AccessKey::Index(index) => {
                    text.push_str(if *null_safe { "?[" } else { "[" });
                    text.push_str(&print_expr(index));
                    text.push(']');
                }
            }
            Printable::leaf(text)
        }
        ExprKind::NullCoalescing { left, right } => Printable::operation(
            Operator::NullCoalescing,
            vec![to_printable(left), to_printable(right)],
        ),
        ExprKind::Conditional {
            condition,
            then_branch,
            else_branch,
        } => Printable::operation(
            Operator::Conditional,
            vec![
                to_printable(condition),
                to_printable(then_branch),
                to_printable(else_branch),
            ],
        ),
        ExprKind::BinaryOp { left, op, right } => {
            Printable::operation(*op, vec![to_printable(left), to_printable(right)])
        }
        ExprKind::UnaryOp { op, operand } => Printable::operation(*op, vec![to_printable(operand)]),
        ExprKind::FunctionCall(call) => {
            Printable::leaf(format!("{}({})", call.name, join(&call.args)))
        }
    }
}

// Member access binds tighter than every operator.
fn base_needs_parens(base: &Printable) -> bool {
    match base {
        Printable::Operation { .. } => true,
        Printable::Leaf { precedence, .. } => *precedence < Precedence::PRIMARY,
        Printable::Atom(_) => false,
    }
}

fn join(items: &[Expr]) -> String {
    items.iter().map(print_expr).collect::<Vec<_>>().join(", ")
}

fn literal_leaf(value: &Value) -> Printable {
    match value {
        Value::String(s) => Printable::leaf(quote(s)),
        Value::Float(n) => number_leaf(float_text(*n), *n < 0.0),
        Value::Int(n) => number_leaf(n.to_string(), *n < 0),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(|v| literal_leaf(v).render()).collect();
            Printable::leaf(format!("[{}]", items.join(", ")))
        }
        // No surface syntax for records.
        Value::Record(_) => Printable::Atom(format!("<{}>", value.type_name())),
        Value::Null | Value::Undefined | Value::Bool(_) => Printable::leaf(value.to_string()),
    }
}

// A negative literal prints with a leading `-` and binds like one.
fn number_leaf(text: String, negative: bool) -> Printable {
    if negative {
        Printable::Leaf {
            text,
            precedence: Operator::Negative.precedence(),
        }
    } else {
        Printable::leaf(text)
    }
}

// `Display` never uses exponent notation, which the grammar has no form for.
// A whole float keeps a `.0` so it reparses as a float.
fn float_text(n: f64) -> String {
    let text = n.to_string();
    if n.is_finite() && !text.contains('.') {
        text + ".0"
    } else {
        text
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::expr::{binary, coalesce, conditional, field, literal, param};
    use crate::parser::parse_expr;

    fn reprint(source: &str) -> String {
        print_expr(&parse_expr(source).unwrap())
    }

    #[test]
    fn test_equal_precedence_right_operand_protected() {
        let a = param("a");
        let expr = binary(a.clone(), Operator::Plus, binary(a.clone(), Operator::Plus, a));
        assert_eq!(print_expr(&expr), "{{param:a}} + ({{param:a}} + {{param:a}})");
    }

    #[test]
    fn test_tighter_left_operand_not_protected() {
        let expr = binary(
            binary(param("a"), Operator::Times, param("b")),
            Operator::Plus,
            param("c"),
        );
        assert_eq!(print_expr(&expr), "{{param:a}} * {{param:b}} + {{param:c}}");
    }

    #[test]
    fn test_looser_operand_protected() {
        let expr = binary(
            coalesce(param("a"), literal(1)),
            Operator::Times,
            literal(2),
        );
        assert_eq!(print_expr(&expr), "({{param:a}} ?? 1) * 2");
    }

    #[test]
    fn test_leaf_compared_by_precedence_only() {
        let low = Printable::Leaf {
            text: "x".into(),
            precedence: Precedence::new(2),
        };
        assert!(should_protect(Operator::Plus, &low, OperandPosition::Left));
        assert!(!should_protect(
            Operator::Plus,
            &Printable::leaf("y"),
            OperandPosition::Right
        ));
        assert!(!should_protect(
            Operator::Plus,
            &Printable::Atom("a + b".into()),
            OperandPosition::Right
        ));
    }

    #[test]
    fn test_conditional_nesting() {
        let inner = conditional(param("b"), literal(1), literal(2));
        let in_condition = conditional(inner.clone(), literal(3), literal(4));
        assert_eq!(
            print_expr(&in_condition),
            "({{param:b}} ? 1 : 2) ? 3 : 4"
        );
        let in_else = conditional(param("a"), literal(3), inner);
        assert_eq!(print_expr(&in_else), "{{param:a}} ? 3 : {{param:b}} ? 1 : 2");
    }

    #[test]
    fn test_access_base_protected() {
        let expr = field(coalesce(param("a"), param("b")), "name", true);
        assert_eq!(print_expr(&expr), "({{param:a}} ?? {{param:b}})?.name");
    }

    #[test]
    fn test_unary_forms() {
        assert_eq!(reprint("!({{param:a}} && {{param:b}})"), "!({{param:a}} && {{param:b}})");
        assert_eq!(reprint("(!{{param:a}})!"), "(!{{param:a}})!");
        assert_eq!(reprint("-{{range:i}} * 2"), "-{{range:i}} * 2");
    }

    #[test]
    fn test_round_trip_is_stable() {
        for source in [
            "{{param:x}} ?? 5",
            "1 - (2 - 3)",
            "(1 - 2) - 3",
            "{{param:c}} ? {{param:p}} : 7",
            r#"upper({{local:name}}) + "!\n""#,
            "{{param:items}}?[{{range:i}} + 1].title",
            "[1, 2.5, null, undefined, true]",
        ] {
            let once = reprint(source);
            assert_eq!(reprint(&once), once, "unstable print of {source}");
        }
        assert_eq!(reprint("(1 - 2) - 3"), "1 - 2 - 3");
    }

    #[test]
    fn test_extreme_floats_print_without_exponent() {
        let big = "100000000000000000000000.0";
        assert_eq!(reprint(big), big);
        assert_eq!(reprint("0.0000001"), "0.0000001");
        assert_eq!(reprint("2.0"), "2.0");
        assert_eq!(print_expr(&literal(-1e23)), "-100000000000000000000000.0");
        assert_eq!(reprint(&print_expr(&literal(-1e23))), "-100000000000000000000000.0");
        assert_eq!(reprint("1 - (2 - 3)"), "1 - (2 - 3)");
    }
}
