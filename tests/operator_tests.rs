use weaver_lazy::ast::expr::{binary, conditional, literal, param};
use weaver_lazy::printer::{OperandPosition, Printable, should_protect};
use weaver_lazy::{Associativity, Operator, Precedence, parse_expr, print_expr};
use weaver_macros::OperatorTable;

// ── A table derived outside the crate ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, OperatorTable)]
enum Pipeline {
    #[operator(token = "|>", precedence = 3, assoc = "left")]
    Pipe,
    #[operator(token = "**", precedence = 9, assoc = "right")]
    Power,
    #[operator(token = "~", precedence = 10, assoc = "right", arity = 1)]
    Complement,
    #[operator(token = "==", precedence = 5, assoc = "none")]
    Same,
}

#[test]
fn test_derived_table_accessors() {
    assert_eq!(
        Pipeline::ALL,
        &[
            Pipeline::Pipe,
            Pipeline::Power,
            Pipeline::Complement,
            Pipeline::Same
        ]
    );
    assert_eq!(Pipeline::Pipe.token(), "|>");
    assert_eq!(Pipeline::Power.precedence(), Precedence::new(9));
    assert_eq!(Pipeline::Power.associativity(), Associativity::Right);
    assert_eq!(Pipeline::Same.associativity(), Associativity::None);
    assert_eq!(Pipeline::Complement.arity(), 1);
    assert_eq!(Pipeline::Pipe.arity(), 2);
}

#[test]
fn test_derived_lookup_respects_arity() {
    assert_eq!(Pipeline::from_token("~", 1), Some(Pipeline::Complement));
    assert_eq!(Pipeline::from_token("~", 2), None);
    assert_eq!(Pipeline::from_token("**", 2), Some(Pipeline::Power));
    assert_eq!(Pipeline::from_token("<>", 2), None);
}

#[test]
fn test_derived_accessors_are_const() {
    const POWER: Precedence = Pipeline::Power.precedence();
    const PIPE_TOKEN: &str = Pipeline::Pipe.token();
    assert!(POWER > Pipeline::Pipe.precedence());
    assert_eq!(PIPE_TOKEN, "|>");
}

// ── The built-in operator table ─────────────────────────────────────────

#[test]
fn test_builtin_table_is_complete() {
    assert_eq!(Operator::ALL.len(), 23);
    for op in Operator::ALL {
        assert!(!op.token().is_empty());
        assert!((1..=3).contains(&op.arity()), "{op:?}");
        assert!(op.precedence() >= Precedence::LOWEST);
        assert!(op.precedence() < Precedence::PRIMARY);
    }
}

#[test]
fn test_shared_tokens_split_by_arity() {
    assert_eq!(Operator::from_token("-", 1), Some(Operator::Negative));
    assert_eq!(Operator::from_token("-", 2), Some(Operator::Minus));
    assert_eq!(Operator::binary("??"), Some(Operator::NullCoalescing));
    assert_eq!(Operator::binary("!"), None);
}

#[test]
fn test_builtin_ordering() {
    assert!(Operator::Times.precedence() > Operator::Plus.precedence());
    assert!(Operator::And.precedence() > Operator::Or.precedence());
    assert!(Operator::Or.precedence() > Operator::NullCoalescing.precedence());
    assert!(Operator::NullCoalescing.precedence() > Operator::Conditional.precedence());
    assert_eq!(Operator::Conditional.associativity(), Associativity::Right);
}

// ── Printer parenthesization ────────────────────────────────────────────

#[test]
fn test_plus_with_right_plus_operand_is_protected() {
    let operand = Printable::operation(
        Operator::Plus,
        vec![Printable::leaf("b"), Printable::leaf("c")],
    );
    assert!(should_protect(Operator::Plus, &operand, OperandPosition::Right));
    assert!(!should_protect(Operator::Plus, &operand, OperandPosition::Left));

    let expr = binary(
        param("a"),
        Operator::Plus,
        binary(param("b"), Operator::Plus, param("c")),
    );
    assert_eq!(print_expr(&expr), "{{param:a}} + ({{param:b}} + {{param:c}})");
}

#[test]
fn test_plus_with_left_times_operand_is_not_protected() {
    let operand = Printable::operation(
        Operator::Times,
        vec![Printable::leaf("a"), Printable::leaf("b")],
    );
    assert!(!should_protect(Operator::Plus, &operand, OperandPosition::Left));

    let expr = binary(
        binary(param("a"), Operator::Times, param("b")),
        Operator::Plus,
        param("c"),
    );
    assert_eq!(print_expr(&expr), "{{param:a}} * {{param:b}} + {{param:c}}");
}

#[test]
fn test_lower_precedence_operand_is_protected_on_either_side() {
    let sum = Printable::operation(
        Operator::Plus,
        vec![Printable::leaf("a"), Printable::leaf("b")],
    );
    assert!(should_protect(Operator::Times, &sum, OperandPosition::Left));
    assert!(should_protect(Operator::Times, &sum, OperandPosition::Right));
}

#[test]
fn test_right_associative_operand_protected_on_left() {
    let inner = Printable::operation(
        Operator::Conditional,
        vec![
            Printable::leaf("a"),
            Printable::leaf("b"),
            Printable::leaf("c"),
        ],
    );
    assert!(should_protect(Operator::Conditional, &inner, OperandPosition::Left));
    assert!(!should_protect(Operator::Conditional, &inner, OperandPosition::Right));

    let expr = conditional(
        conditional(param("a"), literal(1), literal(2)),
        literal(3),
        literal(4),
    );
    assert_eq!(print_expr(&expr), "({{param:a}} ? 1 : 2) ? 3 : 4");
}

#[test]
fn test_printed_text_reparses_to_same_tree_shape() {
    for source in [
        "{{param:a}} - ({{param:b}} - {{param:c}})",
        "{{param:a}} * ({{param:b}} + 1) ?? 0",
        "-{{range:i}} + 1 < 10 && {{param:ok}}",
        "!{{param:a}}! || {{local:b}}?.c",
    ] {
        let parsed = parse_expr(source).unwrap();
        let printed = print_expr(&parsed);
        let reparsed = parse_expr(&printed).unwrap();
        assert_eq!(print_expr(&reparsed), printed, "{source}");
    }
}
