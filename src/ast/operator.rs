//! Operator metadata.
//!
//! Each [`Operator`] carries a fixed precedence, associativity, canonical
//! token and arity. The table is generated by `#[derive(OperatorTable)]`
//! from the attributes below and never changes at runtime. The parser
//! uses it for precedence climbing and the [printer](crate::printer) uses
//! it to decide where parentheses are required.

use std::fmt;

use weaver_macros::OperatorTable;

/// Binding strength of an operator. Higher binds tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Precedence(u8);

impl Precedence {
    /// The ternary conditional, loosest of all operators.
    pub const LOWEST: Precedence = Precedence(1);
    /// Literals, variables, calls, parenthesized groups and member access.
    pub const PRIMARY: Precedence = Precedence(u8::MAX);

    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    pub const fn level(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Associativity {
    Left,
    Right,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, OperatorTable)]
pub enum Operator {
    // Postfix
    #[operator(token = "!", precedence = 14, assoc = "left", arity = 1)]
    AssertNonNull,

    // Prefix
    #[operator(token = "-", precedence = 13, assoc = "right", arity = 1)]
    Negative,
    #[operator(token = "!", precedence = 13, assoc = "right", arity = 1)]
    Not,

    // Arithmetic
    #[operator(token = "*", precedence = 12, assoc = "left")]
    Times,
    #[operator(token = "/", precedence = 12, assoc = "left")]
    DivideBy,
    #[operator(token = "%", precedence = 12, assoc = "left")]
    Mod,
    #[operator(token = "+", precedence = 11, assoc = "left")]
    Plus,
    #[operator(token = "-", precedence = 11, assoc = "left")]
    Minus,
    #[operator(token = "<<", precedence = 10, assoc = "left")]
    ShiftLeft,
    #[operator(token = ">>", precedence = 10, assoc = "left")]
    ShiftRight,

    // Comparison
    #[operator(token = "<", precedence = 9, assoc = "left")]
    LessThan,
    #[operator(token = ">", precedence = 9, assoc = "left")]
    GreaterThan,
    #[operator(token = "<=", precedence = 9, assoc = "left")]
    LessThanOrEqual,
    #[operator(token = ">=", precedence = 9, assoc = "left")]
    GreaterThanOrEqual,
    #[operator(token = "==", precedence = 8, assoc = "left")]
    Equal,
    #[operator(token = "!=", precedence = 8, assoc = "left")]
    NotEqual,

    // Bitwise
    #[operator(token = "&", precedence = 7, assoc = "left")]
    BitwiseAnd,
    #[operator(token = "^", precedence = 6, assoc = "left")]
    BitwiseXor,
    #[operator(token = "|", precedence = 5, assoc = "left")]
    BitwiseOr,

    // Logical
    #[operator(token = "&&", precedence = 4, assoc = "left")]
    And,
    #[operator(token = "||", precedence = 3, assoc = "left")]
    Or,
    #[operator(token = "??", precedence = 2, assoc = "left")]
    NullCoalescing,

    /// `c ? a : b`. Not a single token; printed with both halves.
    #[operator(token = "? :", precedence = 1, assoc = "right", arity = 3)]
    Conditional,
}

impl Operator {
    /// Binary operators that the eager compiler treats as arithmetic.
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Operator::Times | Operator::DivideBy | Operator::Mod | Operator::Plus | Operator::Minus
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::LessThan
                | Operator::GreaterThan
                | Operator::LessThanOrEqual
                | Operator::GreaterThanOrEqual
                | Operator::Equal
                | Operator::NotEqual
        )
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            Operator::ShiftLeft
                | Operator::ShiftRight
                | Operator::BitwiseAnd
                | Operator::BitwiseXor
                | Operator::BitwiseOr
        )
    }

    /// Postfix operators print their token after the operand.
    pub fn is_postfix(self) -> bool {
        matches!(self, Operator::AssertNonNull)
    }

    /// Look up a binary operator by token.
    pub fn binary(token: &str) -> Option<Operator> {
        Operator::from_token(token, 2)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}
