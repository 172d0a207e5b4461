use super::operator::Operator;
use super::span::Spanned;
use super::value::Value;

pub type Expr = Spanned<ExprKind>;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// `null`
    Null,

    /// Non-null literal: `undefined`, `true`, `42`, `1.5`, `"text"`
    Literal(Value),

    /// List literal: `[1, {{param:x}}, "three"]`
    ListLiteral(Vec<Expr>),

    /// Variable reference: `{{param:name}}`, `{{local:name}}`, `{{range:i}}`
    Variable(VariableRef),

    /// Field or index access: `a.b`, `a?.b`, `a[i]`, `a?[i]`
    DataAccess {
        base: Box<Expr>,
        key: AccessKey,
        null_safe: bool,
    },

    /// `left ?? right`
    NullCoalescing { left: Box<Expr>, right: Box<Expr> },

    /// `condition ? then_branch : else_branch`
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },

    /// Binary operation other than `??`: `a + b`, `a == b`, `a && b`
    BinaryOp {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },

    /// Prefix `!` / `-`, or postfix non-null assertion `a!`
    UnaryOp { op: Operator, operand: Box<Expr> },

    /// Call of a registered function: `upper(name)`
    FunctionCall(FunctionCall),
}

/// What a variable reference points at. Each kind is stored differently
/// by the generated code, so lowering treats them differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarKind {
    /// A template parameter. Always stored as a lazily resolvable value.
    Param,
    /// A `let` binding or a loop item bound to a list element.
    Local,
    /// A loop variable iterating a numeric range, stored as a raw integer.
    RangeLocal,
}

impl VarKind {
    /// The surface-syntax scope name: `param`, `local` or `range`.
    pub fn scope(self) -> &'static str {
        match self {
            VarKind::Param => "param",
            VarKind::Local => "local",
            VarKind::RangeLocal => "range",
        }
    }

    pub fn from_scope(scope: &str) -> Option<VarKind> {
        match scope {
            "param" => Some(VarKind::Param),
            "local" => Some(VarKind::Local),
            "range" => Some(VarKind::RangeLocal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableRef {
    pub kind: VarKind,
    pub name: String,
}

impl VariableRef {
    pub fn new(kind: VarKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AccessKey {
    /// `.name`
    Field(String),
    /// `[expr]`
    Index(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expr>,
}

// ── Construction helpers ────────────────────────────────────────────────
//
// Hosts that build trees in code rather than parsing them use these. All
// nodes get a synthetic span.

impl ExprKind {
    pub fn into_expr(self) -> Expr {
        Spanned::synthetic(self)
    }
}

pub fn null() -> Expr {
    ExprKind::Null.into_expr()
}

pub fn literal(value: impl Into<Value>) -> Expr {
    ExprKind::Literal(value.into()).into_expr()
}

pub fn param(name: &str) -> Expr {
    ExprKind::Variable(VariableRef::new(VarKind::Param, name)).into_expr()
}

pub fn local(name: &str) -> Expr {
    ExprKind::Variable(VariableRef::new(VarKind::Local, name)).into_expr()
}

pub fn range_local(name: &str) -> Expr {
    ExprKind::Variable(VariableRef::new(VarKind::RangeLocal, name)).into_expr()
}

pub fn coalesce(left: Expr, right: Expr) -> Expr {
    ExprKind::NullCoalescing {
        left: Box::new(left),
        right: Box::new(right),
    }
    .into_expr()
}

pub fn conditional(condition: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
    ExprKind::Conditional {
        condition: Box::new(condition),
        then_branch: Box::new(then_branch),
        else_branch: Box::new(else_branch),
    }
    .into_expr()
}

pub fn binary(left: Expr, op: Operator, right: Expr) -> Expr {
    ExprKind::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
    .into_expr()
}

pub fn field(base: Expr, name: &str, null_safe: bool) -> Expr {
    ExprKind::DataAccess {
        base: Box::new(base),
        key: AccessKey::Field(name.to_string()),
        null_safe,
    }
    .into_expr()
}
