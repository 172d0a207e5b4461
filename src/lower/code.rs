//! Lowered code and its representation types.
//!
//! [`Code`] is the generated program for one expression, still in tree
//! form. [`TypedCode`] pairs it with the [`Repr`] the generated value will
//! have at runtime, which is what every lowering decision is based on.
//! [`Program::assemble`](crate::eval::Program::assemble) turns it into an
//! executable state machine.

use std::fmt;

use crate::ast::{Operator, Value};

/// Runtime representation of a lowered value.
///
/// Forms a small lattice: every `Data(kind)` is assignable to
/// `Data(DataKind::Any)`, and every `Data(_)` is assignable to `Lazy`. Raw
/// scalars are assignable to nothing else and must be boxed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Repr {
    RawInt,
    RawFloat,
    RawBool,
    /// A boxed, already-resolved value.
    Data(DataKind),
    /// A handle that may need resolving, possibly by suspending.
    Lazy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Nullish,
    Bool,
    Int,
    Float,
    String,
    List,
    Any,
}

impl Repr {
    pub fn is_raw(self) -> bool {
        matches!(self, Repr::RawInt | Repr::RawFloat | Repr::RawBool)
    }

    pub fn is_raw_number(self) -> bool {
        matches!(self, Repr::RawInt | Repr::RawFloat)
    }

    /// Assignable to the LazyValue representation.
    pub fn is_lazy_compatible(self) -> bool {
        matches!(self, Repr::Data(_) | Repr::Lazy)
    }

    /// Assignable to the generic resolved-value representation.
    pub fn is_resolved_value(self) -> bool {
        matches!(self, Repr::Data(_))
    }

    /// The representation after boxing.
    pub fn boxed(self) -> Repr {
        match self {
            Repr::RawInt => Repr::Data(DataKind::Int),
            Repr::RawFloat => Repr::Data(DataKind::Float),
            Repr::RawBool => Repr::Data(DataKind::Bool),
            other => other,
        }
    }

    /// The narrowest representation both branches of a conditional fit.
    ///
    /// Identical reprs are kept. Two resolved values of different kinds
    /// widen to `Data(Any)`. Anything else widens to `Lazy`.
    pub fn merge(self, other: Repr) -> Repr {
        if self == other {
            self
        } else if self.is_resolved_value() && other.is_resolved_value() {
            Repr::Data(DataKind::Any)
        } else {
            Repr::Lazy
        }
    }

    pub fn of_literal(value: &Value) -> Repr {
        match value {
            Value::Null | Value::Undefined => Repr::Data(DataKind::Nullish),
            Value::Bool(_) => Repr::RawBool,
            Value::Int(_) => Repr::RawInt,
            Value::Float(_) => Repr::RawFloat,
            Value::String(_) => Repr::Data(DataKind::String),
            Value::List(_) => Repr::Data(DataKind::List),
            Value::Record(_) => Repr::Data(DataKind::Any),
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repr::RawInt => f.write_str("int"),
            Repr::RawFloat => f.write_str("float"),
            Repr::RawBool => f.write_str("bool"),
            Repr::Data(kind) => write!(f, "data<{kind:?}>"),
            Repr::Lazy => f.write_str("lazy"),
        }
    }
}

/// Identifies one suspension point in the generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResumePoint(pub u32);

impl fmt::Display for ResumePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Code {
    /// Read of the shared constant null handle.
    NullProvider,
    Const(Value),
    Param(String),
    Local(String),
    /// Wrap a plain value in a resolved handle.
    Box(Box<Code>),
    /// Wait until the handle is resolved, suspending if it is not. Yields
    /// the same handle, now guaranteed ready.
    WaitFor {
        provider: Box<Code>,
        point: ResumePoint,
    },
    /// Resolve a handle to its plain value. Never suspends; the handle must
    /// already be ready.
    Resolve(Box<Code>),
    /// `left` if its resolved value is not null/undefined, else `right`.
    /// `right` is only evaluated when needed.
    FirstNonNullish {
        left: Box<Code>,
        right: Box<Code>,
    },
    Ternary {
        condition: Box<Code>,
        then_code: Box<Code>,
        else_code: Box<Code>,
    },
    /// Truthiness test, producing a raw bool.
    Truthy(Box<Code>),
    Binary {
        op: Operator,
        left: Box<Code>,
        right: Box<Code>,
    },
    Unary {
        op: Operator,
        operand: Box<Code>,
    },
    Access {
        base: Box<Code>,
        key: CodeKey,
        null_safe: bool,
    },
    List(Vec<Code>),
    Call {
        name: String,
        args: Vec<Code>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CodeKey {
    Field(String),
    Index(Box<Code>),
}

impl Code {
    /// Number of suspension points anywhere in this tree.
    pub fn suspension_points(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |code| {
            if matches!(code, Code::WaitFor { .. }) {
                count += 1;
            }
        });
        count
    }

    /// Number of box operations anywhere in this tree.
    pub fn box_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |code| {
            if matches!(code, Code::Box(_)) {
                count += 1;
            }
        });
        count
    }

    /// Pre-order traversal.
    pub fn walk(&self, f: &mut impl FnMut(&Code)) {
        f(self);
        match self {
            Code::NullProvider | Code::Const(_) | Code::Param(_) | Code::Local(_) => {}
            Code::Box(inner) | Code::Resolve(inner) | Code::Truthy(inner) => inner.walk(f),
            Code::WaitFor { provider, .. } => provider.walk(f),
            Code::FirstNonNullish { left, right } | Code::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Code::Ternary {
                condition,
                then_code,
                else_code,
            } => {
                condition.walk(f);
                then_code.walk(f);
                else_code.walk(f);
            }
            Code::Unary { operand, .. } => operand.walk(f),
            Code::Access { base, key, .. } => {
                base.walk(f);
                if let CodeKey::Index(index) = key {
                    index.walk(f);
                }
            }
            Code::List(items) | Code::Call { args: items, .. } => {
                for item in items {
                    item.walk(f);
                }
            }
        }
    }
}

/// Lowered code together with the representation of the value it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedCode {
    pub code: Code,
    pub repr: Repr,
}

impl TypedCode {
    pub fn new(code: Code, repr: Repr) -> Self {
        Self { code, repr }
    }

    /// The shared constant null handle.
    pub fn null_provider() -> Self {
        Self::new(Code::NullProvider, Repr::Data(DataKind::Nullish))
    }

    pub fn constant(value: Value) -> Self {
        let repr = Repr::of_literal(&value);
        Self::new(Code::Const(value), repr)
    }

    /// Wrap a raw scalar so it is LazyValue-typed. Values that already are
    /// LazyValue-typed pass through untouched.
    pub fn boxed(self) -> Self {
        if self.repr.is_raw() {
            let repr = self.repr.boxed();
            Self::new(Code::Box(Box::new(self.code)), repr)
        } else {
            self
        }
    }

    /// Resolve a handle to a plain value, without a suspension point.
    pub fn resolved(self) -> Self {
        match self.repr {
            Repr::Lazy => Self::new(Code::Resolve(Box::new(self.code)), Repr::Data(DataKind::Any)),
            _ => self,
        }
    }

    /// `self ?? right`, as a single combinator.
    pub fn first_non_nullish(self, right: TypedCode) -> Self {
        let repr = if self.repr.is_lazy_compatible() && right.repr.is_lazy_compatible() {
            Repr::Lazy
        } else {
            Repr::Data(DataKind::Any)
        };
        Self::new(
            Code::FirstNonNullish {
                left: Box::new(self.code),
                right: Box::new(right.code),
            },
            repr,
        )
    }

    /// `condition ? then_branch : else_branch` with the merged repr.
    pub fn ternary(condition: TypedCode, then_branch: TypedCode, else_branch: TypedCode) -> Self {
        let repr = then_branch.repr.merge(else_branch.repr);
        Self::new(
            Code::Ternary {
                condition: Box::new(condition.into_branch().code),
                then_code: Box::new(then_branch.code),
                else_code: Box::new(else_branch.code),
            },
            repr,
        )
    }

    /// Reduce to a raw bool suitable for a branch condition.
    pub fn into_branch(self) -> Self {
        match self.repr {
            Repr::RawBool => self,
            _ => Self::new(Code::Truthy(Box::new(self.code)), Repr::RawBool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_lattice() {
        let int = Repr::Data(DataKind::Int);
        let string = Repr::Data(DataKind::String);
        assert_eq!(int.merge(int), int);
        assert_eq!(int.merge(string), Repr::Data(DataKind::Any));
        assert_eq!(int.merge(Repr::Lazy), Repr::Lazy);
        assert_eq!(Repr::RawInt.merge(Repr::RawInt), Repr::RawInt);
        assert_eq!(Repr::RawInt.merge(int), Repr::Lazy);
    }

    #[test]
    fn test_boxing_raw_only() {
        let raw = TypedCode::constant(Value::Int(7)).boxed();
        assert_eq!(raw.repr, Repr::Data(DataKind::Int));
        assert_eq!(raw.code, Code::Box(Box::new(Code::Const(Value::Int(7)))));

        let param = TypedCode::new(Code::Param("p".into()), Repr::Lazy).boxed();
        assert_eq!(param.code, Code::Param("p".into()));
    }

    #[test]
    fn test_first_non_nullish_is_lazy() {
        let left = TypedCode::new(Code::Param("x".into()), Repr::Lazy);
        let right = TypedCode::constant(Value::Int(5)).boxed();
        assert_eq!(left.first_non_nullish(right).repr, Repr::Lazy);
    }

    #[test]
    fn test_counts() {
        let code = TypedCode::new(Code::Param("x".into()), Repr::Lazy)
            .first_non_nullish(TypedCode::constant(Value::Int(5)).boxed())
            .code;
        assert_eq!(code.box_count(), 1);
        assert_eq!(code.suspension_points(), 0);
    }
}
