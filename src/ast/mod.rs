//! Abstract syntax tree types for weaver-lazy.
//!
//! - **Expressions** ([`expr`]): the immutable tree that lowering walks.
//!   Every node is [`Spanned`] so decisions can be traced back to source.
//! - **Operators** ([`operator`]): the static precedence/associativity
//!   table shared by the parser and the printer.
//! - **Values** ([`value`]): plain resolved values, used for literals and
//!   produced by the executor.

pub mod expr;
pub mod operator;
pub mod span;
pub mod value;

// Convenience re-exports
pub use expr::{AccessKey, Expr, ExprKind, FunctionCall, VarKind, VariableRef};
pub use operator::{Associativity, Operator, Precedence};
pub use span::{Span, Spanned};
pub use value::Value;
