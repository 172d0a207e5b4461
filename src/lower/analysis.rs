use std::collections::HashSet;

use crate::ast::{AccessKey, Expr, ExprKind, VarKind};

/// Answers whether evaluating an expression may have to wait on a value
/// that is not yet available.
///
/// A `false` answer is a promise: lowering will read the value without a
/// suspension point. A `true` answer only permits one.
pub trait SuspensionAnalysis {
    fn requires_suspension(&self, expr: &Expr) -> bool;
}

/// Conservative analysis over variable references.
///
/// Every parameter and local may be pending unless it was marked resolved.
/// Range locals are raw integers and never pending.
#[derive(Debug, Default, Clone)]
pub struct StaticSuspensionAnalysis {
    resolved: HashSet<String>,
}

impl StaticSuspensionAnalysis {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `name` is always resolved by the time it is read.
    pub fn mark_resolved(&mut self, name: impl Into<String>) {
        self.resolved.insert(name.into());
    }

    pub fn with_resolved(mut self, name: impl Into<String>) -> Self {
        self.mark_resolved(name);
        self
    }
}

impl SuspensionAnalysis for StaticSuspensionAnalysis {
    fn requires_suspension(&self, expr: &Expr) -> bool {
        match &expr.node {
            ExprKind::Null | ExprKind::Literal(_) => false,
            ExprKind::Variable(var) => match var.kind {
                VarKind::RangeLocal => false,
                VarKind::Param | VarKind::Local => !self.resolved.contains(&var.name),
            },
            ExprKind::ListLiteral(items) => items.iter().any(|item| self.requires_suspension(item)),
            ExprKind::DataAccess { base, key, .. } => {
                self.requires_suspension(base)
                    || matches!(key, AccessKey::Index(index) if self.requires_suspension(index))
            }
            ExprKind::NullCoalescing { left, right } => {
                self.requires_suspension(left) || self.requires_suspension(right)
            }
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                self.requires_suspension(condition)
                    || self.requires_suspension(then_branch)
                    || self.requires_suspension(else_branch)
            }
            ExprKind::BinaryOp { left, right, .. } => {
                self.requires_suspension(left) || self.requires_suspension(right)
            }
            ExprKind::UnaryOp { operand, .. } => self.requires_suspension(operand),
            ExprKind::FunctionCall(call) => call.args.iter().any(|arg| self.requires_suspension(arg)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Operator;
    use crate::ast::expr::{binary, coalesce, field, literal, local, param, range_local};

    #[test]
    fn test_variables() {
        let analysis = StaticSuspensionAnalysis::new().with_resolved("ready");
        assert!(analysis.requires_suspension(&param("x")));
        assert!(analysis.requires_suspension(&local("item")));
        assert!(!analysis.requires_suspension(&param("ready")));
        assert!(!analysis.requires_suspension(&range_local("i")));
        assert!(!analysis.requires_suspension(&literal(3)));
    }

    #[test]
    fn test_composites_recurse() {
        let analysis = StaticSuspensionAnalysis::new();
        let sum = binary(range_local("i"), Operator::Plus, literal(1));
        assert!(!analysis.requires_suspension(&sum));
        assert!(analysis.requires_suspension(&coalesce(literal(1), param("x"))));
        assert!(analysis.requires_suspension(&field(param("user"), "name", false)));
    }
}
