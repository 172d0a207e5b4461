//! Eager lowering: every expression to a plain value.
//!
//! The lazy compiler falls back to an [`EagerCompiler`] whenever a node has
//! no lazy lowering of its own. [`BasicEagerCompiler`] is the reference
//! implementation: it resolves every variable read up front, going through
//! the detacher when the analysis says the read may have to wait.

use crate::ast::{AccessKey, Expr, ExprKind, Operator, VarKind};

use super::analysis::SuspensionAnalysis;
use super::code::{Code, CodeKey, DataKind, Repr, TypedCode};
use super::detach::Detacher;
use super::variables::VariableLookup;

pub trait EagerCompiler {
    /// Lower `expr` without any suspension point, or `None` if that is not
    /// possible.
    fn compile_with_no_suspension(&self, expr: &Expr) -> Option<TypedCode>;

    /// Lower `expr`, inserting suspension points through `detacher` where
    /// needed. Always succeeds.
    fn compile(&self, expr: &Expr, detacher: &mut dyn Detacher) -> TypedCode;
}

pub struct BasicEagerCompiler<'a> {
    analysis: &'a dyn SuspensionAnalysis,
    variables: &'a dyn VariableLookup,
}

impl<'a> BasicEagerCompiler<'a> {
    pub fn new(analysis: &'a dyn SuspensionAnalysis, variables: &'a dyn VariableLookup) -> Self {
        Self {
            analysis,
            variables,
        }
    }
}

impl EagerCompiler for BasicEagerCompiler<'_> {
    fn compile_with_no_suspension(&self, expr: &Expr) -> Option<TypedCode> {
        EagerVisitor {
            compiler: self,
            detacher: None,
        }
        .visit(expr)
    }

    fn compile(&self, expr: &Expr, detacher: &mut dyn Detacher) -> TypedCode {
        let lowered = EagerVisitor {
            compiler: self,
            detacher: Some(detacher),
        }
        .visit(expr);
        match lowered {
            Some(code) => code,
            None => unreachable!("eager lowering with a detacher cannot decline"),
        }
    }
}

struct EagerVisitor<'c, 'a, 'd> {
    compiler: &'c BasicEagerCompiler<'a>,
    detacher: Option<&'d mut dyn Detacher>,
}

impl EagerVisitor<'_, '_, '_> {
    fn visit(&mut self, expr: &Expr) -> Option<TypedCode> {
        let code = match &expr.node {
            ExprKind::Null => TypedCode::constant(crate::ast::Value::Null),
            ExprKind::Literal(value) => TypedCode::constant(value.clone()),
            ExprKind::ListLiteral(items) => {
                let mut codes = Vec::with_capacity(items.len());
                for item in items {
                    codes.push(self.visit(item)?.code);
                }
                TypedCode::new(Code::List(codes), Repr::Data(DataKind::List))
            }
            ExprKind::Variable(var) => {
                let provider = match var.kind {
                    VarKind::Param => self.compiler.variables.param(&var.name),
                    VarKind::Local | VarKind::RangeLocal => self.compiler.variables.local(var),
                };
                self.read(expr, provider)?
            }
            ExprKind::DataAccess {
                base,
                key,
                null_safe,
            } => {
                let base = self.visit(base)?.resolved();
                let key = match key {
                    AccessKey::Field(name) => CodeKey::Field(name.clone()),
                    AccessKey::Index(index) => {
                        CodeKey::Index(Box::new(self.visit(index)?.resolved().code))
                    }
                };
                TypedCode::new(
                    Code::Access {
                        base: Box::new(base.code),
                        key,
                        null_safe: *null_safe,
                    },
                    Repr::Data(DataKind::Any),
                )
            }
            ExprKind::NullCoalescing { left, right } => {
                let left = self.visit(left)?;
                let right = self.visit(right)?;
                left.first_non_nullish(right).resolved()
            }
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.visit(condition)?;
                let then_branch = self.visit(then_branch)?;
                let else_branch = self.visit(else_branch)?;
                TypedCode::ternary(condition, then_branch, else_branch).resolved()
            }
            ExprKind::BinaryOp { left, op, right } => {
                let left = self.visit(left)?.resolved();
                let right = self.visit(right)?.resolved();
                let repr = binary_repr(*op, left.repr, right.repr);
                TypedCode::new(
                    Code::Binary {
                        op: *op,
                        left: Box::new(left.code),
                        right: Box::new(right.code),
                    },
                    repr,
                )
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand = self.visit(operand)?.resolved();
                let repr = match op {
                    Operator::Not => Repr::RawBool,
                    _ if operand.repr.is_raw() => operand.repr,
                    _ => Repr::Data(DataKind::Any),
                };
                TypedCode::new(
                    Code::Unary {
                        op: *op,
                        operand: Box::new(operand.code),
                    },
                    repr,
                )
            }
            ExprKind::FunctionCall(call) => {
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    args.push(self.visit(arg)?.resolved().code);
                }
                TypedCode::new(
                    Code::Call {
                        name: call.name.clone(),
                        args,
                    },
                    Repr::Data(DataKind::Any),
                )
            }
        };
        Some(code)
    }

    /// Read a variable to a plain value, waiting on it first if the
    /// analysis says it may be pending.
    fn read(&mut self, expr: &Expr, provider: TypedCode) -> Option<TypedCode> {
        if provider.repr != Repr::Lazy || !self.compiler.analysis.requires_suspension(expr) {
            return Some(provider.resolved());
        }
        let detacher = self.detacher.as_deref_mut()?;
        Some(detacher.wait_for(provider).resolved())
    }
}

fn binary_repr(op: Operator, left: Repr, right: Repr) -> Repr {
    let both_int = left == Repr::RawInt && right == Repr::RawInt;
    let both_numbers = left.is_raw_number() && right.is_raw_number();
    match op {
        _ if op.is_comparison() => Repr::RawBool,
        Operator::And | Operator::Or => Repr::RawBool,
        Operator::DivideBy if both_numbers => Repr::RawFloat,
        _ if op.is_arithmetic() && both_int => Repr::RawInt,
        _ if op.is_arithmetic() && both_numbers => Repr::RawFloat,
        _ if op.is_bitwise() && both_int => Repr::RawInt,
        _ => Repr::Data(DataKind::Any),
    }
}
