//! Expression lowering to lazily resolvable values.
//!
//! [`LazyValueCompiler`] decides, per expression, whether the generated code
//! can hand back a lazy handle directly, must compute the value eagerly and
//! box it, or cannot satisfy the caller's [`CompilerMode`] at all. In the
//! last case it returns [`Lowered::Declined`] and the caller compiles the
//! expression eagerly instead.
//!
//! The composition rules, per node kind:
//!
//! | node | rule |
//! |---|---|
//! | `null` | the shared null handle, never boxed |
//! | `a ?? b` | both sides as handles, left waited on when it may be pending |
//! | `c ? a : b` | declines when neither branch lowers lazily |
//! | `{{range:i}}` | boxed when boxing is permitted, else declines |
//! | `{{param:p}}`, `{{local:x}}` | the handle itself, in every mode |
//! | anything else | eager lowering, boxed |
//!
//! `??` and `?:` only get their own lowering when suspension is permitted.
//! In [`CompilerMode::AvoidSuspension`] they go through the eager path.
//!
//! # Example
//!
//! ```rust
//! use weaver_lazy::lower::{
//!     BasicEagerCompiler, LazyValueCompiler, StaticSuspensionAnalysis, SuspendingDetacher,
//!     TemplateVariables,
//! };
//! use weaver_lazy::parse_expr;
//!
//! let analysis = StaticSuspensionAnalysis::new();
//! let variables = TemplateVariables::new();
//! let eager = BasicEagerCompiler::new(&analysis, &variables);
//! let compiler = LazyValueCompiler::new(&eager, &analysis, &variables);
//!
//! let expr = parse_expr("{{param:x}} ?? 5").unwrap();
//! let mut detacher = SuspendingDetacher::new();
//! let code = compiler.compile(&expr, &mut detacher);
//! assert_eq!(code.code.suspension_points(), 1);
//! ```

pub mod analysis;
pub mod code;
pub mod detach;
pub mod eager;
pub mod mode;
pub mod variables;

pub use analysis::{StaticSuspensionAnalysis, SuspensionAnalysis};
pub use code::{Code, CodeKey, DataKind, Repr, ResumePoint, TypedCode};
pub use detach::{Detacher, SuspendingDetacher};
pub use eager::{BasicEagerCompiler, EagerCompiler};
pub use mode::CompilerMode;
pub use variables::{TemplateVariables, VariableLookup};

use tracing::{instrument, trace};

use crate::ast::{Expr, ExprKind, VarKind};
use crate::error::ModeError;

/// Outcome of a lazy lowering attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Lowered {
    /// The expression lowered to LazyValue-typed code.
    Representable(TypedCode),
    /// Not representable under the requested mode. The caller falls back
    /// to eager lowering. This is routine, not an error.
    Declined,
}

impl Lowered {
    pub fn is_declined(&self) -> bool {
        matches!(self, Lowered::Declined)
    }

    pub fn is_representable(&self) -> bool {
        !self.is_declined()
    }

    pub fn as_code(&self) -> Option<&TypedCode> {
        match self {
            Lowered::Representable(code) => Some(code),
            Lowered::Declined => None,
        }
    }

    pub fn into_option(self) -> Option<TypedCode> {
        match self {
            Lowered::Representable(code) => Some(code),
            Lowered::Declined => None,
        }
    }

    pub fn unwrap_or_else(self, fallback: impl FnOnce() -> TypedCode) -> TypedCode {
        match self {
            Lowered::Representable(code) => code,
            Lowered::Declined => fallback(),
        }
    }
}

/// How a print site should emit its expression.
#[derive(Debug, Clone, PartialEq)]
pub enum PrintPlan {
    /// Stream the handle through resolve-and-emit.
    Stream(TypedCode),
    /// Print an eagerly computed value.
    Value(TypedCode),
}

/// Permissions of one lowering request. Suspending strategies own the
/// detacher, so a permitted suspension always has somewhere to go.
enum Strategy<'d> {
    General(&'d mut dyn Detacher),
    AvoidSuspension,
    PreserveStreaming(&'d mut dyn Detacher),
}

impl<'d> Strategy<'d> {
    fn new(mode: CompilerMode, detacher: Option<&'d mut dyn Detacher>) -> Result<Self, ModeError> {
        match (mode, detacher) {
            (CompilerMode::AvoidSuspension, _) => Ok(Strategy::AvoidSuspension),
            (CompilerMode::General, Some(detacher)) => Ok(Strategy::General(detacher)),
            (CompilerMode::PreserveStreaming, Some(detacher)) => {
                Ok(Strategy::PreserveStreaming(detacher))
            }
            (CompilerMode::General | CompilerMode::PreserveStreaming, None) => {
                Err(ModeError::MissingDetacher)
            }
        }
    }

    fn mode(&self) -> CompilerMode {
        match self {
            Strategy::General(_) => CompilerMode::General,
            Strategy::AvoidSuspension => CompilerMode::AvoidSuspension,
            Strategy::PreserveStreaming(_) => CompilerMode::PreserveStreaming,
        }
    }

    fn allows_boxing(&self) -> bool {
        self.mode().allows_boxing()
    }

    fn detacher(&mut self) -> Option<&mut dyn Detacher> {
        match self {
            Strategy::General(detacher) | Strategy::PreserveStreaming(detacher) => Some(&mut **detacher),
            Strategy::AvoidSuspension => None,
        }
    }
}

/// Lowers expressions to LazyValue-typed code.
///
/// Holds only shared references to its collaborators. Each compile call
/// builds its own visitor, so one compiler can serve any number of
/// requests.
pub struct LazyValueCompiler<'a> {
    eager: &'a dyn EagerCompiler,
    analysis: &'a dyn SuspensionAnalysis,
    variables: &'a dyn VariableLookup,
}

impl<'a> LazyValueCompiler<'a> {
    pub fn new(
        eager: &'a dyn EagerCompiler,
        analysis: &'a dyn SuspensionAnalysis,
        variables: &'a dyn VariableLookup,
    ) -> Self {
        Self {
            eager,
            analysis,
            variables,
        }
    }

    /// Lower with boxing and suspension both permitted. Never declines.
    #[instrument(level = "trace", skip_all, fields(mode = %CompilerMode::General, span = %expr.span))]
    pub fn compile(&self, expr: &Expr, detacher: &mut dyn Detacher) -> TypedCode {
        match self.visitor(Strategy::General(detacher)).visit(expr) {
            Lowered::Representable(code) => code,
            Lowered::Declined => unreachable!("general lowering falls back to eager boxing"),
        }
    }

    /// Lower for a print site: suspension permitted, boxing not.
    #[instrument(level = "trace", skip_all, fields(mode = %CompilerMode::PreserveStreaming, span = %expr.span))]
    pub fn compile_preserving_streaming(
        &self,
        expr: &Expr,
        detacher: &mut dyn Detacher,
    ) -> Lowered {
        self.visitor(Strategy::PreserveStreaming(detacher)).visit(expr)
    }

    /// Lower for a binding or parameter value: boxing permitted, no
    /// suspension point is ever emitted.
    #[instrument(level = "trace", skip_all, fields(mode = %CompilerMode::AvoidSuspension, span = %expr.span))]
    pub fn compile_avoiding_suspension(&self, expr: &Expr) -> Lowered {
        self.visitor(Strategy::AvoidSuspension).visit(expr)
    }

    /// Lower under an explicit mode.
    ///
    /// A mode that permits suspension needs a detacher; without one this
    /// returns [`ModeError::MissingDetacher`] before anything is visited.
    /// A detacher passed with [`CompilerMode::AvoidSuspension`] is unused.
    #[instrument(level = "trace", skip_all, fields(mode = %mode, span = %expr.span))]
    pub fn compile_with_mode<'d>(
        &'d self,
        expr: &Expr,
        mode: CompilerMode,
        detacher: Option<&'d mut dyn Detacher>,
    ) -> Result<Lowered, ModeError> {
        let strategy = Strategy::new(mode, detacher)?;
        Ok(self.visitor(strategy).visit(expr))
    }

    /// Lower a print site, streaming when possible and falling back to an
    /// eager value otherwise.
    pub fn lower_print(&self, expr: &Expr, detacher: &mut dyn Detacher) -> PrintPlan {
        match self.compile_preserving_streaming(expr, &mut *detacher) {
            Lowered::Representable(code) => PrintPlan::Stream(code),
            Lowered::Declined => PrintPlan::Value(self.eager.compile(expr, detacher)),
        }
    }

    /// Lower a `let` binding. Keeps laziness without suspending when it
    /// can, otherwise computes the value eagerly and boxes it.
    pub fn lower_binding(&self, expr: &Expr, detacher: &mut dyn Detacher) -> TypedCode {
        self.compile_avoiding_suspension(expr)
            .unwrap_or_else(|| self.eager.compile(expr, detacher).boxed())
    }

    fn visitor<'d>(&'d self, strategy: Strategy<'d>) -> LazyVisitor<'d, 'a> {
        LazyVisitor {
            compiler: self,
            strategy,
        }
    }
}

struct LazyVisitor<'d, 'a> {
    compiler: &'d LazyValueCompiler<'a>,
    strategy: Strategy<'d>,
}

impl LazyVisitor<'_, '_> {
    fn visit(&mut self, expr: &Expr) -> Lowered {
        match &expr.node {
            ExprKind::Null => Lowered::Representable(TypedCode::null_provider()),
            ExprKind::NullCoalescing { left, right } => self.visit_null_coalescing(expr, left, right),
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => self.visit_conditional(expr, condition, then_branch, else_branch),
            ExprKind::Variable(var) => {
                let provider = match var.kind {
                    VarKind::Param => self.compiler.variables.param(&var.name),
                    VarKind::Local | VarKind::RangeLocal => self.compiler.variables.local(var),
                };
                if provider.repr.is_raw() {
                    self.box_raw(expr, provider)
                } else {
                    Lowered::Representable(provider)
                }
            }
            // Member access has no lazy form yet.
            ExprKind::DataAccess { .. } => self.visit_generic(expr),
            ExprKind::Literal(_)
            | ExprKind::ListLiteral(_)
            | ExprKind::BinaryOp { .. }
            | ExprKind::UnaryOp { .. }
            | ExprKind::FunctionCall(_) => self.visit_generic(expr),
        }
    }

    fn visit_null_coalescing(&mut self, expr: &Expr, left: &Expr, right: &Expr) -> Lowered {
        if self.strategy.detacher().is_none() {
            return self.visit_generic(expr);
        }
        let lazy_left = self.visit(left);
        let lazy_right = self.visit(right);
        if lazy_left.is_declined() && lazy_right.is_declined() {
            return self.visit_generic(expr);
        }

        let compiler = self.compiler;
        let requires_wait = compiler.analysis.requires_suspension(left);
        let Some(detacher) = self.strategy.detacher() else {
            unreachable!("checked above");
        };
        // Both sides must be handles so effects embedded in either survive.
        let right = match lazy_right {
            Lowered::Representable(code) => code,
            Lowered::Declined => compiler.eager.compile(right, &mut *detacher).boxed(),
        };
        let left = match lazy_left {
            Lowered::Representable(code) if requires_wait => detacher.wait_for(code),
            Lowered::Representable(code) => code,
            Lowered::Declined => compiler.eager.compile(left, &mut *detacher).boxed(),
        };
        Lowered::Representable(left.first_non_nullish(right))
    }

    fn visit_conditional(
        &mut self,
        expr: &Expr,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
    ) -> Lowered {
        if self.strategy.detacher().is_none() {
            return self.visit_generic(expr);
        }
        let lazy_then = self.visit(then_branch);
        let lazy_else = self.visit(else_branch);
        if lazy_then.is_declined() && lazy_else.is_declined() {
            trace!(span = %expr.span, "declined: neither branch lowers lazily");
            return Lowered::Declined;
        }

        let compiler = self.compiler;
        let Some(detacher) = self.strategy.detacher() else {
            unreachable!("checked above");
        };
        let condition = compiler.eager.compile(condition, &mut *detacher);
        let then_code = match lazy_then {
            Lowered::Representable(code) => code,
            Lowered::Declined => compiler.eager.compile(then_branch, &mut *detacher).boxed(),
        };
        let else_code = match lazy_else {
            Lowered::Representable(code) => code,
            Lowered::Declined => compiler.eager.compile(else_branch, &mut *detacher).boxed(),
        };
        Lowered::Representable(TypedCode::ternary(condition, then_code, else_code))
    }

    fn box_raw(&mut self, expr: &Expr, raw: TypedCode) -> Lowered {
        if self.strategy.allows_boxing() {
            Lowered::Representable(raw.boxed())
        } else {
            trace!(span = %expr.span, repr = %raw.repr, "declined: raw value and boxing not permitted");
            Lowered::Declined
        }
    }

    /// Eager lowering, boxed. Without suspension first, then with it.
    fn visit_generic(&mut self, expr: &Expr) -> Lowered {
        let eager = self.compiler.eager;
        if self.strategy.allows_boxing() {
            if let Some(code) = eager.compile_with_no_suspension(expr) {
                return Lowered::Representable(code.boxed());
            }
            if let Some(detacher) = self.strategy.detacher() {
                return Lowered::Representable(eager.compile(expr, detacher).boxed());
            }
        }
        trace!(span = %expr.span, mode = %self.strategy.mode(), "declined: no lazy lowering");
        Lowered::Declined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Value;
    use crate::ast::expr::{conditional, field, literal, local, null, param, range_local};

    struct Fixture {
        analysis: StaticSuspensionAnalysis,
        variables: TemplateVariables,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                analysis: StaticSuspensionAnalysis::new(),
                variables: TemplateVariables::new(),
            }
        }

        fn run<R>(&self, f: impl FnOnce(&LazyValueCompiler<'_>) -> R) -> R {
            let eager = BasicEagerCompiler::new(&self.analysis, &self.variables);
            let compiler = LazyValueCompiler::new(&eager, &self.analysis, &self.variables);
            f(&compiler)
        }
    }

    #[test]
    fn test_null_is_shared_provider_in_every_mode() {
        let fixture = Fixture::new();
        fixture.run(|compiler| {
            let mut detacher = SuspendingDetacher::new();
            for mode in CompilerMode::ALL {
                let lowered = compiler
                    .compile_with_mode(&null(), mode, Some(&mut detacher))
                    .expect("valid mode");
                assert_eq!(lowered, Lowered::Representable(TypedCode::null_provider()));
            }
        });
    }

    #[test]
    fn test_missing_detacher_rejected() {
        let fixture = Fixture::new();
        fixture.run(|compiler| {
            let err = compiler.compile_with_mode(&param("p"), CompilerMode::General, None);
            assert_eq!(err, Err(ModeError::MissingDetacher));
            let ok = compiler.compile_with_mode(&param("p"), CompilerMode::AvoidSuspension, None);
            assert!(ok.is_ok());
        });
    }

    #[test]
    fn test_params_and_locals_pass_through() {
        let fixture = Fixture::new();
        fixture.run(|compiler| {
            let mut detacher = SuspendingDetacher::new();
            let lowered = compiler.compile_preserving_streaming(&local("item"), &mut detacher);
            assert_eq!(
                lowered,
                Lowered::Representable(TypedCode::new(Code::Local("item".into()), Repr::Lazy))
            );
            let lowered = compiler.compile_avoiding_suspension(&param("p"));
            assert_eq!(
                lowered,
                Lowered::Representable(TypedCode::new(Code::Param("p".into()), Repr::Lazy))
            );
        });
    }

    #[test]
    fn test_literal_declines_when_streaming() {
        let fixture = Fixture::new();
        fixture.run(|compiler| {
            let mut detacher = SuspendingDetacher::new();
            assert!(
                compiler
                    .compile_preserving_streaming(&literal("text"), &mut detacher)
                    .is_declined()
            );
        });
    }

    #[test]
    fn test_data_access_uses_eager_path() {
        let fixture = Fixture::new();
        fixture.run(|compiler| {
            let mut detacher = SuspendingDetacher::new();
            let code = compiler.compile(&field(param("user"), "name", false), &mut detacher);
            assert!(matches!(code.code, Code::Access { .. }));
            assert_eq!(code.code.suspension_points(), 1);
        });
    }

    #[test]
    fn test_conditional_with_raw_branches_declines_when_streaming() {
        let fixture = Fixture::new();
        fixture.run(|compiler| {
            let mut detacher = SuspendingDetacher::new();
            let expr = conditional(param("c"), range_local("i"), literal(1));
            assert!(
                compiler
                    .compile_preserving_streaming(&expr, &mut detacher)
                    .is_declined()
            );
            assert_eq!(detacher.points_allocated(), 0);
        });
    }

    #[test]
    fn test_lower_print_falls_back_to_value() {
        let fixture = Fixture::new();
        fixture.run(|compiler| {
            let mut detacher = SuspendingDetacher::new();
            match compiler.lower_print(&literal(3), &mut detacher) {
                PrintPlan::Value(code) => {
                    assert_eq!(code, TypedCode::constant(Value::Int(3)));
                }
                PrintPlan::Stream(code) => panic!("expected eager value, got {code:?}"),
            }
            assert!(matches!(
                compiler.lower_print(&param("p"), &mut detacher),
                PrintPlan::Stream(_)
            ));
        });
    }

    #[test]
    fn test_lower_binding_never_suspends_when_avoidable() {
        let fixture = Fixture::new();
        fixture.run(|compiler| {
            let mut detacher = SuspendingDetacher::new();
            let code = compiler.lower_binding(&range_local("i"), &mut detacher);
            assert_eq!(code.repr, Repr::Data(DataKind::Int));
            assert_eq!(detacher.points_allocated(), 0);
        });
    }
}
