//! # weaver-lazy
//!
//! The expression-lowering stage of a streaming template compiler. For each
//! expression in a template it decides whether the generated code hands back
//! a lazily resolvable handle ([`LazyValue`]), computes a value eagerly and
//! boxes it, or declines so the caller can compile it eagerly instead.
//!
//! The crate is split into layers:
//!
//! - **Syntax** ([`ast`], [`parser`], [`printer`]): expression trees, the
//!   operator table, a small surface notation and a precedence-aware
//!   printer.
//! - **Lowering** ([`lower`]): the [`LazyValueCompiler`](lower::LazyValueCompiler)
//!   and the collaborators it consults, each behind a trait.
//! - **Execution** ([`eval`]): a resumable executor that runs lowered code
//!   and detaches at suspension points whose value is still pending.
//!
//! ## Quick start
//!
//! ```rust
//! use weaver_lazy::{render, Registry, SimpleContext};
//!
//! let mut ctx = SimpleContext::new();
//! ctx.set_param("name", "Alice");
//!
//! let registry = Registry::new();
//! let output = render(r#"{{param:nick}} ?? {{param:name}}"#, &ctx, &registry);
//! assert!(output.is_err()); // `nick` is not a parameter
//!
//! ctx.set_param("nick", weaver_lazy::Value::Null);
//! let output = render(r#"{{param:nick}} ?? {{param:name}}"#, &ctx, &registry).unwrap();
//! assert_eq!(output, "Alice");
//! ```
//!
//! ## Streaming with detach and resume
//!
//! Compile once with [`CompiledExpr::compile`], then drive a [`Frame`]
//! yourself. A pending parameter makes the frame detach; completing it and
//! running again resumes where the frame stopped.
//!
//! ```rust
//! use weaver_lazy::{CompiledExpr, LazyValue, Registry, SimpleContext, Step, Value};
//!
//! let expr = CompiledExpr::compile("{{param:user}} ?? \"guest\"").unwrap();
//! let registry = Registry::new();
//!
//! let user = LazyValue::pending();
//! let mut ctx = SimpleContext::new();
//! ctx.set_param_lazy("user", user.clone());
//!
//! let mut frame = expr.frame();
//! assert!(matches!(frame.run(&ctx, &registry).unwrap(), Step::Detached { .. }));
//!
//! user.complete(Value::from("ada")).unwrap();
//! let Step::Done(slot) = frame.run(&ctx, &registry).unwrap() else {
//!     unreachable!()
//! };
//! let mut out = String::new();
//! slot.render(&mut out).unwrap();
//! assert_eq!(out, "ada");
//! ```
//!
//! ## Execution options
//!
//! Use [`ExecOptions`] to bound the work a run may do:
//!
//! ```rust
//! use weaver_lazy::{render_with_options, ExecErrorKind, ExecOptions, Registry, RenderError, SimpleContext};
//!
//! let ctx = SimpleContext::new();
//! let registry = Registry::new();
//! let opts = ExecOptions::new().max_instructions(2);
//!
//! let err = render_with_options("1 + 2 * 3", &ctx, &registry, opts).unwrap_err();
//! assert!(matches!(err, RenderError::Exec(e) if e.kind == ExecErrorKind::ResourceLimit));
//! ```

// The derive in `weaver_macros` names paths through `weaver_lazy::`.
extern crate self as weaver_lazy;

pub mod ast;
pub mod error;
pub mod eval;
pub mod lower;
pub mod parser;
pub mod printer;
pub mod registry;

pub use ast::{Associativity, Expr, ExprKind, Operator, Precedence, Span, Spanned, Value};
pub use error::{ExecError, ExecErrorKind, ModeError, ParseError};
pub use eval::{
    ExecOptions, Frame, LazyValue, Program, RenderContext, SimpleContext, Slot, Step, drive,
};
pub use lower::{CompilerMode, Lowered, PrintPlan, TypedCode};
pub use parser::parse_expr;
pub use printer::print_expr;
pub use registry::{ClosureFunction, Registry, WeaverFunction};

use lower::{
    BasicEagerCompiler, LazyValueCompiler, StaticSuspensionAnalysis, SuspendingDetacher,
    TemplateVariables,
};

/// Parse, lower and run a print-site expression in a single step.
///
/// Every parameter the context supplies must already be ready. A pending
/// one surfaces as [`ExecErrorKind::NotReady`]; drive a [`Frame`] from
/// [`CompiledExpr::frame`] to suspend and resume instead.
pub fn render(
    source: &str,
    ctx: &impl RenderContext,
    registry: &Registry,
) -> Result<String, RenderError> {
    render_with_options(source, ctx, registry, ExecOptions::default())
}

/// [`render`] with explicit [`ExecOptions`].
pub fn render_with_options(
    source: &str,
    ctx: &impl RenderContext,
    registry: &Registry,
    options: ExecOptions,
) -> Result<String, RenderError> {
    let expr = CompiledExpr::compile(source).map_err(RenderError::Parse)?;
    expr.render_with_options(ctx, registry, options)
        .map_err(RenderError::Exec)
}

/// Combined error type returned by [`render`] and [`render_with_options`].
#[derive(Debug)]
pub enum RenderError {
    /// One or more errors occurred during parsing.
    Parse(Vec<ParseError>),
    /// An error occurred while running the lowered code.
    Exec(ExecError),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Parse(errors) => {
                for e in errors {
                    writeln!(f, "{e}")?;
                }
                Ok(())
            }
            RenderError::Exec(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RenderError {}

/// A print-site expression, parsed and lowered once with the reference
/// collaborators.
///
/// Every parameter and plain local is treated as possibly pending, and
/// range locals as raw integers.
pub struct CompiledExpr {
    expr: Expr,
    program: Program,
    streaming: bool,
}

impl CompiledExpr {
    pub fn compile(source: &str) -> Result<Self, Vec<ParseError>> {
        let expr = parse_expr(source)?;
        let analysis = StaticSuspensionAnalysis::new();
        let variables = TemplateVariables::new();
        let eager = BasicEagerCompiler::new(&analysis, &variables);
        let compiler = LazyValueCompiler::new(&eager, &analysis, &variables);

        let (code, streaming) = match compiler.lower_print(&expr, &mut SuspendingDetacher::new()) {
            PrintPlan::Stream(code) => (code, true),
            PrintPlan::Value(code) => (code, false),
        };
        Ok(Self {
            program: Program::assemble(&code),
            expr,
            streaming,
        })
    }

    /// Whether the print site streams a handle directly rather than an
    /// eagerly computed value.
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// A fresh frame over this expression's program.
    pub fn frame(&self) -> Frame<'_> {
        Frame::new(&self.program)
    }

    pub fn render(&self, ctx: &impl RenderContext, registry: &Registry) -> Result<String, ExecError> {
        self.render_with_options(ctx, registry, ExecOptions::default())
    }

    /// Run to completion and write the result, effects first. Detaching
    /// is an error here.
    pub fn render_with_options(
        &self,
        ctx: &impl RenderContext,
        registry: &Registry,
        options: ExecOptions,
    ) -> Result<String, ExecError> {
        let slot = drive(&self.program, ctx, registry, options, |point, _| {
            Err(ExecError::new(
                ExecErrorKind::NotReady,
                format!(
                    "`{}` detached at {point} with no driver to resume it",
                    print_expr(&self.expr)
                ),
            )
            .with_span(self.expr.span))
        })?;
        let mut out = String::new();
        slot.render(&mut out)?;
        Ok(out)
    }

    /// Access the underlying AST for inspection.
    pub fn ast(&self) -> &Expr {
        &self.expr
    }
}
