//! Error types for parsing, lowering and execution.
//!
//! [`ParseError`] is produced by the expression parser and carries source
//! spans for diagnostic formatting. [`ModeError`] rejects an unusable
//! compiler configuration up front. [`ExecError`] is produced while running
//! lowered code and can originate from the executor, the function registry,
//! or the host's [`RenderContext`](crate::eval::RenderContext).
//!
//! Declining to lower an expression lazily is *not* an error; see
//! [`Lowered::Declined`](crate::Lowered::Declined).

use crate::ast::span::Span;
use std::sync::Arc;
use thiserror::Error;

// ── Parse errors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseError {
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
}

impl ParseError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Format the error with source context for display
    pub fn format_with_source(&self, source: &str) -> String {
        let (line, col) = offset_to_line_col(source, self.span.start);
        let source_line = source.lines().nth(line.saturating_sub(1)).unwrap_or("");

        let pointer = " ".repeat(col.saturating_sub(1))
            + &"^".repeat((self.span.end.saturating_sub(self.span.start)).max(1));

        let mut output = format!(
            "Error: {}\n --> {line}:{col}\n  |\n{line:>3} | {source_line}\n    | {pointer}",
            self.message
        );

        if let Some(hint) = &self.hint {
            output.push_str(&format!("\n  = hint: {hint}"));
        }

        output
    }
}

fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

// ── Mode errors ─────────────────────────────────────────────────────────

/// Rejected compiler configuration. Raised once, when the mode or the
/// compile request is built, never while walking a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("compiler mode must permit boxing, suspension, or both")]
    NothingPermitted,
    #[error("a mode that permits suspension needs a detacher")]
    MissingDetacher,
}

// ── Exec errors ─────────────────────────────────────────────────────────

/// An error that occurs while running lowered code.
///
/// Carries a structured [`ExecErrorKind`], a human-readable message,
/// an optional source [`Span`], and an optional underlying error cause.
///
/// # Error chaining
///
/// A host whose [`RenderContext`](crate::eval::RenderContext) fails for an
/// underlying reason (database, I/O, ...) can preserve the original error
/// with [`with_source`](ExecError::with_source):
///
/// ```rust
/// use weaver_lazy::ExecError;
///
/// fn example() -> Result<(), ExecError> {
///     let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
///     Err(ExecError::host_error("failed to load param").with_source(io_err))
/// }
/// ```
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ExecError {
    pub kind: ExecErrorKind,
    pub span: Option<Span>,
    pub message: String,
    /// The underlying error that caused this one, if any.
    ///
    /// Wrapped in `Arc` so that `ExecError` remains `Clone`.
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ExecError {
    pub fn new(kind: ExecErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            span: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach an underlying error cause to this error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    // Convenience constructors for common error types

    pub fn undefined_variable(scope: &str, name: &str) -> Self {
        Self::new(
            ExecErrorKind::UndefinedVariable,
            format!("undefined variable: {scope}:{name}"),
        )
    }

    pub fn undefined_function(name: &str) -> Self {
        Self::new(
            ExecErrorKind::UndefinedFunction,
            format!("undefined function: {name}"),
        )
    }

    pub fn type_error(expected: &str, got: &str) -> Self {
        Self::new(
            ExecErrorKind::TypeError,
            format!("expected {expected}, got {got}"),
        )
    }

    pub fn not_ready() -> Self {
        Self::new(
            ExecErrorKind::NotReady,
            "lazy value resolved before it was ready and outside a suspension point",
        )
    }

    pub fn host_error(message: impl Into<String>) -> Self {
        Self::new(ExecErrorKind::HostError, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    UndefinedVariable,
    UndefinedFunction,
    TypeError,
    ArithmeticError,
    /// Field access, index access or `!` applied to `null`/`undefined`.
    NullAccess,
    /// A pending lazy value was resolved without going through a
    /// suspension point. The suspension analysis and the lowered code
    /// disagree with the actual state of the value.
    NotReady,
    /// A lazy value was completed twice.
    AlreadyResolved,
    /// The run exceeded a configured resource limit.
    ResourceLimit,
    /// The run was cancelled via an external cancellation token.
    Cancelled,
    HostError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_with_source() {
        let err = ParseError::new(Span::new(4, 6), "unexpected token").with_hint("try `??`");
        let formatted = err.format_with_source("a ? ?? b");
        assert!(formatted.contains("1:5"));
        assert!(formatted.contains("    ^^"));
        assert!(formatted.contains("hint: try `??`"));
    }

    #[test]
    fn test_error_chaining() {
        let io_err = std::io::Error::other("backend down");
        let err = ExecError::host_error("param fetch failed").with_source(io_err);
        let source = std::error::Error::source(&err).expect("source attached");
        assert_eq!(source.to_string(), "backend down");
    }

    #[test]
    fn test_error_cloneable_with_source() {
        let err = ExecError::host_error("x").with_source(std::io::Error::other("y"));
        let cloned = err.clone();
        assert_eq!(cloned.kind, ExecErrorKind::HostError);
        assert!(cloned.source.is_some());
    }
}
