//! Runtime lazy values.
//!
//! A [`LazyValue`] is a shared handle to a value that may not exist yet.
//! The host creates pending handles for slow data and completes them later,
//! possibly from another thread. A handle can also carry *effects*: output
//! that must be emitted before its value whenever the handle itself is
//! rendered. Passing the handle through `??` or `?:` keeps the effects;
//! resolving it to a plain [`Value`] drops them.

use std::fmt;
use std::sync::{Arc, LazyLock, OnceLock};

use crate::ast::Value;
use crate::error::{ExecError, ExecErrorKind};

struct LazyCell {
    value: OnceLock<Value>,
    effects: Vec<String>,
}

/// A lazily resolvable value. Cloning shares the underlying cell.
#[derive(Clone)]
pub struct LazyValue(Arc<LazyCell>);

static NULL: LazyLock<LazyValue> = LazyLock::new(|| LazyValue::resolved(Value::Null));

impl LazyValue {
    pub fn pending() -> Self {
        Self::pending_with_effects(Vec::new())
    }

    /// A pending value that emits `effects` ahead of its text when rendered.
    pub fn pending_with_effects(effects: Vec<String>) -> Self {
        Self(Arc::new(LazyCell {
            value: OnceLock::new(),
            effects,
        }))
    }

    pub fn resolved(value: Value) -> Self {
        Self::resolved_with_effects(value, Vec::new())
    }

    pub fn resolved_with_effects(value: Value, effects: Vec<String>) -> Self {
        Self(Arc::new(LazyCell {
            value: OnceLock::from(value),
            effects,
        }))
    }

    /// The process-wide null handle. Every call returns the same cell.
    pub fn null() -> Self {
        NULL.clone()
    }

    /// Supply the value of a pending handle.
    pub fn complete(&self, value: Value) -> Result<(), ExecError> {
        self.0.value.set(value).map_err(|_| {
            ExecError::new(ExecErrorKind::AlreadyResolved, "lazy value completed twice")
        })
    }

    pub fn is_ready(&self) -> bool {
        self.0.value.get().is_some()
    }

    /// The resolved value. Never blocks: a pending handle is an error.
    pub fn resolve(&self) -> Result<&Value, ExecError> {
        self.0.value.get().ok_or_else(ExecError::not_ready)
    }

    /// `Some(self)` unless the resolved value is `null` or `undefined`.
    pub fn or_nullish(&self) -> Result<Option<LazyValue>, ExecError> {
        Ok((!self.resolve()?.is_nullish()).then(|| self.clone()))
    }

    pub fn effects(&self) -> &[String] {
        &self.0.effects
    }

    /// Emit the effects, then the value's text.
    pub fn render_and_resolve(&self, out: &mut String) -> Result<(), ExecError> {
        let value = self.resolve()?;
        for effect in &self.0.effects {
            out.push_str(effect);
        }
        out.push_str(&value.to_output_string());
        Ok(())
    }

    /// Whether both handles share one cell.
    pub fn ptr_eq(&self, other: &LazyValue) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("LazyValue");
        match self.0.value.get() {
            Some(value) => s.field("value", value),
            None => s.field("value", &format_args!("<pending>")),
        };
        s.field("effects", &self.0.effects.len()).finish()
    }
}

/// What an executor register holds: a plain value or a handle.
#[derive(Debug, Clone)]
pub enum Slot {
    Value(Value),
    Lazy(LazyValue),
}

impl Slot {
    /// The plain value, resolving a handle if needed.
    pub fn value(&self) -> Result<Value, ExecError> {
        match self {
            Slot::Value(value) => Ok(value.clone()),
            Slot::Lazy(lazy) => lazy.resolve().cloned(),
        }
    }

    /// View as a handle, wrapping a plain value in a resolved one.
    pub fn into_lazy(self) -> LazyValue {
        match self {
            Slot::Value(value) => LazyValue::resolved(value),
            Slot::Lazy(lazy) => lazy,
        }
    }

    /// The handle this slot is waiting on, if it is not ready.
    pub fn pending(&self) -> Option<&LazyValue> {
        match self {
            Slot::Lazy(lazy) if !lazy.is_ready() => Some(lazy),
            _ => None,
        }
    }

    /// Write the slot as output. Handles emit their effects first.
    pub fn render(&self, out: &mut String) -> Result<(), ExecError> {
        match self {
            Slot::Value(value) => {
                out.push_str(&value.to_output_string());
                Ok(())
            }
            Slot::Lazy(lazy) => lazy.render_and_resolve(out),
        }
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Slot::Value(value)
    }
}

impl From<LazyValue> for Slot {
    fn from(lazy: LazyValue) -> Self {
        Slot::Lazy(lazy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_shared() {
        assert!(LazyValue::null().ptr_eq(&LazyValue::null()));
        assert_eq!(LazyValue::null().resolve().unwrap(), &Value::Null);
    }

    #[test]
    fn test_pending_then_complete() {
        let lazy = LazyValue::pending();
        let err = lazy.resolve().unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::NotReady);

        let shared = lazy.clone();
        lazy.complete(Value::Int(3)).unwrap();
        assert!(shared.is_ready());
        assert_eq!(shared.resolve().unwrap(), &Value::Int(3));

        let err = lazy.complete(Value::Int(4)).unwrap_err();
        assert_eq!(err.kind, ExecErrorKind::AlreadyResolved);
    }

    #[test]
    fn test_or_nullish() {
        let present = LazyValue::resolved(Value::from("x"));
        assert!(present.or_nullish().unwrap().is_some_and(|v| v.ptr_eq(&present)));
        assert!(LazyValue::resolved(Value::Undefined).or_nullish().unwrap().is_none());
    }

    #[test]
    fn test_render_emits_effects_first() {
        let lazy = LazyValue::resolved_with_effects(Value::Int(5), vec!["<log>".into()]);
        let mut out = String::new();
        lazy.render_and_resolve(&mut out).unwrap();
        assert_eq!(out, "<log>5");

        let mut plain = String::new();
        Slot::Value(lazy.resolve().unwrap().clone())
            .render(&mut plain)
            .unwrap();
        assert_eq!(plain, "5");
    }

    #[test]
    fn test_completed_from_other_thread() {
        let lazy = LazyValue::pending();
        let handle = lazy.clone();
        std::thread::spawn(move || handle.complete(Value::Bool(true)))
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(lazy.resolve().unwrap(), &Value::Bool(true));
    }
}
