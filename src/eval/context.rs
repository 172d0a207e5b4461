use std::collections::HashMap;

use crate::ast::value::Value;
use crate::error::ExecError;

use super::lazy::{LazyValue, Slot};

/// Trait implemented by the host application to supply template state to
/// the executor.
///
/// Parameters are always handed out as [`LazyValue`]s, so the host can
/// return a pending handle for data that is still loading and complete it
/// later. Locals are whatever the enclosing template stored: a plain value
/// for range loop counters, a handle for everything else.
///
/// # Implementor's note
///
/// Returning the *same* handle for repeated lookups of one parameter is
/// what lets a resumed run observe a value completed while it was detached.
/// Creating a fresh pending handle per call would never become ready.
pub trait RenderContext {
    /// Look up a template parameter.
    ///
    /// Return `Ok(None)` if the parameter does not exist. The executor
    /// will produce an "undefined variable" error in that case.
    fn resolve_param(&self, name: &str) -> Result<Option<LazyValue>, ExecError>;

    /// Look up a local binding.
    fn resolve_local(&self, name: &str) -> Result<Option<Slot>, ExecError>;
}

/// A minimal [`RenderContext`] implementation for testing and single-file use.
///
/// ```rust
/// use weaver_lazy::{LazyValue, SimpleContext, Value};
///
/// let mut ctx = SimpleContext::new();
/// ctx.set_param("title", "Dune");
/// let slow = LazyValue::pending();
/// ctx.set_param_lazy("reviews", slow.clone());
/// ctx.set_local("i", 3i64);
/// ```
#[derive(Debug, Default)]
pub struct SimpleContext {
    params: HashMap<String, LazyValue>,
    locals: HashMap<String, Slot>,
}

impl SimpleContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter to an already-resolved value. Accepts any type that
    /// implements `Into<Value>`.
    pub fn set_param(&mut self, name: &str, value: impl Into<Value>) {
        self.set_param_lazy(name, LazyValue::resolved(value.into()));
    }

    pub fn set_param_lazy(&mut self, name: &str, lazy: LazyValue) {
        self.params.insert(name.to_string(), lazy);
    }

    /// Set a local to a plain value.
    pub fn set_local(&mut self, name: &str, value: impl Into<Value>) {
        self.locals.insert(name.to_string(), Slot::Value(value.into()));
    }

    pub fn set_local_lazy(&mut self, name: &str, lazy: LazyValue) {
        self.locals.insert(name.to_string(), Slot::Lazy(lazy));
    }
}

impl RenderContext for SimpleContext {
    fn resolve_param(&self, name: &str) -> Result<Option<LazyValue>, ExecError> {
        Ok(self.params.get(name).cloned())
    }

    fn resolve_local(&self, name: &str) -> Result<Option<Slot>, ExecError> {
        Ok(self.locals.get(name).cloned())
    }
}
