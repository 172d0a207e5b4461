//! Function registration for expressions.
//!
//! The [`Registry`] stores the pure functions that expressions can call,
//! as in `upper({{param:name}})`. The host populates it before running
//! lowered code.
//!
//! - **Closure-based**: [`ClosureFunction`] for the common case.
//! - **Trait-based**: implement [`WeaverFunction`] directly to declare a
//!   signature with arity and argument types, which the registry checks
//!   before dispatch.

use std::collections::HashMap;

use crate::ast::value::Value;
use crate::error::{ExecError, ExecErrorKind};

/// A callable function, invoked via `name(args)` in expressions.
///
/// Functions receive fully resolved arguments and return a plain value.
/// They cannot suspend: any lazy argument is resolved before the call.
pub trait WeaverFunction: Send + Sync {
    fn call(&self, args: Vec<Value>) -> Result<Value, ExecError>;

    /// Declare this function's identity and parameter expectations.
    fn signature(&self) -> FunctionSignature;
}

/// Describes a function's name and expected parameters.
#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<ParamDef>,
    /// Accept any number of trailing arguments beyond `params`.
    pub variadic: bool,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            variadic: true,
        }
    }

    pub fn param(mut self, name: impl Into<String>, expected_type: ValueType) -> Self {
        self.params.push(ParamDef {
            name: name.into(),
            expected_type: Some(expected_type),
            required: true,
        });
        self.variadic = false;
        self
    }

    /// Check `args` against the declared parameters.
    pub fn validate(&self, args: &[Value]) -> Result<(), ExecError> {
        let required = self.params.iter().filter(|p| p.required).count();
        if args.len() < required || (!self.variadic && args.len() > self.params.len()) {
            return Err(ExecError::new(
                ExecErrorKind::TypeError,
                format!(
                    "{} expects {} argument(s), got {}",
                    self.name,
                    self.params.len(),
                    args.len()
                ),
            ));
        }
        for (param, arg) in self.params.iter().zip(args) {
            if let Some(expected) = param.expected_type
                && !expected.matches(arg)
            {
                return Err(ExecError::type_error(
                    &format!("{expected:?} for `{}` of {}", param.name, self.name),
                    arg.type_name(),
                ));
            }
        }
        Ok(())
    }
}

/// A positional parameter definition for a function signature.
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: String,
    pub expected_type: Option<ValueType>,
    pub required: bool,
}

/// Type tag used in signatures for runtime validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Int,
    /// Int or float.
    Number,
    Bool,
    List,
    /// Accepts any value type.
    Any,
}

impl ValueType {
    /// Check whether a runtime [`Value`] matches this type expectation.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::Any => true,
            ValueType::String => matches!(value, Value::String(_)),
            ValueType::Int => matches!(value, Value::Int(_)),
            ValueType::Number => matches!(value, Value::Int(_) | Value::Float(_)),
            ValueType::Bool => matches!(value, Value::Bool(_)),
            ValueType::List => matches!(value, Value::List(_)),
        }
    }
}

/// Stores registered functions for use during execution.
///
/// ```rust
/// use weaver_lazy::{ClosureFunction, Registry, Value};
///
/// let mut registry = Registry::new();
/// registry.register_function(ClosureFunction::new("upper", |args| {
///     let s = args.first().and_then(|v| v.as_string()).unwrap_or("");
///     Ok(Value::String(s.to_uppercase()))
/// }));
///
/// let out = registry.call_function("upper", vec!["hi".into()]).unwrap();
/// assert_eq!(out, Value::from("HI"));
/// ```
#[derive(Default)]
pub struct Registry {
    functions: HashMap<String, Box<dyn WeaverFunction>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function. If a function with the same name already
    /// exists, it is replaced.
    pub fn register_function(&mut self, func: impl WeaverFunction + 'static) {
        let sig = func.signature();
        self.functions.insert(sig.name, Box::new(func));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Dispatch a function call. Returns [`ExecError`] if the function is
    /// not registered or the arguments do not match its signature.
    pub fn call_function(&self, name: &str, args: Vec<Value>) -> Result<Value, ExecError> {
        match self.functions.get(name) {
            Some(func) => {
                func.signature().validate(&args)?;
                func.call(args)
            }
            None => Err(ExecError::undefined_function(name)),
        }
    }
}

/// A [`WeaverFunction`] implementation backed by a closure. Accepts any
/// number of arguments of any type.
///
/// ```rust
/// use weaver_lazy::{ClosureFunction, Value};
///
/// let len = ClosureFunction::new("len", |args| {
///     let n = args.first().and_then(|v| v.as_list()).map_or(0, |l| l.len());
///     Ok(Value::Int(n as i64))
/// });
/// ```
pub struct ClosureFunction<F>
where
    F: Fn(Vec<Value>) -> Result<Value, ExecError> + Send + Sync,
{
    sig: FunctionSignature,
    func: F,
}

impl<F> ClosureFunction<F>
where
    F: Fn(Vec<Value>) -> Result<Value, ExecError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            sig: FunctionSignature::new(name),
            func,
        }
    }
}

impl<F> WeaverFunction for ClosureFunction<F>
where
    F: Fn(Vec<Value>) -> Result<Value, ExecError> + Send + Sync,
{
    fn call(&self, args: Vec<Value>) -> Result<Value, ExecError> {
        (self.func)(args)
    }

    fn signature(&self) -> FunctionSignature {
        self.sig.clone()
    }
}
