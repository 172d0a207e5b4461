use std::collections::HashMap;

use crate::ast::{VarKind, VariableRef};

use super::code::{Code, Repr, TypedCode};

/// Supplies the generated code for reading a variable.
///
/// Implementations decide how each variable is stored; the lowering rules
/// only look at the resulting [`Repr`].
pub trait VariableLookup {
    fn param(&self, name: &str) -> TypedCode;
    fn local(&self, var: &VariableRef) -> TypedCode;
}

/// Storage layout of a single template: parameters are lazy handles,
/// locals are lazy unless declared otherwise, range locals are raw ints.
#[derive(Debug, Default, Clone)]
pub struct TemplateVariables {
    local_reprs: HashMap<String, Repr>,
}

impl TemplateVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how the local `name` is stored.
    pub fn declare_local(&mut self, name: impl Into<String>, repr: Repr) {
        self.local_reprs.insert(name.into(), repr);
    }

    pub fn with_local(mut self, name: impl Into<String>, repr: Repr) -> Self {
        self.declare_local(name, repr);
        self
    }
}

impl VariableLookup for TemplateVariables {
    fn param(&self, name: &str) -> TypedCode {
        TypedCode::new(Code::Param(name.to_string()), Repr::Lazy)
    }

    fn local(&self, var: &VariableRef) -> TypedCode {
        let repr = match self.local_reprs.get(&var.name) {
            Some(repr) => *repr,
            None if var.kind == VarKind::RangeLocal => Repr::RawInt,
            None => Repr::Lazy,
        };
        TypedCode::new(Code::Local(var.name.clone()), repr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::code::DataKind;

    #[test]
    fn test_default_layout() {
        let vars = TemplateVariables::new();
        assert_eq!(vars.param("p").repr, Repr::Lazy);
        assert_eq!(vars.local(&VariableRef::new(VarKind::Local, "x")).repr, Repr::Lazy);
        assert_eq!(
            vars.local(&VariableRef::new(VarKind::RangeLocal, "i")).repr,
            Repr::RawInt
        );
    }

    #[test]
    fn test_declared_local() {
        let vars = TemplateVariables::new().with_local("title", Repr::Data(DataKind::String));
        let code = vars.local(&VariableRef::new(VarKind::Local, "title"));
        assert_eq!(code.code, Code::Local("title".into()));
        assert_eq!(code.repr, Repr::Data(DataKind::String));
    }
}
