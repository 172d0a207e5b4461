use std::fmt;

use crate::error::ModeError;

/// Which of boxing and suspension a lowering request may use.
///
/// Permitting neither is not a mode: [`CompilerMode::new`] rejects it, so
/// every value of this type allows at least one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompilerMode {
    /// Boxing and suspension both permitted. Never declines.
    #[default]
    General,
    /// Boxing only. Used for `let` bindings and parameter values: laziness
    /// is kept where it is free, but no suspension point is ever emitted.
    AvoidSuspension,
    /// Suspension only. Used for print sites, where the caller streams the
    /// result through its native resolve-and-emit operation.
    PreserveStreaming,
}

impl CompilerMode {
    pub fn new(allows_boxing: bool, allows_suspension: bool) -> Result<Self, ModeError> {
        match (allows_boxing, allows_suspension) {
            (true, true) => Ok(CompilerMode::General),
            (true, false) => Ok(CompilerMode::AvoidSuspension),
            (false, true) => Ok(CompilerMode::PreserveStreaming),
            (false, false) => Err(ModeError::NothingPermitted),
        }
    }

    pub fn allows_boxing(self) -> bool {
        !matches!(self, CompilerMode::PreserveStreaming)
    }

    pub fn allows_suspension(self) -> bool {
        !matches!(self, CompilerMode::AvoidSuspension)
    }

    /// Every mode, from most to least permissive.
    pub const ALL: [CompilerMode; 3] = [
        CompilerMode::General,
        CompilerMode::AvoidSuspension,
        CompilerMode::PreserveStreaming,
    ];

    /// True when every permission of `other` is also granted here.
    pub fn permits_all_of(self, other: CompilerMode) -> bool {
        (self.allows_boxing() || !other.allows_boxing())
            && (self.allows_suspension() || !other.allows_suspension())
    }
}

impl fmt::Display for CompilerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompilerMode::General => f.write_str("general"),
            CompilerMode::AvoidSuspension => f.write_str("avoid-suspension"),
            CompilerMode::PreserveStreaming => f.write_str("preserve-streaming"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_empty_mode() {
        assert_eq!(CompilerMode::new(false, false), Err(ModeError::NothingPermitted));
    }

    #[test]
    fn test_flags_round_trip() {
        for mode in CompilerMode::ALL {
            let rebuilt = CompilerMode::new(mode.allows_boxing(), mode.allows_suspension());
            assert_eq!(rebuilt, Ok(mode));
        }
    }

    #[test]
    fn test_permission_order() {
        assert!(CompilerMode::General.permits_all_of(CompilerMode::AvoidSuspension));
        assert!(CompilerMode::General.permits_all_of(CompilerMode::PreserveStreaming));
        assert!(!CompilerMode::AvoidSuspension.permits_all_of(CompilerMode::PreserveStreaming));
        assert!(!CompilerMode::PreserveStreaming.permits_all_of(CompilerMode::General));
    }
}
