//! Suspension-point insertion.
//!
//! At compile time a [`Detacher`] does not suspend anything itself. It marks
//! the places in generated code where the running computation must wait for
//! a handle, and assigns each place a [`ResumePoint`]. The executor honors
//! those points at run time.

use tracing::trace;

use super::code::{Code, ResumePoint, TypedCode};

pub trait Detacher {
    /// Wrap `provider` so that, when run, it waits until the handle is
    /// resolved. The returned code yields the same handle, now ready.
    fn wait_for(&mut self, provider: TypedCode) -> TypedCode;
}

/// Allocates sequential resume points.
#[derive(Debug, Default)]
pub struct SuspendingDetacher {
    next: u32,
}

impl SuspendingDetacher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of suspension points inserted so far.
    pub fn points_allocated(&self) -> u32 {
        self.next
    }
}

impl Detacher for SuspendingDetacher {
    fn wait_for(&mut self, provider: TypedCode) -> TypedCode {
        // A boxed value is resolved by construction.
        if provider.repr.is_resolved_value() {
            return provider;
        }
        let point = ResumePoint(self.next);
        self.next += 1;
        trace!(%point, "inserted suspension point");
        TypedCode::new(
            Code::WaitFor {
                provider: Box::new(provider.code),
                point,
            },
            provider.repr,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Value;
    use crate::lower::code::Repr;

    #[test]
    fn test_points_are_sequential() {
        let mut detacher = SuspendingDetacher::new();
        let a = detacher.wait_for(TypedCode::new(Code::Param("a".into()), Repr::Lazy));
        let b = detacher.wait_for(TypedCode::new(Code::Param("b".into()), Repr::Lazy));
        assert!(matches!(a.code, Code::WaitFor { point: ResumePoint(0), .. }));
        assert!(matches!(b.code, Code::WaitFor { point: ResumePoint(1), .. }));
        assert_eq!(detacher.points_allocated(), 2);
    }

    #[test]
    fn test_resolved_value_skips_point() {
        let mut detacher = SuspendingDetacher::new();
        let boxed = TypedCode::constant(Value::Int(1)).boxed();
        let out = detacher.wait_for(boxed.clone());
        assert_eq!(out, boxed);
        assert_eq!(detacher.points_allocated(), 0);
    }
}
