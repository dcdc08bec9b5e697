//! Identifier service.
//!
//! Surrogate ids are derived from an allocation scope and a counter that only
//! grows. Each document set is its own scope; shared reference data
//! (organizations, pharmacologic classes) lives in [`REFERENCE_SCOPE`].

use spl_model::{Handle, SetId, SurrogateId};

/// Scope for rows shared across document sets.
pub const REFERENCE_SCOPE: &str = "reference";

pub fn set_scope(set_id: &SetId) -> String {
    format!("set:{set_id}")
}

/// Hands out ids within one scope, resuming from a persisted counter.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    scope: String,
    next: u64,
}

impl IdAllocator {
    pub fn resume(scope: impl Into<String>, next: u64) -> Self {
        Self {
            scope: scope.into(),
            next,
        }
    }

    pub fn next_id<T: SurrogateId>(&mut self) -> T {
        let handle = Handle::derive(&self.scope, T::KIND, self.next);
        self.next += 1;
        T::from_handle(handle)
    }

    /// Counter value to persist so the next allocation continues from here.
    pub fn position(&self) -> u64 {
        self.next
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

#[cfg(test)]
mod tests {
    use spl_model::{ProductId, SectionId};

    use super::*;

    #[test]
    fn allocations_never_repeat_within_a_scope() {
        let mut ids = IdAllocator::resume("set:a", 0);
        let first: ProductId = ids.next_id();
        let second: ProductId = ids.next_id();
        assert_ne!(first, second);
        assert_eq!(ids.position(), 2);

        let mut resumed = IdAllocator::resume("set:a", 0);
        let replay: ProductId = resumed.next_id();
        assert_eq!(replay, first);
    }

    #[test]
    fn scopes_are_independent() {
        let mut a = IdAllocator::resume(set_scope(&SetId::new("a").unwrap()), 0);
        let mut b = IdAllocator::resume(set_scope(&SetId::new("b").unwrap()), 0);
        let from_a: SectionId = a.next_id();
        let from_b: SectionId = b.next_id();
        assert_ne!(from_a, from_b);
        assert_eq!(a.scope(), "set:a");
    }
}
