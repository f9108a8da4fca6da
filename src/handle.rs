//! Owned-value handles: a move-only mutable handle around a single heap value, and a cloneable
//! read-only handle that keeps the same value alive for every subscriber holding a copy.
use std::ops::Deref;
use std::sync::Arc;

use crate::fatal;

/// Sole-owner, write-access handle produced by a provider's `allocate` step. Dereferencing an
/// empty handle is a fatal programming error, matching the source contract.
pub struct Owned<T> {
    value: Option<Box<T>>,
}

impl<T> Owned<T> {
    /// Wraps a freshly allocated value
    pub fn new(value: T) -> Self {
        Self {
            value: Some(Box::new(value)),
        }
    }
    /// True while the handle still carries a value
    pub fn is_carrying(&self) -> bool {
        self.value.is_some()
    }
    /// Mutable access to the carried value
    pub fn get_mut(&mut self) -> &mut T {
        self.value.as_deref_mut().unwrap_or_else(|| fatal("owned value handle is empty"))
    }
    /// Moves the value out, converting the mutable handle into a cloneable shared-reader handle.
    /// The reverse conversion does not exist: once shared, a value can never be exclusively
    /// owned again.
    pub fn into_shared(self) -> Shared<T> {
        let value = self
            .value
            .unwrap_or_else(|| fatal("owned value handle is empty"));
        Shared { value: Arc::new(*value) }
    }
}

impl<T> Deref for Owned<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.value
            .as_deref()
            .unwrap_or_else(|| fatal("owned value handle is empty"))
    }
}

impl<T: Default> Default for Owned<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Many-holder, read-only handle. Survives until the last clone drops: this is the mechanism by
/// which a subscriber can retain the most recently published sample with no copy.
pub struct Shared<T> {
    value: Arc<T>,
}

impl<T> Shared<T> {
    /// Wraps a value directly (used by `set(&T)` copy-publish)
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(value),
        }
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
        }
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_owned_transfer() {
        let mut owned = Owned::new(10_u32);
        *owned.get_mut() += 1;
        let shared = owned.into_shared();
        let shared2 = shared.clone();
        assert_eq!(*shared, 11);
        assert_eq!(*shared2, 11);
    }

    #[test]
    #[should_panic(expected = "owned value handle is empty")]
    fn test_empty_deref_aborts() {
        // an Owned is only ever empty after into_shared(); model it directly for the test
        let owned: Owned<u32> = Owned { value: None };
        let _ = *owned;
    }
}
