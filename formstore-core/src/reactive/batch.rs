//! Batching of reaction execution.

use std::marker::PhantomData;

use super::runtime;

/// RAII guard deferring reactions until the outermost scope exits.
///
/// Observable writes inside the scope apply immediately and computed values
/// read inside it are always current; only reactions wait. Scopes nest.
pub struct BatchScope {
    // !Send: the batch depth is thread-local.
    _not_send: PhantomData<*const ()>,
}

impl BatchScope {
    /// Open a batch scope.
    #[must_use]
    pub fn new() -> Self {
        runtime::enter_batch();
        Self {
            _not_send: PhantomData,
        }
    }

    /// Current nesting depth of batch scopes on this thread.
    #[must_use]
    pub fn depth() -> usize {
        runtime::batch_depth()
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        runtime::exit_batch();
    }
}

impl std::fmt::Debug for BatchScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScope")
            .field("depth", &runtime::batch_depth())
            .finish()
    }
}

/// Run `f` inside a [`BatchScope`].
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _scope = BatchScope::new();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_depth() {
        assert_eq!(BatchScope::depth(), 0);
        {
            let _outer = BatchScope::new();
            assert_eq!(BatchScope::depth(), 1);
            batch(|| assert_eq!(BatchScope::depth(), 2));
            assert_eq!(BatchScope::depth(), 1);
        }
        assert_eq!(BatchScope::depth(), 0);
    }
}
