//! Lazily evaluated, memoized derived values.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::runtime::{self, Dependent, DependentSet};

/// A memoized value derived from observables and other computed values.
///
/// Dependencies are captured automatically: every tracked read performed by
/// the compute function registers with this value. When any dependency
/// changes the value is only marked stale; the compute function runs again
/// on the next read. Any number of changes between two reads therefore cost
/// exactly one recomputation.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    compute: Box<dyn Fn() -> T>,
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
    evaluations: Cell<u64>,
    dependents: DependentSet,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("cached", &*self.inner.value.borrow())
            .field("dirty", &self.inner.dirty.get())
            .finish()
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Create a computed value. Nothing is evaluated until the first read.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        Self {
            inner: Rc::new(ComputedInner {
                compute: Box::new(compute),
                value: RefCell::new(None),
                dirty: Cell::new(true),
                evaluations: Cell::new(0),
                dependents: DependentSet::default(),
            }),
        }
    }

    /// Get the current value, recomputing it first if stale.
    ///
    /// Registers this value as a dependency of the enclosing observer.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.dependents.track();
        if !self.inner.dirty.get() {
            if let Some(value) = self.inner.value.borrow().as_ref() {
                return value.clone();
            }
        }
        Rc::clone(&self.inner).recompute()
    }

    /// How many times the compute function has run.
    #[must_use]
    pub fn evaluations(&self) -> u64 {
        self.inner.evaluations.get()
    }

    /// Whether the next read will recompute.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.inner.dirty.get()
    }
}

impl<T: Clone + 'static> ComputedInner<T> {
    fn recompute(self: Rc<Self>) -> T {
        self.dirty.set(false);
        let observer: Rc<dyn Dependent> = self.clone();
        let value = runtime::with_observer(Some(observer), || (self.compute)());
        self.evaluations.set(self.evaluations.get() + 1);
        *self.value.borrow_mut() = Some(value.clone());
        value
    }
}

impl<T> Dependent for ComputedInner<T> {
    fn invalidate(self: Rc<Self>) {
        if !self.dirty.replace(true) {
            self.dependents.notify();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{batch, Observable};

    #[test]
    fn test_lazy_until_read() {
        let obs = Observable::new(2);
        let src = obs.clone();
        let doubled = Computed::new(move || src.get() * 2);

        assert_eq!(doubled.evaluations(), 0);
        assert_eq!(doubled.get(), 4);
        assert_eq!(doubled.get(), 4);
        assert_eq!(doubled.evaluations(), 1);
    }

    #[test]
    fn test_changes_coalesce_into_one_recompute() {
        let a = Observable::new(1);
        let b = Observable::new(10);
        let (ca, cb) = (a.clone(), b.clone());
        let sum = Computed::new(move || ca.get() + cb.get());
        assert_eq!(sum.get(), 11);

        a.set(2);
        b.set(20);
        a.set(3);
        assert!(sum.is_stale());
        assert_eq!(sum.get(), 23);
        assert_eq!(sum.evaluations(), 2);
    }

    #[test]
    fn test_batched_changes_coalesce() {
        let a = Observable::new(1);
        let ca = a.clone();
        let plus_one = Computed::new(move || ca.get() + 1);
        assert_eq!(plus_one.get(), 2);

        batch(|| {
            a.set(5);
            a.set(6);
        });
        assert_eq!(plus_one.get(), 7);
        assert_eq!(plus_one.evaluations(), 2);
    }

    #[test]
    fn test_chained_computed_propagates() {
        let base = Observable::new(3);
        let b = base.clone();
        let squared = Computed::new(move || b.get() * b.get());
        let s = squared.clone();
        let label = Computed::new(move || format!("{}", s.get()));

        assert_eq!(label.get(), "9");
        base.set(4);
        assert_eq!(label.get(), "16");
    }

    #[test]
    fn test_unrelated_change_does_not_invalidate() {
        let a = Observable::new(1);
        let other = Observable::new(0);
        let ca = a.clone();
        let c = Computed::new(move || ca.get());
        assert_eq!(c.get(), 1);

        other.set(1);
        assert!(!c.is_stale());
        assert_eq!(c.evaluations(), 1);
    }
}
