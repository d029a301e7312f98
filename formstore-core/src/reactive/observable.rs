//! Observable value cells.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::batch::BatchScope;
use super::runtime::DependentSet;

/// A shared, version-tracked value cell.
///
/// Reading with [`get`](Self::get) or [`with`](Self::with) inside a
/// [`Computed`](super::Computed) or a reaction registers the cell as a
/// dependency. Writing invalidates every registered dependent.
///
/// Cloning an `Observable` produces another handle to the same cell.
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

struct ObservableInner<T> {
    value: RefCell<T>,
    version: Cell<u64>,
    dependents: DependentSet,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .finish()
    }
}

impl<T: Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Observable<T> {
    /// Create a new cell holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(ObservableInner {
                value: RefCell::new(value),
                version: Cell::new(0),
                dependents: DependentSet::default(),
            }),
        }
    }

    /// Read the value through a borrow, registering a dependency.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.dependents.track();
        f(&self.inner.value.borrow())
    }

    /// Number of changes applied so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.get()
    }

    /// Mutate the value in place and notify dependents unconditionally.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.changed();
    }

    /// Whether both handles point at the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live dependents currently registered.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.inner.dependents.len()
    }

    fn changed(&self) {
        self.inner.version.set(self.inner.version.get() + 1);
        let _batch = BatchScope::new();
        self.inner.dependents.notify();
    }
}

impl<T: Clone> Observable<T> {
    /// Get a clone of the value, registering a dependency.
    #[must_use]
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get a clone of the value without registering a dependency.
    #[must_use]
    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T: PartialEq> Observable<T> {
    /// Replace the value.
    ///
    /// Setting a value equal to the current one is a no-op: no version bump
    /// and no invalidation.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        self.changed();
    }
}
