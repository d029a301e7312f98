//! Side effects driven by tracked expressions.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::runtime::{self, Dependent, Scheduled};

trait Disposable {
    fn dispose(&self);
    fn is_disposed(&self) -> bool;
}

/// Handle keeping a reaction alive.
///
/// Disposing is idempotent. Dropping the handle disposes the reaction.
pub struct Subscription {
    reaction: Rc<dyn Disposable>,
}

impl Subscription {
    /// Stop the reaction. Safe to call any number of times.
    pub fn dispose(&self) {
        self.reaction.dispose();
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.reaction.is_disposed()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.reaction.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

struct ReactionInner<T> {
    track: Box<dyn Fn() -> T>,
    effect: Box<dyn Fn(&T)>,
    last: RefCell<Option<T>>,
    scheduled: Cell<bool>,
    disposed: Cell<bool>,
}

impl<T: PartialEq + 'static> ReactionInner<T> {
    fn evaluate(self: &Rc<Self>) -> T {
        let observer: Rc<dyn Dependent> = self.clone();
        runtime::with_observer(Some(observer), || (self.track)())
    }
}

impl<T: PartialEq + 'static> Dependent for ReactionInner<T> {
    fn invalidate(self: Rc<Self>) {
        if self.disposed.get() || self.scheduled.replace(true) {
            return;
        }
        runtime::schedule(self);
    }
}

impl<T: PartialEq + 'static> Scheduled for ReactionInner<T> {
    fn run(self: Rc<Self>) {
        self.scheduled.set(false);
        if self.disposed.get() {
            return;
        }
        let value = self.evaluate();
        let changed = self.last.borrow().as_ref() != Some(&value);
        if changed {
            runtime::untracked(|| (self.effect)(&value));
            *self.last.borrow_mut() = Some(value);
        }
    }
}

impl<T> Disposable for ReactionInner<T> {
    fn dispose(&self) {
        if !self.disposed.replace(true) {
            self.last.borrow_mut().take();
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

/// Run `effect` every time the value produced by `track` changes.
///
/// `track` runs once immediately to capture its dependencies; `effect` is not
/// called for that first value. Afterwards `track` re-runs whenever one of
/// its dependencies changes (at the end of the current batch), and `effect`
/// receives the new value if it differs from the previous one. `effect` runs
/// untracked.
pub fn reaction<T: PartialEq + 'static>(
    track: impl Fn() -> T + 'static,
    effect: impl Fn(&T) + 'static,
) -> Subscription {
    let inner = Rc::new(ReactionInner {
        track: Box::new(track),
        effect: Box::new(effect),
        last: RefCell::new(None),
        scheduled: Cell::new(false),
        disposed: Cell::new(false),
    });
    let initial = inner.evaluate();
    *inner.last.borrow_mut() = Some(initial);
    Subscription { reaction: inner }
}
