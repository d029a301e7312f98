//! Thread-local tracking context and reaction scheduler.
//!
//! The runtime owns three pieces of per-thread state:
//!
//! - the current *observer* (the computed value or reaction being evaluated),
//!   which tracked reads register themselves with;
//! - the batch depth, incremented by every [`BatchScope`](super::BatchScope);
//! - the queue of reactions scheduled since the outermost batch started.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

/// Maximum number of flush passes before the queue is dropped.
///
/// A pass runs every reaction queued at its start. Reactions that keep
/// re-triggering each other would otherwise loop forever.
pub const MAX_FLUSH_PASSES: usize = 100;

/// Something whose cached state depends on observable values.
pub(crate) trait Dependent {
    /// Marks the cached state stale.
    fn invalidate(self: Rc<Self>);
}

/// A unit of deferred work run when the outermost batch exits.
pub(crate) trait Scheduled {
    /// Runs the work.
    fn run(self: Rc<Self>);
}

thread_local! {
    static OBSERVER: RefCell<Option<Rc<dyn Dependent>>> = const { RefCell::new(None) };
    static BATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
    static PENDING: RefCell<VecDeque<Rc<dyn Scheduled>>> = const { RefCell::new(VecDeque::new()) };
}

/// Restores the previous observer when dropped.
struct ObserverGuard {
    previous: Option<Rc<dyn Dependent>>,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        OBSERVER.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// Evaluates `f` with `observer` as the tracking context.
pub(crate) fn with_observer<R>(observer: Option<Rc<dyn Dependent>>, f: impl FnOnce() -> R) -> R {
    let previous = OBSERVER.with(|slot| slot.replace(observer));
    let _guard = ObserverGuard { previous };
    f()
}

fn current_observer() -> Option<Rc<dyn Dependent>> {
    OBSERVER.with(|slot| slot.borrow().clone())
}

/// Evaluates `f` without registering any dependency.
///
/// Reads inside `f` are invisible to the enclosing computed value or
/// reaction.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    with_observer(None, f)
}

/// Set of weakly-held dependents of an observable or computed value.
#[derive(Default)]
pub(crate) struct DependentSet {
    dependents: RefCell<Vec<Weak<dyn Dependent>>>,
}

impl DependentSet {
    /// Registers the current observer, if any.
    pub(crate) fn track(&self) {
        let Some(observer) = current_observer() else {
            return;
        };
        let target = Rc::as_ptr(&observer).cast::<()>();
        let mut dependents = self.dependents.borrow_mut();
        if !dependents
            .iter()
            .any(|weak| weak.as_ptr().cast::<()>() == target)
        {
            dependents.push(Rc::downgrade(&observer));
        }
    }

    /// Invalidates and forgets every live dependent.
    ///
    /// Dependents register again the next time they evaluate.
    pub(crate) fn notify(&self) {
        let dependents = std::mem::take(&mut *self.dependents.borrow_mut());
        for dependent in dependents.iter().filter_map(Weak::upgrade) {
            dependent.invalidate();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.dependents
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// Queues `work` for the end of the current batch.
pub(crate) fn schedule(work: Rc<dyn Scheduled>) {
    PENDING.with(|queue| queue.borrow_mut().push_back(work));
    if BATCH_DEPTH.with(Cell::get) == 0 {
        flush();
    }
}

pub(crate) fn enter_batch() {
    BATCH_DEPTH.with(|depth| depth.set(depth.get() + 1));
}

pub(crate) fn exit_batch() {
    let remaining = BATCH_DEPTH.with(|depth| {
        let next = depth.get().saturating_sub(1);
        depth.set(next);
        next
    });
    if remaining == 0 {
        flush();
    }
}

pub(crate) fn batch_depth() -> usize {
    BATCH_DEPTH.with(Cell::get)
}

/// Clears the flushing flag when dropped, and the queue too if a reaction
/// panicked.
struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            PENDING.with(|queue| queue.borrow_mut().clear());
        }
        FLUSHING.with(|flag| flag.set(false));
    }
}

fn flush() {
    if FLUSHING.with(|flag| flag.replace(true)) {
        return;
    }
    let _guard = FlushGuard;

    let mut passes = 0;
    loop {
        let work: Vec<_> = PENDING.with(|queue| queue.borrow_mut().drain(..).collect());
        if work.is_empty() {
            break;
        }
        passes += 1;
        if passes > MAX_FLUSH_PASSES {
            tracing::warn!(
                dropped = work.len(),
                "reaction flush exceeded {MAX_FLUSH_PASSES} passes, dropping queue"
            );
            PENDING.with(|queue| queue.borrow_mut().clear());
            break;
        }
        for item in work {
            item.run();
        }
    }
}
