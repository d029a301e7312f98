//! Fine-grained reactive primitives.
//!
//! - [`Observable`]: a shared, version-tracked value cell.
//! - [`Computed`]: a lazily evaluated, memoized value derived from
//!   observables and other computed values.
//! - [`reaction`]: runs a side effect when a tracked expression changes,
//!   returning a [`Subscription`].
//! - [`BatchScope`] / [`batch`]: defer reactions until the outermost scope
//!   exits.
//!
//! # Architecture
//!
//! Everything is single-threaded and built on `Rc`. A thread-local tracking
//! context records which observer (computed value or reaction) is currently
//! evaluating; tracked reads register that observer with the value being
//! read. Dependents are held weakly and forgotten once notified, so they
//! re-register on their next evaluation and stale dependencies fall away.
//!
//! # Invariants
//!
//! 1. Setting a value equal to the current value is a no-op.
//! 2. `Computed::get()` never returns a stale value.
//! 3. Several invalidations between two reads cause one recomputation.
//! 4. Reactions never run while a batch is open.
//! 5. A disposed reaction never runs again.

pub mod batch;
pub mod computed;
pub mod observable;
pub mod reaction;
pub(crate) mod runtime;

pub use batch::{batch, BatchScope};
pub use computed::Computed;
pub use observable::Observable;
pub use reaction::{reaction, Subscription};
pub use runtime::{untracked, MAX_FLUSH_PASSES};
