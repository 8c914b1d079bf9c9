#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]

//! The reactive observable store underneath every model instance.
//!
//! A `Store` maps key paths to values and notifies watchers about writes.
//! Dispatch is two-phase: within one `update` all writes apply first, then
//! batch reactors (used for computed fields) run to a fixpoint, then
//! watchers fire — specific paths in registration order, then deep
//! watchers, then wildcards. Re-entrant writes from handlers enqueue onto
//! the live dispatch turn; identical `(path, value)` re-emissions within a
//! turn are deduped, which guarantees termination.

mod store;

pub use store::{Change, Store, StoreError, WatchId, WatchSpec};
