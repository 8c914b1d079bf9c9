#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]

//! Composable type expressions over dynamic values.
//!
//! This crate provides the foundational types for the modelkit runtime:
//!
//! - **`value`**: the dynamic `Value` datum and the `Record` mapping
//! - **`path`**: key paths shared by errors, stores and watchers
//! - **`error`**: the structured `TyError` with its stable rendering
//! - **`prototype`**: the process-wide token → predicate registry
//! - **`pattern`** / **`types`** / **`rule`**: the pattern language, the
//!   `Type` wrapper with strict/loose modes, and conditional rules
//! - **`ty`**: the `Ty` checking facade
//!
//! # Re-exports
//!
//! For convenience, commonly used types are re-exported at the crate root.

pub mod error;
pub mod path;
pub mod pattern;
pub mod prototype;
pub mod rule;
pub mod ty;
pub mod types;
pub mod value;

// Re-export commonly used types at crate root.
pub use error::{ErrorKind, TyError};
pub use path::{Path, Segment};
pub use pattern::Pattern;
pub use prototype::{Prototype, is, register, unregister};
pub use rule::{
    Rule, asynch, determine, equal, if_exist, if_match, if_not_match, instance_of, lambda,
    match_all, nullable, self_ref, should_exist, should_match, should_not_exist, should_not_match,
};
pub use ty::Ty;
pub use types::{Mode, Type, dict, list, list_of, one_of, range, range_between, tuple};
pub use value::{CustomValue, Record, Value, ValueKind, record};
