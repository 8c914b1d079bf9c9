#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]

//! The model orchestrator: typed, validated, observable data containers.
//!
//! A `Model` composes a `Schema` (per-field metas) with a `Store`
//! (reactive state): reads flow through getters and computed fields,
//! writes through refusal checks and setters, validation collects
//! findings, and `Views` project fields for UI layers. `TraceModel` layers
//! named snapshots and linear undo/redo on top.
//!
//! # Re-exports
//!
//! The sibling crates are re-exported so embedders depend on this crate
//! alone.

pub mod model;
pub mod trace;
pub mod view;

pub use model::{
    ErrorHook, MetaPolicy, Model, ModelBuilder, ModelError, RecordHook, ValidateScope,
};
pub use trace::{ORIGIN_TAG, TraceModel};
pub use view::{FieldView, Views};

pub use modelkit_schema;
pub use modelkit_store;
pub use modelkit_ty;

pub mod prelude {
    pub use super::model::{MetaPolicy, Model, ModelBuilder, ModelError, ValidateScope};
    pub use super::trace::{ORIGIN_TAG, TraceModel};
    pub use super::view::{FieldView, Views};

    pub use modelkit_schema::{
        FieldChange, FieldDef, FieldIssue, Schema, SchemaCtx, SchemaIssue, TriMeta, Validator,
        ValidatorOutcome, ValidatorSelector,
    };
    pub use modelkit_store::{Change, Store, WatchId, WatchSpec};
    pub use modelkit_ty::{
        ErrorKind, Mode, Path, Pattern, Prototype, Record, Rule, Ty, TyError, Type, Value,
        ValueKind, record,
    };
}
