#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]

//! The per-field meta engine.
//!
//! A `Schema` maps field names to `FieldDef` meta bags and interprets them
//! against a context (the owning model): defaults, tri-form
//! `required`/`readonly`/`disabled`, getter/setter transforms, computed
//! fields, validators, and the `parse`/`export` serialization projections.
//! Meta failures never propagate — they are normalized to `SchemaIssue`s
//! and routed through the context sink and the field's `catch`.

pub mod issue;
pub mod meta;
pub mod schema;

pub use issue::{FieldIssue, SchemaIssue};
pub use meta::{
    CatchFn, CreateFn, CtxFn, DefaultMeta, DropMeta, ExportFn, FieldChange, FieldChangeFn,
    FieldDef, HiddenMeta, MetaResult, MetaValue, TriMeta, ValidatorMessage, ValidatorOutcome,
    ValueCtxFn, Validator,
};
pub use schema::{DetachedCtx, Schema, SchemaCtx, ValidatorSelector};
