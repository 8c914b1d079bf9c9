use crate::model::{MetaPolicy, Model};
use modelkit_schema::{FieldIssue, ValidatorSelector};
use modelkit_ty::Value;

/// The field-name → `FieldView` projection consumed by UI layers.
///
/// Views are weak projections: they observe the model and never own it.
pub struct Views<'m> {
    model: &'m Model,
}

impl<'m> Views<'m> {
    pub(crate) fn new(model: &'m Model) -> Self {
        Views { model }
    }

    pub fn field(&self, key: &str) -> Option<FieldView<'m>> {
        if !self.model.schema().contains(key) {
            return None;
        }
        Some(FieldView {
            model: self.model,
            key: key.to_string(),
        })
    }

    /// The `$errors` aggregate: every field's validator findings,
    /// concatenated in schema order.
    pub fn errors(&self) -> Vec<FieldIssue> {
        let keys: Vec<String> = self.model.schema().keys().map(str::to_string).collect();
        keys.iter()
            .filter_map(|key| self.field(key))
            .flat_map(|view| view.errors())
            .collect()
    }
}

/// A live projection of one field's value and metas.
pub struct FieldView<'m> {
    model: &'m Model,
    key: String,
}

impl FieldView<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The user-facing value (computed materialized, getter applied).
    pub fn value(&self) -> Value {
        self.model.get(&self.key)
    }

    /// Writes through the schema, subject to the usual refusals.
    pub fn set(&self, value: impl Into<Value>) {
        self.model.set(&self.key, value);
    }

    pub fn required(&self) -> bool {
        self.model.schema().is_required(&self.key, self.model)
    }

    pub fn readonly(&self) -> bool {
        self.model.schema().is_readonly(&self.key, self.model)
            || self.model.schema().is_computed(&self.key)
    }

    pub fn disabled(&self) -> bool {
        self.model.schema().is_disabled(&self.key, self.model)
    }

    pub fn hidden(&self) -> bool {
        self.model.schema().is_hidden(&self.key, self.model)
    }

    /// True once the field has been written since construction or the last
    /// restore.
    pub fn changed(&self) -> bool {
        self.model.is_changed(&self.key)
    }

    /// Validator findings only — required/type failures are not part of a
    /// view's errors.
    pub fn errors(&self) -> Vec<FieldIssue> {
        self.model.validate_only(
            &self.key,
            ValidatorSelector::Span {
                start: 0,
                end: usize::MAX,
            },
        )
    }

    /// An arbitrary meta, resolved iff the model's meta policy admits it.
    /// With a defaults policy, a declared non-`Null` default fills in for
    /// fields that don't carry the meta.
    pub fn meta(&self, name: &str) -> Option<Value> {
        let resolved = self
            .model
            .schema()
            .extra_meta(&self.key, name, self.model);
        match self.model.meta_policy() {
            MetaPolicy::None => None,
            MetaPolicy::Names(names) => {
                if names.iter().any(|allowed| allowed == name) {
                    resolved
                } else {
                    None
                }
            }
            MetaPolicy::Defaults(defaults) => {
                let default = defaults.get(name)?;
                match resolved {
                    Some(value) => Some(value),
                    None if default.is_null() => None,
                    None => Some(default.clone()),
                }
            }
        }
    }
}
