use crate::issue::{FieldIssue, SchemaIssue};
use crate::meta::{
    DefaultMeta, DropMeta, FieldChangeFn, FieldDef, HiddenMeta, MetaResult, MetaValue, TriMeta,
    Validator, ValidatorMessage, ValidatorOutcome,
};
use indexmap::IndexMap;
use modelkit_ty::{ErrorKind, Mode, Pattern, Record, TyError, Type, Value};
use tracing::debug;

/// The evaluation context metas see: the owning model.
///
/// `field_value` is the user-facing read (getter applied, computed fields
/// materialized); `raw_data` the backing record; `route_error` the error
/// sink, which may substitute the issue before it is recorded.
pub trait SchemaCtx: Send + Sync {
    fn field_value(&self, key: &str) -> Value;

    fn raw_data(&self) -> Record;

    fn route_error(&self, issue: SchemaIssue) -> SchemaIssue {
        issue
    }
}

/// A context with no backing model, for standalone schema use.
#[derive(Debug, Default)]
pub struct DetachedCtx;

impl SchemaCtx for DetachedCtx {
    fn field_value(&self, _key: &str) -> Value {
        Value::Null
    }

    fn raw_data(&self) -> Record {
        Record::new()
    }
}

/// Scope for `validate_selected`: ad-hoc validators, an index range, or a
/// list of specific indices.
pub enum ValidatorSelector {
    Adhoc(Vec<Validator>),
    Span { start: usize, end: usize },
    Indices(Vec<usize>),
}

/// A field-name → meta-bag mapping plus the operations interpreting it.
#[derive(Clone, Default)]
pub struct Schema {
    fields: IndexMap<String, FieldDef>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.insert(name.into(), def);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn def(&self, key: &str) -> Option<&FieldDef> {
        self.fields.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    // === Error routing ===

    /// The single funnel for meta failures: normalize, route through the
    /// context sink, consult the field's `catch` for a fallback value, then
    /// proceed with whatever the call site's fallback builds from it.
    fn trydo<T>(
        &self,
        ctx: &dyn SchemaCtx,
        key: &str,
        meta: &'static str,
        outcome: MetaResult<T>,
        fallback: impl FnOnce(Option<Value>) -> T,
    ) -> T {
        match outcome {
            Ok(value) => value,
            Err(error) => {
                let issue = ctx.route_error(SchemaIssue::new(key, meta, error));
                debug!(key, meta, error = %issue.error, "meta evaluation failed");
                let caught = self
                    .fields
                    .get(key)
                    .and_then(|field| field.catch.as_ref())
                    .and_then(|catch| catch(&issue));
                fallback(caught)
            }
        }
    }

    fn emit(&self, ctx: &dyn SchemaCtx, key: &str, meta: &'static str, error: TyError) -> SchemaIssue {
        let issue = ctx.route_error(SchemaIssue::new(key, meta, error));
        debug!(key, meta, error = %issue.error, "schema issue");
        if let Some(catch) = self.fields.get(key).and_then(|field| field.catch.as_ref()) {
            catch(&issue);
        }
        issue
    }

    // === Meta resolution ===

    /// Resolves a field's `default` meta, deep-cloning so instances never
    /// share mutable defaults. Undeclared defaults are `Null`.
    pub fn default_of(&self, key: &str) -> Value {
        match self.fields.get(key).and_then(|field| field.default.as_ref()) {
            Some(DefaultMeta::Value(value)) => value.clone(),
            Some(DefaultMeta::Produce(produce)) => produce(),
            None => Value::Null,
        }
    }

    fn resolve_tri(
        &self,
        ctx: &dyn SchemaCtx,
        key: &str,
        meta_name: &'static str,
        meta: Option<&TriMeta>,
    ) -> (bool, Option<String>) {
        match meta {
            None => (false, None),
            Some(TriMeta::On(on)) => (*on, None),
            Some(TriMeta::Message(message)) => (true, Some(message.clone())),
            Some(TriMeta::Decide(decide)) => (
                self.trydo(ctx, key, meta_name, decide(ctx), |_| false),
                None,
            ),
            Some(TriMeta::Determine { determine, message }) => (
                self.trydo(ctx, key, meta_name, determine(ctx), |_| false),
                Some(message.clone()),
            ),
        }
    }

    pub fn is_required(&self, key: &str, ctx: &dyn SchemaCtx) -> bool {
        let meta = self.fields.get(key).and_then(|f| f.required.as_ref());
        self.resolve_tri(ctx, key, "required", meta).0
    }

    pub fn is_readonly(&self, key: &str, ctx: &dyn SchemaCtx) -> bool {
        let meta = self.fields.get(key).and_then(|f| f.readonly.as_ref());
        self.resolve_tri(ctx, key, "readonly", meta).0
    }

    pub fn is_disabled(&self, key: &str, ctx: &dyn SchemaCtx) -> bool {
        let meta = self.fields.get(key).and_then(|f| f.disabled.as_ref());
        self.resolve_tri(ctx, key, "disabled", meta).0
    }

    pub fn is_hidden(&self, key: &str, ctx: &dyn SchemaCtx) -> bool {
        match self.fields.get(key).and_then(|f| f.hidden.as_ref()) {
            None => false,
            Some(HiddenMeta::On(on)) => *on,
            Some(HiddenMeta::Decide(decide)) => {
                self.trydo(ctx, key, "hidden", decide(ctx), |_| false)
            }
        }
    }

    pub fn is_computed(&self, key: &str) -> bool {
        self.fields
            .get(key)
            .map(FieldDef::is_computed)
            .unwrap_or(false)
    }

    pub fn field_watch(&self, key: &str) -> Option<FieldChangeFn> {
        self.fields.get(key).and_then(|field| field.watch.clone())
    }

    /// Resolves one arbitrary meta for a field.
    pub fn extra_meta(&self, key: &str, name: &str, ctx: &dyn SchemaCtx) -> Option<Value> {
        match self.fields.get(key)?.extras.get(name)? {
            MetaValue::Value(value) => Some(value.clone()),
            MetaValue::Decide(decide) => Some(self.trydo(ctx, key, "meta", decide(ctx), |fb| {
                fb.unwrap_or(Value::Null)
            })),
        }
    }

    pub fn extra_meta_names(&self, key: &str) -> Vec<String> {
        self.fields
            .get(key)
            .map(|field| field.extras.keys().cloned().collect())
            .unwrap_or_default()
    }

    // === Reads & writes ===

    /// The `force` twin of `get`: meta failures propagate raw instead of
    /// being routed, for callers that demand the failure itself.
    pub fn get_force(
        &self,
        key: &str,
        stored: &Value,
        ctx: &dyn SchemaCtx,
    ) -> MetaResult<Value> {
        let Some(field) = self.fields.get(key) else {
            return Ok(stored.clone());
        };
        if let Some(compute) = &field.compute {
            return compute(ctx);
        }
        if let Some(getter) = &field.getter {
            return getter(stored, ctx);
        }
        Ok(stored.clone())
    }

    /// The read path: compute overrides the stored value, else the getter
    /// transforms it, else it passes through.
    pub fn get(&self, key: &str, stored: &Value, ctx: &dyn SchemaCtx) -> Value {
        let Some(field) = self.fields.get(key) else {
            return stored.clone();
        };
        if let Some(compute) = &field.compute {
            return self.trydo(ctx, key, "compute", compute(ctx), |fb| {
                fb.unwrap_or(Value::Null)
            });
        }
        if let Some(getter) = &field.getter {
            return self.trydo(ctx, key, "getter", getter(stored, ctx), |fb| {
                fb.unwrap_or_else(|| stored.clone())
            });
        }
        stored.clone()
    }

    /// The write path below the refusal checks. Computed fields route a
    /// `compute` error and hand back the freshly computed value; otherwise
    /// the setter transforms and the type is enforced (a `Rule` type checks
    /// against the parent data view with the candidate inserted). Type
    /// failures are routed; the value still flows.
    pub fn set_raw(&self, key: &str, next: Value, ctx: &dyn SchemaCtx) -> Value {
        let Some(field) = self.fields.get(key) else {
            return next;
        };
        if let Some(compute) = &field.compute {
            self.emit(
                ctx,
                key,
                "compute",
                TyError::new(ErrorKind::Compute, &next, "computed"),
            );
            return self.trydo(ctx, key, "compute", compute(ctx), |fb| {
                fb.unwrap_or(Value::Null)
            });
        }
        let mut value = next;
        if let Some(setter) = &field.setter {
            let incoming = value.clone();
            value = self.trydo(ctx, key, "setter", setter(&value, ctx), |fb| {
                fb.unwrap_or(incoming)
            });
        }
        if let Some(error) = self.type_error(field, key, &value, None, ctx) {
            self.emit(ctx, key, "type", error);
        }
        value
    }

    /// The guarded write path: `disabled` then `readonly` refuse (the error
    /// is routed and returned); otherwise delegates to `set_raw`.
    pub fn set(&self, key: &str, next: Value, ctx: &dyn SchemaCtx) -> Result<Value, SchemaIssue> {
        let field = self.fields.get(key);
        let (disabled, disabled_message) =
            self.resolve_tri(ctx, key, "disabled", field.and_then(|f| f.disabled.as_ref()));
        if disabled {
            let message =
                disabled_message.unwrap_or_else(|| format!("field '{key}' is disabled"));
            let error = TyError::new(ErrorKind::Disabled, &next, key).with_message(message);
            return Err(self.emit(ctx, key, "disabled", error));
        }
        let (readonly, readonly_message) =
            self.resolve_tri(ctx, key, "readonly", field.and_then(|f| f.readonly.as_ref()));
        if readonly {
            let message =
                readonly_message.unwrap_or_else(|| format!("field '{key}' is readonly"));
            let error = TyError::new(ErrorKind::Readonly, &next, key).with_message(message);
            return Err(self.emit(ctx, key, "readonly", error));
        }
        Ok(self.set_raw(key, next, ctx))
    }

    fn type_error(
        &self,
        field: &FieldDef,
        key: &str,
        value: &Value,
        data: Option<&Record>,
        ctx: &dyn SchemaCtx,
    ) -> Option<TyError> {
        let pattern = field.ty.as_ref()?;
        let error = match pattern {
            Pattern::Rule(rule) => {
                let error = match data {
                    Some(data) => rule.check_in(data, key, Mode::Default).err(),
                    None => {
                        let mut view = ctx.raw_data();
                        view.insert(key.to_string(), value.clone());
                        rule.check_in(&view, key, Mode::Default).err()
                    }
                };
                error?
            }
            other => Type::new(other.clone()).catch(value)?,
        };
        Some(match &field.message {
            Some(message) => error.with_message(message.clone()),
            None => error,
        })
    }

    // === Validation ===

    /// Collects findings for one field: nothing when disabled, a single
    /// `required` finding for an empty value, then type, then each
    /// validator whose `determine` gate passes. Never throws.
    pub fn validate(&self, key: &str, value: &Value, ctx: &dyn SchemaCtx) -> Vec<FieldIssue> {
        let Some(field) = self.fields.get(key) else {
            return Vec::new();
        };
        if self.is_disabled(key, ctx) {
            return Vec::new();
        }
        let mut issues = Vec::new();
        let (required, required_message) =
            self.resolve_tri(ctx, key, "required", field.required.as_ref());
        if required && value.is_empty() {
            let message =
                required_message.unwrap_or_else(|| format!("field '{key}' is required"));
            issues.push(FieldIssue::new(key, None, ErrorKind::Missing, message));
            return issues;
        }
        if let Some(error) = self.type_error(field, key, value, None, ctx) {
            issues.push(FieldIssue::new(key, None, error.kind(), error.message()));
        }
        self.run_validators(
            key,
            value,
            ctx,
            field.validators.iter().enumerate(),
            &mut issues,
        );
        issues
    }

    /// Runs a selection of validators: ad-hoc ones, a `[start, end)` span,
    /// or specific indices.
    pub fn validate_selected(
        &self,
        key: &str,
        value: &Value,
        ctx: &dyn SchemaCtx,
        selector: ValidatorSelector,
    ) -> Vec<FieldIssue> {
        if self.is_disabled(key, ctx) {
            return Vec::new();
        }
        let mut issues = Vec::new();
        match selector {
            ValidatorSelector::Adhoc(validators) => {
                let picked: Vec<(usize, &Validator)> = validators.iter().enumerate().collect();
                self.run_validators(key, value, ctx, picked.into_iter(), &mut issues);
            }
            ValidatorSelector::Span { start, end } => {
                let Some(field) = self.fields.get(key) else {
                    return issues;
                };
                let end = end.min(field.validators.len());
                if start < end {
                    let picked = field.validators[start..end]
                        .iter()
                        .enumerate()
                        .map(|(offset, validator)| (start + offset, validator));
                    self.run_validators(key, value, ctx, picked, &mut issues);
                }
            }
            ValidatorSelector::Indices(indices) => {
                let Some(field) = self.fields.get(key) else {
                    return issues;
                };
                let picked = indices
                    .into_iter()
                    .filter_map(|index| field.validators.get(index).map(|v| (index, v)));
                self.run_validators(key, value, ctx, picked, &mut issues);
            }
        }
        issues
    }

    fn run_validators<'v>(
        &self,
        key: &str,
        value: &Value,
        ctx: &dyn SchemaCtx,
        validators: impl Iterator<Item = (usize, &'v Validator)>,
        issues: &mut Vec<FieldIssue>,
    ) {
        for (index, validator) in validators {
            if let Some(determine) = &validator.determine {
                let go = self.trydo(ctx, key, "validator", determine(value, ctx), |_| false);
                if !go {
                    continue;
                }
            }
            let outcome = self.trydo(
                ctx,
                key,
                "validator",
                (validator.validate)(value, ctx),
                |_| ValidatorOutcome::Pass,
            );
            match outcome {
                ValidatorOutcome::Pass => {}
                ValidatorOutcome::Fail => {
                    let message = resolve_message(validator, value, key)
                        .unwrap_or_else(|| format!("field '{key}' did not pass validation"));
                    issues.push(FieldIssue::new(
                        key,
                        Some(index),
                        ErrorKind::Exception,
                        message,
                    ));
                }
                ValidatorOutcome::Error(error) => {
                    let message =
                        resolve_message(validator, value, key).unwrap_or_else(|| error.message());
                    issues.push(FieldIssue::new(key, Some(index), error.kind(), message));
                }
                ValidatorOutcome::Nested(children) => {
                    issues.extend(children.into_iter().map(|child| FieldIssue {
                        key: format!("{key}.{}", child.key),
                        ..child
                    }));
                }
            }
        }
    }

    // === (De)serialization ===

    /// Builds a fresh record from incoming data: the `create` transform
    /// (falling back to the default when it returns nothing), else the
    /// incoming value, else the default. Rule corrections run over the
    /// result, then types are enforced with errors routed.
    pub fn parse(&self, data: &Record, ctx: &dyn SchemaCtx) -> Record {
        let mut out = Record::new();
        for (key, field) in &self.fields {
            let incoming = data.get(key);
            let value = if let Some(create) = &field.create {
                let produced = self.trydo(
                    ctx,
                    key,
                    "create",
                    create(data, key, incoming.unwrap_or(&Value::Null)),
                    |fb| fb,
                );
                match produced {
                    Some(value) => value,
                    None => self.default_of(key),
                }
            } else {
                match incoming {
                    Some(value) => value.clone(),
                    None => self.default_of(key),
                }
            };
            out.insert(key.clone(), value);
        }
        for (key, field) in &self.fields {
            if let Some(pattern) = &field.ty {
                pattern.coerce_member(&mut out, key);
            }
            let value = out.get(key).cloned().unwrap_or(Value::Null);
            if let Some(error) = self.type_error(field, key, &value, Some(&out), ctx) {
                self.emit(ctx, key, "parse", error);
            }
        }
        out
    }

    /// Projects the record for export: `flat` expansions are collected into
    /// a patch; disabled and `drop`ped fields are skipped; `map` transforms
    /// the emitted value. The patch wins over the base.
    pub fn export(&self, data: &Record, ctx: &dyn SchemaCtx) -> Record {
        let mut base = Record::new();
        let mut patch = Record::new();
        for (key, field) in &self.fields {
            let value = data.get(key).cloned().unwrap_or(Value::Null);
            if let Some(flat) = &field.flat {
                let expansion = self.trydo(ctx, key, "flat", flat(&value, key, data), |_| {
                    Record::new()
                });
                patch.extend(expansion);
            }
            if self.is_disabled(key, ctx) {
                continue;
            }
            if let Some(drop_meta) = &field.drop {
                let dropped = match drop_meta {
                    DropMeta::On(on) => *on,
                    DropMeta::Decide(decide) => {
                        self.trydo(ctx, key, "drop", decide(&value, key, data), |_| false)
                    }
                };
                if dropped {
                    continue;
                }
            }
            let emitted = match &field.map {
                Some(map) => self.trydo(ctx, key, "map", map(&value, key, data), |fb| {
                    fb.unwrap_or_else(|| value.clone())
                }),
                None => value,
            };
            base.insert(key.clone(), emitted);
        }
        for (key, value) in patch {
            base.insert(key, value);
        }
        base
    }
}

fn resolve_message(validator: &Validator, value: &Value, key: &str) -> Option<String> {
    match &validator.message {
        Some(ValidatorMessage::Text(text)) => Some(text.clone()),
        Some(ValidatorMessage::Make(make)) => Some(make(value, key)),
        None => None,
    }
}
