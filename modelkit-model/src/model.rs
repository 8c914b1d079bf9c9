use indexmap::IndexMap;
use modelkit_schema::{FieldChange, FieldIssue, Schema, SchemaCtx, SchemaIssue, ValidatorSelector};
use modelkit_store::{Change, Store, WatchId, WatchSpec};
use modelkit_ty::{ErrorKind, Path, Record, TyError, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::warn;

use crate::view::Views;

pub type ErrorHook = Arc<dyn Fn(&SchemaIssue) + Send + Sync>;
pub type RecordHook = Arc<dyn Fn(&mut Record) + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("state key '{0}' collides with a schema field")]
    StateKeyCollision(String),

    #[error("commit tag '{0}' is reserved")]
    ReservedTag(String),
}

/// Which arbitrary metas views expose: none, a list of names, or a
/// name → default mapping where a `Null` default means only-if-present.
#[derive(Clone, Default)]
pub enum MetaPolicy {
    #[default]
    None,
    Names(Vec<String>),
    Defaults(IndexMap<String, Value>),
}

/// Scope for `Model::validate`.
pub enum ValidateScope {
    All,
    Key(String),
    Keys(Vec<String>),
}

impl From<&str> for ValidateScope {
    fn from(value: &str) -> Self {
        ValidateScope::Key(value.to_string())
    }
}

impl From<Vec<&str>> for ValidateScope {
    fn from(value: Vec<&str>) -> Self {
        ValidateScope::Keys(value.into_iter().map(str::to_string).collect())
    }
}

pub(crate) struct Hooks {
    pub(crate) on_error: ErrorHook,
    pub(crate) on_switch: RecordHook,
    pub(crate) on_parse: RecordHook,
    pub(crate) on_export: RecordHook,
    pub(crate) metas: MetaPolicy,
}

impl Default for Hooks {
    fn default() -> Self {
        Hooks {
            on_error: Arc::new(|issue| warn!(%issue, "model error")),
            on_switch: Arc::new(|_| {}),
            on_parse: Arc::new(|_| {}),
            on_export: Arc::new(|_| {}),
            metas: MetaPolicy::None,
        }
    }
}

struct ModelState {
    locked: bool,
    changed: HashSet<String>,
    deps: HashMap<String, Vec<Path>>,
    extras: Vec<String>,
}

pub(crate) struct Inner {
    schema: Schema,
    store: Store,
    hooks: Hooks,
    state: Mutex<ModelState>,
}

/// A typed, validated, observable data container.
///
/// Composes one `Schema` and one `Store`: reads go through the schema's
/// getter/compute path, writes through its refusal checks and setter, and
/// computed fields recompute reactively once per batch. Cheap to clone;
/// clones share the instance.
#[derive(Clone)]
pub struct Model {
    pub(crate) inner: Arc<Inner>,
}

/// Configures and constructs a `Model`.
pub struct ModelBuilder {
    schema: Schema,
    input: Record,
    state: Record,
    hooks: Hooks,
}

impl ModelBuilder {
    pub fn new(schema: Schema) -> Self {
        ModelBuilder {
            schema,
            input: Record::new(),
            state: Record::new(),
            hooks: Hooks::default(),
        }
    }

    /// Initial data, passed through `schema.parse` at construction.
    pub fn input(mut self, input: Record) -> Self {
        self.input = input;
        self
    }

    /// Non-schema mutable properties bound alongside the fields. A key that
    /// collides with a schema field fails construction.
    pub fn state(mut self, state: Record) -> Self {
        self.state = state;
        self
    }

    pub fn metas(mut self, policy: MetaPolicy) -> Self {
        self.hooks.metas = policy;
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&SchemaIssue) + Send + Sync + 'static) -> Self {
        self.hooks.on_error = Arc::new(hook);
        self
    }

    /// Pre-restore hook; may mutate the incoming record in place.
    pub fn on_switch(mut self, hook: impl Fn(&mut Record) + Send + Sync + 'static) -> Self {
        self.hooks.on_switch = Arc::new(hook);
        self
    }

    pub fn on_parse(mut self, hook: impl Fn(&mut Record) + Send + Sync + 'static) -> Self {
        self.hooks.on_parse = Arc::new(hook);
        self
    }

    pub fn on_export(mut self, hook: impl Fn(&mut Record) + Send + Sync + 'static) -> Self {
        self.hooks.on_export = Arc::new(hook);
        self
    }

    pub fn build(self) -> Result<Model, ModelError> {
        for key in self.state.keys() {
            if self.schema.contains(key) {
                return Err(ModelError::StateKeyCollision(key.clone()));
            }
        }
        let extras: Vec<String> = self.state.keys().cloned().collect();
        let model = Model {
            inner: Arc::new(Inner {
                schema: self.schema,
                store: Store::new(),
                hooks: self.hooks,
                state: Mutex::new(ModelState {
                    locked: false,
                    changed: HashSet::new(),
                    deps: HashMap::new(),
                    extras,
                }),
            }),
        };
        // Incoming values take the write path first so setters shape them
        // into storage form; defaults are already storage-form.
        let mut shaped = Record::new();
        for (key, value) in self.input {
            if model.inner.schema.contains(&key) && !model.inner.schema.is_computed(&key) {
                let stored = model.inner.schema.set_raw(&key, value, &model);
                shaped.insert(key, stored);
            } else {
                shaped.insert(key, value);
            }
        }
        let mut seeded = model.inner.schema.parse(&shaped, &model);
        seeded.extend(self.state);
        model.inner.store.replace(seeded);
        model.init_computed();
        model.attach_field_watches();
        model.attach_reactor();
        Ok(model)
    }
}

impl Model {
    pub fn builder(schema: Schema) -> ModelBuilder {
        ModelBuilder::new(schema)
    }

    pub fn new(schema: Schema) -> Result<Model, ModelError> {
        ModelBuilder::new(schema).build()
    }

    pub fn with_data(schema: Schema, input: Record) -> Result<Model, ModelError> {
        ModelBuilder::new(schema).input(input).build()
    }

    fn lock_state(&self) -> MutexGuard<'_, ModelState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub(crate) fn store(&self) -> &Store {
        &self.inner.store
    }

    // === Construction plumbing ===

    fn init_computed(&self) {
        let computed: Vec<String> = self
            .inner
            .schema
            .keys()
            .filter(|key| self.inner.schema.is_computed(key))
            .map(str::to_string)
            .collect();
        for key in computed {
            self.recompute(&key, true);
        }
    }

    /// Re-evaluates one computed field under a tracker frame, refreshing
    /// its dependency set. Returns the fresh value.
    fn recompute(&self, key: &str, silent: bool) -> Value {
        let model = self.clone();
        let field = key.to_string();
        let (value, deps) = self.inner.store.track(move || {
            model
                .inner
                .schema
                .get(&field, &Value::Null, &model)
        });
        let deps: Vec<Path> = deps
            .into_iter()
            .filter(|path| path.first_key() != Some(key))
            .collect();
        self.lock_state().deps.insert(key.to_string(), deps);
        if silent {
            if let Err(err) = self.inner.store.set_silent(key, value.clone()) {
                warn!(key, %err, "computed seed skipped");
            }
        }
        value
    }

    fn attach_field_watches(&self) {
        let keys: Vec<String> = self.inner.schema.keys().map(str::to_string).collect();
        for key in keys {
            if let Some(reaction) = self.inner.schema.field_watch(&key) {
                let field = key.clone();
                self.inner.store.watch(key.as_str(), move |change: &Change| {
                    reaction(&FieldChange {
                        key: field.clone(),
                        value: change.value.clone(),
                        prev: change.prev.clone(),
                    });
                });
            }
        }
    }

    /// The computed-field reactor: when a batch touches a dependency, the
    /// field recomputes once and its write joins the same turn.
    fn attach_reactor(&self) {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.store.react(move |changed| {
            let Some(inner) = weak.upgrade() else {
                return Vec::new();
            };
            let model = Model { inner };
            model.recompute_dirty(changed)
        });
    }

    fn recompute_dirty(&self, changed: &[Path]) -> Vec<(Path, Value)> {
        let deps: Vec<(String, Vec<Path>)> = {
            let state = self.lock_state();
            state
                .deps
                .iter()
                .map(|(key, paths)| (key.clone(), paths.clone()))
                .collect()
        };
        let mut writes = Vec::new();
        for (key, paths) in deps {
            let dirty = changed.iter().any(|change| {
                paths
                    .iter()
                    .any(|dep| change.starts_with(dep) || dep.starts_with(change))
            });
            if !dirty {
                continue;
            }
            let value = self.recompute(&key, false);
            writes.push((Path::key(key), value));
        }
        writes
    }

    fn refuse_locked(&self, key: &str, value: &Value) -> bool {
        if !self.lock_state().locked {
            return false;
        }
        let error = TyError::new(ErrorKind::Locked, value, "unlocked")
            .with_message(format!("model is locked, dropping write to '{key}'"));
        self.route_error(SchemaIssue::new(key, "lock", error));
        true
    }

    // === Reads ===

    /// The user-facing read: computed fields materialize, getters apply.
    pub fn get(&self, key: &str) -> Value {
        let stored = self.inner.store.get(key).unwrap_or(Value::Null);
        self.inner.schema.get(key, &stored, self)
    }

    /// The raw backing record (storage representation, post-setter).
    pub fn data(&self) -> Record {
        self.inner.store.data()
    }

    /// The user-facing record: getters applied, computed fields
    /// materialized, state extras included.
    pub fn state(&self) -> Record {
        let mut out = Record::new();
        let keys: Vec<String> = self.inner.schema.keys().map(str::to_string).collect();
        for key in keys {
            out.insert(key.clone(), self.get(&key));
        }
        let extras = self.lock_state().extras.clone();
        for key in extras {
            let value = self.inner.store.get(key.as_str()).unwrap_or(Value::Null);
            out.insert(key, value);
        }
        out
    }

    pub fn views(&self) -> Views<'_> {
        Views::new(self)
    }

    pub(crate) fn meta_policy(&self) -> &MetaPolicy {
        &self.inner.hooks.metas
    }

    pub(crate) fn is_changed(&self, key: &str) -> bool {
        self.lock_state().changed.contains(key)
    }

    // === Writes ===

    /// Writes one field through the schema. Refusals (readonly, disabled,
    /// locked) keep the prior value and route an error instead of failing.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.set_impl(key, value.into(), false);
    }

    /// A write that bypasses `readonly`/`disabled` refusals.
    pub fn set_force(&self, key: &str, value: impl Into<Value>) {
        self.set_impl(key, value.into(), true);
    }

    fn set_impl(&self, key: &str, value: Value, force: bool) {
        if self.refuse_locked(key, &value) {
            return;
        }
        let next = if force {
            self.inner.schema.set_raw(key, value, self)
        } else {
            match self.inner.schema.set(key, value, self) {
                Ok(next) => next,
                Err(_refused) => return,
            }
        };
        if self.inner.schema.is_computed(key) {
            return;
        }
        if let Err(err) = self.inner.store.set(key, next) {
            warn!(key, %err, "write skipped");
            return;
        }
        self.lock_state().changed.insert(key.to_string());
    }

    /// A batched write: every entry resolves through the schema first, then
    /// all land before any watcher fires.
    pub fn update(&self, patch: Record) {
        let mut resolved = Record::new();
        for (key, value) in patch {
            if self.refuse_locked(&key, &value) {
                continue;
            }
            match self.inner.schema.set(&key, value, self) {
                Ok(next) if !self.inner.schema.is_computed(&key) => {
                    resolved.insert(key, next);
                }
                _ => {}
            }
        }
        if resolved.is_empty() {
            return;
        }
        {
            let mut state = self.lock_state();
            for key in resolved.keys() {
                state.changed.insert(key.clone());
            }
        }
        self.inner.store.update(resolved);
    }

    // === Validation ===

    pub fn validate(&self, scope: impl Into<ValidateScope>) -> Vec<FieldIssue> {
        match scope.into() {
            ValidateScope::Key(key) => self.validate_key(&key),
            ValidateScope::Keys(keys) => keys
                .iter()
                .flat_map(|key| self.validate_key(key))
                .collect(),
            ValidateScope::All => {
                let keys: Vec<String> = self.inner.schema.keys().map(str::to_string).collect();
                keys.iter().flat_map(|key| self.validate_key(key)).collect()
            }
        }
    }

    pub fn validate_all(&self) -> Vec<FieldIssue> {
        self.validate(ValidateScope::All)
    }

    fn validate_key(&self, key: &str) -> Vec<FieldIssue> {
        let value = self.inner.store.get(key).unwrap_or(Value::Null);
        self.inner.schema.validate(key, &value, self)
    }

    /// Runs a selection of a field's validators (ad-hoc list, index span,
    /// or specific indices).
    pub fn validate_only(&self, key: &str, selector: ValidatorSelector) -> Vec<FieldIssue> {
        let value = self.inner.store.get(key).unwrap_or(Value::Null);
        self.inner
            .schema
            .validate_selected(key, &value, self, selector)
    }

    // === Lifecycle ===

    /// Replaces the backing record wholesale, without firing watchers. The
    /// `on_switch` hook may mutate the incoming record first; missing
    /// schema fields fill from defaults; per-field changed flags clear.
    pub fn restore(&self, data: Record) {
        if self.refuse_locked("*", &Value::Null) {
            return;
        }
        let mut data = data;
        (self.inner.hooks.on_switch)(&mut data);
        let keys: Vec<String> = self.inner.schema.keys().map(str::to_string).collect();
        for key in keys {
            if !data.contains_key(&key) {
                let fallback = self.inner.schema.default_of(&key);
                data.insert(key, fallback);
            }
        }
        let extras = self.lock_state().extras.clone();
        for key in extras {
            if !data.contains_key(&key) {
                let current = self.inner.store.get(key.as_str()).unwrap_or(Value::Null);
                data.insert(key, current);
            }
        }
        self.inner.store.replace(data);
        self.lock_state().changed.clear();
        let computed: Vec<String> = self
            .inner
            .schema
            .keys()
            .filter(|key| self.inner.schema.is_computed(key))
            .map(str::to_string)
            .collect();
        for key in computed {
            self.recompute(&key, true);
        }
    }

    /// `on_parse` → `schema.parse` → `restore`.
    pub fn from_json(&self, json: serde_json::Value) {
        let mut record = Value::record_from_json(json);
        (self.inner.hooks.on_parse)(&mut record);
        let parsed = self.inner.schema.parse(&record, self);
        self.restore(parsed);
    }

    /// `schema.export` → `on_export` → JSON.
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = self.inner.schema.export(&self.data(), self);
        (self.inner.hooks.on_export)(&mut out);
        Value::record_to_json(&out)
    }

    /// While locked, `set`/`update`/`restore` no-op and route a `locked`
    /// error.
    pub fn lock(&self) {
        self.lock_state().locked = true;
    }

    pub fn unlock(&self) {
        self.lock_state().locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.lock_state().locked
    }

    // === Watch delegation ===

    pub fn watch(
        &self,
        spec: impl Into<WatchSpec>,
        handler: impl Fn(&Change) + Send + Sync + 'static,
    ) -> WatchId {
        self.inner.store.watch(spec, handler)
    }

    pub fn watch_deep(
        &self,
        spec: impl Into<WatchSpec>,
        handler: impl Fn(&Change) + Send + Sync + 'static,
    ) -> WatchId {
        self.inner.store.watch_deep(spec, handler)
    }

    /// Registers and immediately fires the handler once with the current
    /// value.
    pub fn watch_immediate(
        &self,
        key: &str,
        handler: impl Fn(&Change) + Send + Sync + 'static,
    ) -> WatchId {
        let current = self.get(key);
        let change = Change {
            key: key.to_string(),
            path: Path::key(key),
            value: current,
            prev: Value::Null,
        };
        handler(&change);
        self.inner.store.watch(key, handler)
    }

    pub fn unwatch(&self, id: WatchId) -> bool {
        self.inner.store.unwatch(id)
    }
}

impl SchemaCtx for Model {
    fn field_value(&self, key: &str) -> Value {
        self.get(key)
    }

    fn raw_data(&self) -> Record {
        self.inner.store.data()
    }

    fn route_error(&self, issue: SchemaIssue) -> SchemaIssue {
        (self.inner.hooks.on_error)(&issue);
        issue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelkit_schema::FieldDef;
    use modelkit_ty::record;

    use assertr::prelude::*;

    #[test]
    fn state_keys_may_not_collide_with_schema_fields() {
        let schema = Schema::new().field("name", FieldDef::new().default_value(""));
        let result = Model::builder(schema)
            .state(record([("name", Value::from("clash"))]))
            .build();

        assert_that(result.is_err()).is_true();
    }

    #[test]
    fn state_extras_live_alongside_fields() {
        let schema = Schema::new().field("name", FieldDef::new().default_value(""));
        let model = Model::builder(schema)
            .state(record([("page", Value::from(1))]))
            .build()
            .expect("build");

        model.set("page", 2);

        assert_that(model.get("page")).is_equal_to(Value::from(2));
        assert_that(model.state().get("page").cloned()).is_equal_to(Some(Value::from(2)));
    }

    #[test]
    fn locked_models_drop_writes_and_route_errors() {
        let schema = Schema::new().field("name", FieldDef::new().default_value("a"));
        let issues = Arc::new(Mutex::new(Vec::new()));
        let sink = issues.clone();
        let model = Model::builder(schema)
            .on_error(move |issue| sink.lock().expect("lock").push(issue.kind()))
            .build()
            .expect("build");

        model.lock();
        model.set("name", "b");
        assert_that(model.get("name")).is_equal_to(Value::from("a"));
        assert_that(issues.lock().expect("lock").clone()).is_equal_to(vec![ErrorKind::Locked]);

        model.unlock();
        model.set("name", "b");
        assert_that(model.get("name")).is_equal_to(Value::from("b"));
    }

    #[test]
    fn restore_replaces_without_firing_watchers_and_clears_changed() {
        let schema = Schema::new().field("name", FieldDef::new().default_value(""));
        let model = Model::new(schema).expect("build");
        let fired = Arc::new(Mutex::new(0usize));
        let counter = fired.clone();
        model.watch("name", move |_| {
            *counter.lock().expect("lock") += 1;
        });

        model.set("name", "x");
        assert_that(model.is_changed("name")).is_true();

        model.restore(record([("name", Value::from("restored"))]));

        assert_that(model.get("name")).is_equal_to(Value::from("restored"));
        assert_that(model.is_changed("name")).is_false();
        assert_that(*fired.lock().expect("lock")).is_equal_to(1);
    }

    #[test]
    fn on_switch_may_mutate_the_incoming_record() {
        let schema = Schema::new().field("name", FieldDef::new().default_value(""));
        let model = Model::builder(schema)
            .on_switch(|data| {
                data.insert("name".to_string(), Value::from("switched"));
            })
            .build()
            .expect("build");

        model.restore(Record::new());

        assert_that(model.get("name")).is_equal_to(Value::from("switched"));
    }

    #[test]
    fn computed_fields_reject_direct_writes() {
        let schema = Schema::new()
            .field("first", FieldDef::new().default_value("A"))
            .field(
                "full",
                FieldDef::new().compute(|ctx| ctx.field_value("first")),
            );
        let issues = Arc::new(Mutex::new(Vec::new()));
        let sink = issues.clone();
        let model = Model::builder(schema)
            .on_error(move |issue| sink.lock().expect("lock").push(issue.kind()))
            .build()
            .expect("build");

        model.set("full", "nope");

        assert_that(model.get("full")).is_equal_to(Value::from("A"));
        assert_that(
            issues
                .lock()
                .expect("lock")
                .contains(&ErrorKind::Compute),
        )
        .is_true();
    }

    #[test]
    fn forced_writes_bypass_readonly() {
        let schema = Schema::new().field(
            "id",
            FieldDef::new().default_value(1).readonly(true),
        );
        let model = Model::new(schema).expect("build");

        model.set("id", 2);
        assert_that(model.get("id")).is_equal_to(Value::from(1));

        model.set_force("id", 2);
        assert_that(model.get("id")).is_equal_to(Value::from(2));
    }
}
