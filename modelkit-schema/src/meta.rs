use crate::issue::SchemaIssue;
use crate::schema::SchemaCtx;
use indexmap::IndexMap;
use modelkit_ty::{Pattern, Record, TyError, Value};
use std::fmt;
use std::sync::Arc;

/// Fallible meta evaluation; failures funnel through the schema's routing
/// helper instead of propagating.
pub type MetaResult<T> = Result<T, TyError>;

/// A meta closure evaluated against the owning model.
pub type CtxFn<T> = Arc<dyn Fn(&dyn SchemaCtx) -> MetaResult<T> + Send + Sync>;

/// A meta closure in the `(value, ctx)` idiom (getter, setter, validators).
pub type ValueCtxFn<T> = Arc<dyn Fn(&Value, &dyn SchemaCtx) -> MetaResult<T> + Send + Sync>;

/// Deserialization transform: `(data, key, incoming)`.
pub type CreateFn = Arc<dyn Fn(&Record, &str, &Value) -> MetaResult<Option<Value>> + Send + Sync>;

/// Serialization transforms in the `(value, key, data)` idiom.
pub type ExportFn<T> = Arc<dyn Fn(&Value, &str, &Record) -> MetaResult<T> + Send + Sync>;

pub type CatchFn = Arc<dyn Fn(&SchemaIssue) -> Option<Value> + Send + Sync>;

/// What a field-scoped `watch` meta receives.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub key: String,
    pub value: Value,
    pub prev: Value,
}

pub type FieldChangeFn = Arc<dyn Fn(&FieldChange) + Send + Sync>;

/// The `default` meta: a value (deep-cloned per use so instances never
/// share mutable defaults) or a zero-arg producer.
#[derive(Clone)]
pub enum DefaultMeta {
    Value(Value),
    Produce(Arc<dyn Fn() -> Value + Send + Sync>),
}

/// The tri-form meta behind `required`, `readonly` and `disabled`:
/// boolean, message string (truthy with message), a deciding closure, or a
/// `{determine, message}` pair. Decoded once at schema construction.
#[derive(Clone)]
pub enum TriMeta {
    On(bool),
    Message(String),
    Decide(CtxFn<bool>),
    Determine { determine: CtxFn<bool>, message: String },
}

impl TriMeta {
    pub fn decide(decide: impl Fn(&dyn SchemaCtx) -> bool + Send + Sync + 'static) -> Self {
        TriMeta::Decide(Arc::new(move |ctx| Ok(decide(ctx))))
    }

    pub fn when(
        determine: impl Fn(&dyn SchemaCtx) -> bool + Send + Sync + 'static,
        message: impl Into<String>,
    ) -> Self {
        TriMeta::Determine {
            determine: Arc::new(move |ctx| Ok(determine(ctx))),
            message: message.into(),
        }
    }
}

impl From<bool> for TriMeta {
    fn from(value: bool) -> Self {
        TriMeta::On(value)
    }
}

impl From<&str> for TriMeta {
    fn from(value: &str) -> Self {
        TriMeta::Message(value.to_string())
    }
}

impl From<String> for TriMeta {
    fn from(value: String) -> Self {
        TriMeta::Message(value)
    }
}

/// The `hidden` meta: boolean or deciding closure.
#[derive(Clone)]
pub enum HiddenMeta {
    On(bool),
    Decide(CtxFn<bool>),
}

impl HiddenMeta {
    pub fn decide(decide: impl Fn(&dyn SchemaCtx) -> bool + Send + Sync + 'static) -> Self {
        HiddenMeta::Decide(Arc::new(move |ctx| Ok(decide(ctx))))
    }
}

impl From<bool> for HiddenMeta {
    fn from(value: bool) -> Self {
        HiddenMeta::On(value)
    }
}

/// The `drop` meta: boolean or a `(value, key, data)` predicate.
#[derive(Clone)]
pub enum DropMeta {
    On(bool),
    Decide(ExportFn<bool>),
}

/// An arbitrary meta exposed on views: a plain value or a deciding closure.
#[derive(Clone)]
pub enum MetaValue {
    Value(Value),
    Decide(CtxFn<Value>),
}

#[derive(Clone)]
pub enum ValidatorMessage {
    Text(String),
    Make(Arc<dyn Fn(&Value, &str) -> String + Send + Sync>),
}

/// What a validator closure reports back.
#[derive(Clone)]
pub enum ValidatorOutcome {
    Pass,
    /// Failed; the validator's message (or a templated default) applies.
    Fail,
    /// Failed with a specific error.
    Error(TyError),
    /// Nested submodel findings, spliced in under `parent.child` keys.
    Nested(Vec<crate::issue::FieldIssue>),
}

/// One entry of the `validators` meta: an optional `determine` gate, the
/// check itself, and a message.
#[derive(Clone)]
pub struct Validator {
    pub(crate) determine: Option<ValueCtxFn<bool>>,
    pub(crate) validate: ValueCtxFn<ValidatorOutcome>,
    pub(crate) message: Option<ValidatorMessage>,
}

impl Validator {
    pub fn new(
        validate: impl Fn(&Value, &dyn SchemaCtx) -> MetaResult<ValidatorOutcome>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Validator {
            determine: None,
            validate: Arc::new(validate),
            message: None,
        }
    }

    /// The common shape: a boolean predicate over the value plus a message.
    pub fn check(
        predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
        message: impl Into<String>,
    ) -> Self {
        Validator::new(move |value, _| {
            Ok(if predicate(value) {
                ValidatorOutcome::Pass
            } else {
                ValidatorOutcome::Fail
            })
        })
        .with_message(message)
    }

    pub fn with_determine(
        mut self,
        determine: impl Fn(&Value, &dyn SchemaCtx) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.determine = Some(Arc::new(move |value, ctx| Ok(determine(value, ctx))));
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(ValidatorMessage::Text(message.into()));
        self
    }

    pub fn with_message_fn(
        mut self,
        make: impl Fn(&Value, &str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.message = Some(ValidatorMessage::Make(Arc::new(make)));
        self
    }
}

/// The per-field meta bag.
///
/// Built with chained setters; every recognized meta of the schema surface
/// has one. Closures that can fail take the `try_` variants; the plain
/// variants wrap infallible closures.
#[derive(Clone, Default)]
pub struct FieldDef {
    pub(crate) default: Option<DefaultMeta>,
    pub(crate) ty: Option<Pattern>,
    pub(crate) message: Option<String>,
    pub(crate) compute: Option<CtxFn<Value>>,
    pub(crate) validators: Vec<Validator>,
    pub(crate) create: Option<CreateFn>,
    pub(crate) drop: Option<DropMeta>,
    pub(crate) map: Option<ExportFn<Value>>,
    pub(crate) flat: Option<ExportFn<Record>>,
    pub(crate) getter: Option<ValueCtxFn<Value>>,
    pub(crate) setter: Option<ValueCtxFn<Value>>,
    pub(crate) required: Option<TriMeta>,
    pub(crate) readonly: Option<TriMeta>,
    pub(crate) disabled: Option<TriMeta>,
    pub(crate) watch: Option<FieldChangeFn>,
    pub(crate) hidden: Option<HiddenMeta>,
    pub(crate) catch: Option<CatchFn>,
    pub(crate) extras: IndexMap<String, MetaValue>,
}

impl FieldDef {
    pub fn new() -> Self {
        FieldDef::default()
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultMeta::Value(value.into()));
        self
    }

    pub fn default_with(mut self, produce: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        self.default = Some(DefaultMeta::Produce(Arc::new(produce)));
        self
    }

    pub fn of_type(mut self, pattern: impl Into<Pattern>) -> Self {
        self.ty = Some(pattern.into());
        self
    }

    /// Default message for type failures on this field.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Marks the field computed: read-only, derived from the context.
    pub fn compute(mut self, compute: impl Fn(&dyn SchemaCtx) -> Value + Send + Sync + 'static) -> Self {
        self.compute = Some(Arc::new(move |ctx| Ok(compute(ctx))));
        self
    }

    pub fn try_compute(
        mut self,
        compute: impl Fn(&dyn SchemaCtx) -> MetaResult<Value> + Send + Sync + 'static,
    ) -> Self {
        self.compute = Some(Arc::new(compute));
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn create(
        mut self,
        create: impl Fn(&Record, &str, &Value) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.create = Some(Arc::new(move |data, key, value| Ok(create(data, key, value))));
        self
    }

    pub fn drop_on(mut self, on: bool) -> Self {
        self.drop = Some(DropMeta::On(on));
        self
    }

    pub fn drop_if(
        mut self,
        decide: impl Fn(&Value, &str, &Record) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.drop = Some(DropMeta::Decide(Arc::new(move |value, key, data| {
            Ok(decide(value, key, data))
        })));
        self
    }

    pub fn map(
        mut self,
        map: impl Fn(&Value, &str, &Record) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.map = Some(Arc::new(move |value, key, data| Ok(map(value, key, data))));
        self
    }

    pub fn flat(
        mut self,
        flat: impl Fn(&Value, &str, &Record) -> Record + Send + Sync + 'static,
    ) -> Self {
        self.flat = Some(Arc::new(move |value, key, data| Ok(flat(value, key, data))));
        self
    }

    pub fn getter(
        mut self,
        getter: impl Fn(&Value, &dyn SchemaCtx) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.getter = Some(Arc::new(move |value, ctx| Ok(getter(value, ctx))));
        self
    }

    pub fn setter(
        mut self,
        setter: impl Fn(&Value, &dyn SchemaCtx) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.setter = Some(Arc::new(move |value, ctx| Ok(setter(value, ctx))));
        self
    }

    pub fn required(mut self, meta: impl Into<TriMeta>) -> Self {
        self.required = Some(meta.into());
        self
    }

    pub fn readonly(mut self, meta: impl Into<TriMeta>) -> Self {
        self.readonly = Some(meta.into());
        self
    }

    pub fn disabled(mut self, meta: impl Into<TriMeta>) -> Self {
        self.disabled = Some(meta.into());
        self
    }

    pub fn watch(mut self, watch: impl Fn(&FieldChange) + Send + Sync + 'static) -> Self {
        self.watch = Some(Arc::new(watch));
        self
    }

    pub fn hidden(mut self, meta: impl Into<HiddenMeta>) -> Self {
        self.hidden = Some(meta.into());
        self
    }

    /// Per-field error sink; a returned value becomes the fallback for the
    /// failed meta.
    pub fn catch(
        mut self,
        catch: impl Fn(&SchemaIssue) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.catch = Some(Arc::new(catch));
        self
    }

    /// An arbitrary meta, surfaced on views when the model's meta policy
    /// admits it.
    pub fn meta(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras
            .insert(name.into(), MetaValue::Value(value.into()));
        self
    }

    pub fn meta_fn(
        mut self,
        name: impl Into<String>,
        decide: impl Fn(&dyn SchemaCtx) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.extras.insert(
            name.into(),
            MetaValue::Decide(Arc::new(move |ctx| Ok(decide(ctx)))),
        );
        self
    }

    pub fn is_computed(&self) -> bool {
        self.compute.is_some()
    }

    pub fn has_watch(&self) -> bool {
        self.watch.is_some()
    }
}

impl fmt::Debug for FieldDef {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        out.debug_struct("FieldDef")
            .field("type", &self.ty)
            .field("computed", &self.is_computed())
            .field("validators", &self.validators.len())
            .finish_non_exhaustive()
    }
}
