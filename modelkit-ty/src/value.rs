use dyn_clone::DynClone;
use dyn_eq::DynEq;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::format_description::well_known::Rfc3339;
use utoipa::ToSchema;

/// An ordered field-name → value record. The storage shape of every model
/// instance and the `data` argument handed to `(data, key)` style hooks.
pub type Record = IndexMap<String, Value>;

/// Represents the type kind of a `Value` variant.
///
/// Provides runtime type information for field values, enabling dispatch
/// based on value types without matching on `Value` directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToSchema, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Uuid,
    OffsetDateTime,
    Array,
    Object,
    /// Fallback for custom types using `Value::Other`.
    Other,
}

/// Extension trait for custom field value types.
///
/// Implement this trait for embedder-defined scalar types that need to be
/// stored in `Value::Other`. Built-in types have dedicated `Value` variants
/// and don't need this trait.
#[typetag::serde]
pub trait CustomValue:
    fmt::Debug + DynClone + DynEq + downcast_rs::Downcast + Send + Sync
{
}
dyn_clone::clone_trait_object!(CustomValue);
dyn_eq::eq_trait_object!(CustomValue);
downcast_rs::impl_downcast!(CustomValue);

/// The dynamic datum flowing through stores, schemas and models.
///
/// The optionality of a field is tracked by its schema metas, not by the
/// value: use `Value::Null` to represent an absent value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Explicit absence of a value.
    Null,

    // Primitives.
    Bool(bool),
    Int(i64),
    Float(f64),

    // Common types.
    String(String),

    // Ecosystem support.
    Uuid(uuid::Uuid),
    OffsetDateTime(#[serde(with = "time::serde::rfc3339")] time::OffsetDateTime),

    // Collections.
    Array(Vec<Value>),
    Object(Record),

    // Extension support.
    Other(Box<dyn CustomValue>),
}

/// Deep equality, numeric-coercing across `Int`/`Float` so that a value
/// written as `14` compares equal to one computed as `14.0`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *b == *a as f64
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (Value::OffsetDateTime(a), Value::OffsetDateTime(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Other(a), Value::Other(b)) => a == b,
            _ => false,
        }
    }
}

/// Generates `as_<variant>` accessor methods that return `Option<T>` by copying.
macro_rules! impl_as {
    ($($variant:ident, $ty:ty);* $(;)?) => {
        paste::paste! {
            $(
                pub fn [<as_ $variant:snake>](&self) -> Option<$ty> {
                    match self {
                        Self::$variant(v) => Some(*v),
                        _ => None,
                    }
                }
            )*
        }
    };
}

/// Generates `as_<variant>` accessor methods that return `Option<&T>` by reference.
macro_rules! impl_as_ref {
    ($($variant:ident, $ty:ty);* $(;)?) => {
        paste::paste! {
            $(
                pub fn [<as_ $variant:snake>](&self) -> Option<&$ty> {
                    match self {
                        Self::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            )*
        }
    };
}

/// Generates `take_<variant>` consuming accessor methods that return `Option<T>`.
macro_rules! impl_take {
    ($($variant:ident, $ty:ty);* $(;)?) => {
        paste::paste! {
            $(
                pub fn [<take_ $variant:snake>](self) -> Option<$ty> {
                    match self {
                        Self::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            )*
        }
    };
}

/// Generates `expect_<variant>` methods that call `as_<variant>` and panic on None.
macro_rules! impl_expect {
    ($($variant:ident, $ty:ty);* $(;)?) => {
        paste::paste! {
            $(
                pub fn [<expect_ $variant:snake>](&self) -> $ty {
                    self.[<as_ $variant:snake>]().expect(concat!("Value is not ", stringify!($variant)))
                }
            )*
        }
    };
}

impl Value {
    /// Returns true if this value is Null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Emptiness as the `required` check sees it: `Null`, the empty string,
    /// `NaN`, and empty arrays/objects are empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Float(f) => f.is_nan(),
            Value::Array(items) => items.is_empty(),
            Value::Object(record) => record.is_empty(),
            _ => false,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::OffsetDateTime(_) => ValueKind::OffsetDateTime,
            Value::Array(_) => ValueKind::Array,
            Value::Object(_) => ValueKind::Object,
            Value::Other(_) => ValueKind::Other,
        }
    }

    /// Numeric view over `Int` and `Float`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    // === Copy accessors (primitives) ===

    impl_as! {
        Bool, bool;
        Int, i64;
        Float, f64;
        Uuid, uuid::Uuid;
    }

    // === Reference accessors ===

    impl_as_ref! {
        String, String;
        Array, Vec<Value>;
        Object, Record;
        Other, Box<dyn CustomValue>;
    }

    // === Date/time accessor with String parsing fallback ===

    pub fn as_offset_date_time(&self) -> Option<time::OffsetDateTime> {
        match self {
            Self::OffsetDateTime(v) => Some(*v),
            Self::String(s) => time::OffsetDateTime::parse(s, &Rfc3339).ok(),
            _ => None,
        }
    }

    // === Taking ownership (consuming accessors) ===

    impl_take! {
        String, String;
        Array, Vec<Value>;
        Object, Record;
        Other, Box<dyn CustomValue>;
    }

    // === Expect methods (panic on wrong type or Null) ===

    impl_expect! {
        Bool, bool;
        Int, i64;
        Float, f64;
        Uuid, uuid::Uuid;

        String, &String;
        Array, &Vec<Value>;
        Object, &Record;
    }

    // === JSON interop ===

    /// Structural conversion from a `serde_json` tree. Whole numbers land in
    /// `Int`, everything else numeric in `Float`.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Structural conversion into a `serde_json` tree. Non-finite floats
    /// export as `null`; uuids and datetimes export as strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Uuid(u) => serde_json::Value::String(u.to_string()),
            Value::OffsetDateTime(dt) => dt
                .format(&Rfc3339)
                .map(serde_json::Value::String)
                .unwrap_or(serde_json::Value::Null),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(record) => serde_json::Value::Object(
                record.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Other(custom) => serde_json::to_value(custom).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Converts a whole JSON object into a `Record`; non-object inputs yield
    /// an empty record.
    pub fn record_from_json(json: serde_json::Value) -> Record {
        match Value::from_json(json) {
            Value::Object(record) => record,
            _ => Record::new(),
        }
    }

    pub fn record_to_json(record: &Record) -> serde_json::Value {
        Value::Object(record.clone()).to_json()
    }
}

/// The human-readable repr used inside error messages: `NaN`/`Infinity`
/// spelled out, everything else rendered as compact JSON.
impl fmt::Display for Value {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(f) if f.is_nan() => write!(out, "NaN"),
            Value::Float(f) if f.is_infinite() && *f > 0.0 => write!(out, "Infinity"),
            Value::Float(f) if f.is_infinite() => write!(out, "-Infinity"),
            other => {
                let rendered = serde_json::to_string(&other.to_json())
                    .unwrap_or_else(|_| "<value>".to_string());
                write!(out, "{rendered}")
            }
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(value: uuid::Uuid) -> Self {
        Value::Uuid(value)
    }
}

impl From<time::OffsetDateTime> for Value {
    fn from(value: time::OffsetDateTime) -> Self {
        Value::OffsetDateTime(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Object(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// Builds a `Record` from `(key, value)` pairs.
pub fn record<K: Into<String>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Record {
    entries
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn numeric_equality_coerces_across_int_and_float() {
        assert_that(Value::Int(14) == Value::Float(14.0)).is_true();
        assert_that(Value::Int(14) == Value::Float(14.5)).is_false();
        assert_that(Value::Float(f64::NAN) == Value::Float(f64::NAN)).is_false();
    }

    #[test]
    fn emptiness_matches_required_semantics() {
        assert_that(Value::Null.is_empty()).is_true();
        assert_that(Value::from("").is_empty()).is_true();
        assert_that(Value::Float(f64::NAN).is_empty()).is_true();
        assert_that(Value::Array(vec![]).is_empty()).is_true();
        assert_that(Value::from(0).is_empty()).is_false();
        assert_that(Value::from(false).is_empty()).is_false();
    }

    #[test]
    fn json_round_trip_preserves_structure() {
        let value = Value::Object(record([
            ("name", Value::from("tomy")),
            ("age", Value::from(10)),
            ("tags", Value::Array(vec![Value::from("a"), Value::from("b")])),
        ]));

        let json = value.to_json();
        let back = Value::from_json(json);

        assert_that(back).is_equal_to(value);
    }

    #[test]
    fn non_finite_floats_export_as_null() {
        assert_that(Value::Float(f64::NAN).to_json()).is_equal_to(serde_json::Value::Null);
        assert_that(Value::Float(f64::INFINITY).to_json()).is_equal_to(serde_json::Value::Null);
    }

    #[test]
    fn display_quotes_strings_and_names_non_finite_floats() {
        assert_that(Value::from("abc").to_string()).is_equal_to(r#""abc""#.to_string());
        assert_that(Value::Float(f64::NAN).to_string()).is_equal_to("NaN".to_string());
        assert_that(Value::from(7).to_string()).is_equal_to("7".to_string());
    }

    #[test]
    fn accessors_narrow_by_variant() {
        let value = Value::from(3);
        assert_that(value.as_int()).is_equal_to(Some(3));
        assert_that(value.as_float()).is_equal_to(None);
        assert_that(value.as_number()).is_equal_to(Some(3.0));
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Money {
        cents: i64,
    }

    #[typetag::serde]
    impl CustomValue for Money {}

    #[test]
    fn custom_values_compare_downcast_and_serialize() {
        let a = Value::Other(Box::new(Money { cents: 100 }));
        let b = Value::Other(Box::new(Money { cents: 100 }));

        assert_that(a == b).is_true();
        assert_that(a == Value::Other(Box::new(Money { cents: 1 }))).is_false();

        let cents = a
            .as_other()
            .and_then(|custom| custom.downcast_ref::<Money>())
            .map(|money| money.cents);
        assert_that(cents).is_equal_to(Some(100));

        let json = a.to_json();
        assert_that(json.get("Money").and_then(|m| m.get("cents")).cloned())
            .is_equal_to(Some(serde_json::json!(100)));
    }
}
