use crate::value::Value;
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{LazyLock, PoisonError, RwLock};
use tracing::warn;

/// A clonable predicate deciding whether a value belongs to a prototype
/// token. Closures implement it through the blanket impl.
pub trait ProtoPredicate: DynClone + Send + Sync {
    fn test(&self, value: &Value) -> bool;
}
dyn_clone::clone_trait_object!(ProtoPredicate);

impl<F> ProtoPredicate for F
where
    F: Fn(&Value) -> bool + Clone + Send + Sync,
{
    fn test(&self, value: &Value) -> bool {
        self(value)
    }
}

/// A prototype token: the atom of the pattern language.
///
/// `Regex` carries its source text and matches only strings. `Custom` names
/// an embedder-registered token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prototype {
    Number,
    Int,
    Float,
    String,
    Bool,
    Object,
    Array,
    Null,
    Uuid,
    DateTime,
    NaN,
    Infinity,
    Regex(String),
    Custom(String),
}

impl Prototype {
    pub fn regex(source: impl Into<String>) -> Self {
        Prototype::Regex(source.into())
    }

    pub fn custom(name: impl Into<String>) -> Self {
        Prototype::Custom(name.into())
    }

    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Prototype::Number => Cow::Borrowed("Number"),
            Prototype::Int => Cow::Borrowed("Int"),
            Prototype::Float => Cow::Borrowed("Float"),
            Prototype::String => Cow::Borrowed("String"),
            Prototype::Bool => Cow::Borrowed("Bool"),
            Prototype::Object => Cow::Borrowed("Object"),
            Prototype::Array => Cow::Borrowed("Array"),
            Prototype::Null => Cow::Borrowed("Null"),
            Prototype::Uuid => Cow::Borrowed("Uuid"),
            Prototype::DateTime => Cow::Borrowed("DateTime"),
            Prototype::NaN => Cow::Borrowed("NaN"),
            Prototype::Infinity => Cow::Borrowed("Infinity"),
            Prototype::Regex(source) => Cow::Owned(format!("/{source}/")),
            Prototype::Custom(name) => Cow::Owned(name.clone()),
        }
    }
}

type Registry = HashMap<Prototype, Box<dyn ProtoPredicate>>;

static REGISTRY: LazyLock<RwLock<Registry>> = LazyLock::new(|| RwLock::new(builtin_registry()));

static REGEX_CACHE: LazyLock<RwLock<HashMap<String, Option<regex::Regex>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn builtin_registry() -> Registry {
    let mut table: Registry = HashMap::new();
    table.insert(
        Prototype::Number,
        Box::new(|v: &Value| matches!(v, Value::Int(_)) || matches!(v, Value::Float(f) if !f.is_nan())),
    );
    table.insert(Prototype::Int, Box::new(|v: &Value| matches!(v, Value::Int(_))));
    table.insert(
        Prototype::Float,
        Box::new(|v: &Value| matches!(v, Value::Float(f) if !f.is_nan())),
    );
    table.insert(
        Prototype::String,
        Box::new(|v: &Value| matches!(v, Value::String(_))),
    );
    table.insert(Prototype::Bool, Box::new(|v: &Value| matches!(v, Value::Bool(_))));
    table.insert(
        Prototype::Object,
        Box::new(|v: &Value| matches!(v, Value::Object(_))),
    );
    table.insert(
        Prototype::Array,
        Box::new(|v: &Value| matches!(v, Value::Array(_))),
    );
    table.insert(Prototype::Null, Box::new(|v: &Value| v.is_null()));
    table.insert(Prototype::Uuid, Box::new(|v: &Value| matches!(v, Value::Uuid(_))));
    table.insert(
        Prototype::DateTime,
        Box::new(|v: &Value| matches!(v, Value::OffsetDateTime(_))),
    );
    table.insert(
        Prototype::NaN,
        Box::new(|v: &Value| matches!(v, Value::Float(f) if f.is_nan())),
    );
    table.insert(
        Prototype::Infinity,
        Box::new(|v: &Value| matches!(v, Value::Float(f) if f.is_infinite())),
    );
    table
}

/// Associates a token with a predicate, replacing any prior registration.
pub fn register(token: Prototype, predicate: impl ProtoPredicate + 'static) {
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    registry.insert(token, Box::new(predicate));
}

/// Removes a token registration; returns whether one existed.
pub fn unregister(token: &Prototype) -> bool {
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    registry.remove(token).is_some()
}

/// Looks up the predicate registered for a token.
pub fn find(token: &Prototype) -> Option<Box<dyn ProtoPredicate>> {
    let registry = REGISTRY.read().unwrap_or_else(PoisonError::into_inner);
    registry.get(token).cloned()
}

/// Entry point of the triadic helper: `is(token).existing()`,
/// `is(token).type_of(value)`, `is(token).equal(value)`.
pub fn is(token: Prototype) -> IsToken {
    IsToken { token }
}

pub struct IsToken {
    token: Prototype,
}

impl IsToken {
    /// Whether the token is known: registered, or a regex (which needs no
    /// registration).
    pub fn existing(&self) -> bool {
        matches!(self.token, Prototype::Regex(_)) || find(&self.token).is_some()
    }

    /// Membership test. Regex tokens match only strings; `NaN` only a NaN
    /// float; unknown tokens match nothing.
    pub fn type_of(&self, value: &Value) -> bool {
        match &self.token {
            Prototype::Regex(source) => match value {
                Value::String(s) => regex_matches(source, s),
                _ => false,
            },
            token => match find(token) {
                Some(predicate) => predicate.test(value),
                None => false,
            },
        }
    }

    /// Literal equality against the value-like tokens (`NaN`, `Infinity`,
    /// `Null`); always false for constructor-like tokens.
    pub fn equal(&self, value: &Value) -> bool {
        match &self.token {
            Prototype::NaN => matches!(value, Value::Float(f) if f.is_nan()),
            Prototype::Infinity => matches!(value, Value::Float(f) if f.is_infinite()),
            Prototype::Null => value.is_null(),
            _ => false,
        }
    }
}

/// Compiles through a process-wide cache; an invalid source logs once and
/// never matches.
fn regex_matches(source: &str, candidate: &str) -> bool {
    {
        let cache = REGEX_CACHE.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = cache.get(source) {
            return entry
                .as_ref()
                .map(|re| re.is_match(candidate))
                .unwrap_or(false);
        }
    }
    let compiled = regex::Regex::new(source);
    if let Err(err) = &compiled {
        warn!(%source, %err, "invalid regex pattern never matches");
    }
    let mut cache = REGEX_CACHE.write().unwrap_or_else(PoisonError::into_inner);
    let entry = cache.entry(source.to_string()).or_insert(compiled.ok());
    entry
        .as_ref()
        .map(|re| re.is_match(candidate))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn builtin_tokens_are_preregistered() {
        assert_that(is(Prototype::String).existing()).is_true();
        assert_that(is(Prototype::Number).type_of(&Value::from(3))).is_true();
        assert_that(is(Prototype::Number).type_of(&Value::Float(f64::NAN))).is_false();
        assert_that(is(Prototype::NaN).type_of(&Value::Float(f64::NAN))).is_true();
        assert_that(is(Prototype::Infinity).type_of(&Value::Float(f64::INFINITY))).is_true();
    }

    #[test]
    fn regex_tokens_match_only_strings() {
        let token = Prototype::regex("^[a-z]+$");

        assert_that(is(token.clone()).type_of(&Value::from("abc"))).is_true();
        assert_that(is(token.clone()).type_of(&Value::from("ABC"))).is_false();
        assert_that(is(token).type_of(&Value::from(3))).is_false();
    }

    #[test]
    fn custom_tokens_can_be_registered_and_removed() {
        let token = Prototype::custom("even");
        register(token.clone(), |v: &Value| {
            v.as_int().map(|i| i % 2 == 0).unwrap_or(false)
        });

        assert_that(is(token.clone()).type_of(&Value::from(4))).is_true();
        assert_that(is(token.clone()).type_of(&Value::from(5))).is_false();
        assert_that(unregister(&token)).is_true();
        assert_that(is(token).existing()).is_false();
    }

    #[test]
    fn equal_covers_the_value_like_tokens() {
        assert_that(is(Prototype::NaN).equal(&Value::Float(f64::NAN))).is_true();
        assert_that(is(Prototype::Null).equal(&Value::Null)).is_true();
        assert_that(is(Prototype::String).equal(&Value::from("x"))).is_false();
    }
}
