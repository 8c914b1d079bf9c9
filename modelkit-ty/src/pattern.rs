use crate::prototype::Prototype;
use crate::rule::Rule;
use crate::types::Type;
use crate::value::{Record, Value};
use indexmap::IndexMap;
use std::fmt;

/// The recursive type-expression union: the language every check speaks.
///
/// A bare mapping or sequence literal is a structural pattern; wrap in
/// `Type` (via the factories) to control mode, or in `Rule` for conditional
/// behavior.
#[derive(Clone)]
pub enum Pattern {
    /// Matches anything.
    Any,
    /// A prototype token (primitive constructor, regex, NaN, Infinity, ...).
    Proto(Prototype),
    /// Literal equality.
    Equal(Value),
    /// Structural mapping: every listed key must be present and match.
    Map(IndexMap<String, Pattern>),
    /// Sequence literal. One entry: every element matches it. Several:
    /// every element matches any of them.
    Seq(Vec<Pattern>),
    /// A nested `Type` carrying its own mode.
    Typed(Box<Type>),
    /// A conditional/combinator rule.
    Rule(Box<Rule>),
}

impl Pattern {
    /// Builds a mapping pattern from `(key, pattern)` pairs.
    pub fn map<K: Into<String>, P: Into<Pattern>>(
        entries: impl IntoIterator<Item = (K, P)>,
    ) -> Pattern {
        Pattern::Map(
            entries
                .into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
        )
    }

    /// The pattern's display name as used in error messages.
    pub fn name(&self) -> String {
        match self {
            Pattern::Any => "Any".to_string(),
            Pattern::Proto(token) => token.name().into_owned(),
            Pattern::Equal(value) => value.to_string(),
            Pattern::Map(_) => "{..}".to_string(),
            Pattern::Seq(_) => "[..]".to_string(),
            Pattern::Typed(ty) => ty.name().to_string(),
            Pattern::Rule(rule) => rule.name().to_string(),
        }
    }

    /// Applies rule corrections (`override` on mismatch, `decorate` on
    /// match) for one member of `data`. Non-rule patterns are untouched.
    pub fn coerce_member(&self, data: &mut Record, key: &str) {
        if let Pattern::Rule(rule) = self {
            rule.coerce(data, key);
        }
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Map(entries) => out.debug_map().entries(entries.iter()).finish(),
            Pattern::Seq(items) => out.debug_list().entries(items.iter()).finish(),
            other => write!(out, "{}", other.name()),
        }
    }
}

impl From<Prototype> for Pattern {
    fn from(token: Prototype) -> Self {
        Pattern::Proto(token)
    }
}

impl From<Value> for Pattern {
    fn from(value: Value) -> Self {
        Pattern::Equal(value)
    }
}

impl From<Type> for Pattern {
    fn from(ty: Type) -> Self {
        Pattern::Typed(Box::new(ty))
    }
}

impl From<Rule> for Pattern {
    fn from(rule: Rule) -> Self {
        Pattern::Rule(Box::new(rule))
    }
}

impl From<Vec<Pattern>> for Pattern {
    fn from(items: Vec<Pattern>) -> Self {
        Pattern::Seq(items)
    }
}
