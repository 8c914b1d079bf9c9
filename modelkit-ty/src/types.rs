use crate::error::{ErrorKind, TyError};
use crate::pattern::Pattern;
use crate::prototype;
use crate::value::{Record, Value};
use indexmap::IndexMap;
use std::borrow::Cow;

/// Checking mode.
///
/// `Default` keeps each structural type's natural behavior: tuples reject
/// length mismatches, mappings ignore unknown keys. `Strict` additionally
/// rejects unknown mapping keys; `Loose` tolerates extra tuple elements.
/// The mode set on a `Type` is inherited by nested structural patterns
/// unless a nested `Type` carries its own explicit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Default,
    Strict,
    Loose,
}

#[derive(Debug, Clone)]
enum TypeKind {
    Plain(Pattern),
    Dict(IndexMap<String, Pattern>),
    List(Vec<Pattern>),
    Tuple(Vec<Pattern>),
    Enum(Vec<Pattern>),
    Range {
        min: f64,
        max: f64,
        min_bound: bool,
        max_bound: bool,
    },
}

/// A pattern wrapped with a name and a checking mode.
///
/// The behavioral contract: `assert` returns a single `TyError` locating
/// the offending sub-value, `catch` is its non-throwing twin, `test` the
/// boolean view. `clone()` preserves the mode.
#[derive(Debug, Clone)]
pub struct Type {
    name: Cow<'static, str>,
    kind: TypeKind,
    mode: Mode,
}

impl Type {
    pub fn new(pattern: impl Into<Pattern>) -> Self {
        let pattern = pattern.into();
        Type {
            name: Cow::Owned(pattern.name()),
            kind: TypeKind::Plain(pattern),
            mode: Mode::Default,
        }
    }

    pub fn named(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// A strict clone: unknown mapping keys become `dirty` errors.
    pub fn strict(&self) -> Self {
        self.clone().with_mode(Mode::Strict)
    }

    /// A loose clone: extra tuple elements are tolerated.
    pub fn loose(&self) -> Self {
        self.clone().with_mode(Mode::Loose)
    }

    pub fn assert(&self, value: &Value) -> Result<(), TyError> {
        self.check_with(self.mode, value)
    }

    pub fn catch(&self, value: &Value) -> Option<TyError> {
        self.assert(value).err()
    }

    pub fn test(&self, value: &Value) -> bool {
        self.assert(value).is_ok()
    }

    /// Applies rule corrections (`override`/`decorate`) across a record for
    /// mapping-shaped types. Non-mapping types are untouched.
    pub fn coerce(&self, data: &mut Record) {
        let entries = match &self.kind {
            TypeKind::Dict(entries) => entries,
            TypeKind::Plain(Pattern::Map(entries)) => entries,
            _ => return,
        };
        for (key, pattern) in entries {
            pattern.coerce_member(data, key.as_str());
        }
    }

    pub(crate) fn check_with(&self, inherited: Mode, value: &Value) -> Result<(), TyError> {
        let mode = if self.mode == Mode::Default {
            inherited
        } else {
            self.mode
        };
        match &self.kind {
            TypeKind::Plain(pattern) => check_pattern(pattern, value, mode, None),
            TypeKind::Dict(entries) => check_map(entries, value, mode),
            TypeKind::List(items) => check_seq(items, value, mode),
            TypeKind::Tuple(items) => check_tuple(items, value, mode),
            TypeKind::Enum(options) => check_enum(options, value, mode),
            TypeKind::Range {
                min,
                max,
                min_bound,
                max_bound,
            } => check_range(*min, *max, *min_bound, *max_bound, value),
        }
    }
}

// ============================================================================
// Type factories
// ============================================================================

/// A mapping type: every listed key must be present and match.
pub fn dict<K: Into<String>, P: Into<Pattern>>(entries: impl IntoIterator<Item = (K, P)>) -> Type {
    Type {
        name: Cow::Borrowed("Dict"),
        kind: TypeKind::Dict(
            entries
                .into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
        ),
        mode: Mode::Default,
    }
}

/// A homogeneous list: every element must match the item pattern.
pub fn list(item: impl Into<Pattern>) -> Type {
    Type {
        name: Cow::Borrowed("List"),
        kind: TypeKind::List(vec![item.into()]),
        mode: Mode::Default,
    }
}

/// A list whose every element must match any of the given patterns.
pub fn list_of(items: impl IntoIterator<Item = impl Into<Pattern>>) -> Type {
    Type {
        name: Cow::Borrowed("List"),
        kind: TypeKind::List(items.into_iter().map(Into::into).collect()),
        mode: Mode::Default,
    }
}

/// Positional patterns with length equality (loose mode tolerates extra
/// trailing elements).
pub fn tuple(items: impl IntoIterator<Item = impl Into<Pattern>>) -> Type {
    Type {
        name: Cow::Borrowed("Tuple"),
        kind: TypeKind::Tuple(items.into_iter().map(Into::into).collect()),
        mode: Mode::Default,
    }
}

/// The value must match any of the given patterns.
pub fn one_of(options: impl IntoIterator<Item = impl Into<Pattern>>) -> Type {
    Type {
        name: Cow::Borrowed("Enum"),
        kind: TypeKind::Enum(options.into_iter().map(Into::into).collect()),
        mode: Mode::Default,
    }
}

/// A numeric interval, both bounds included.
pub fn range(min: f64, max: f64) -> Type {
    range_between(min, max, true, true)
}

/// A numeric interval with explicit bound inclusion.
pub fn range_between(min: f64, max: f64, min_bound: bool, max_bound: bool) -> Type {
    Type {
        name: Cow::Borrowed("Range"),
        kind: TypeKind::Range {
            min,
            max,
            min_bound,
            max_bound,
        },
        mode: Mode::Default,
    }
}

// ============================================================================
// The checker
// ============================================================================

/// Recursive pattern check. Errors come back relative to `value`; callers
/// prepend location segments while unwinding. `parent` carries the member
/// context rules need for their `(data, key)` hooks.
pub(crate) fn check_pattern(
    pattern: &Pattern,
    value: &Value,
    mode: Mode,
    parent: Option<(&Record, &str)>,
) -> Result<(), TyError> {
    match pattern {
        Pattern::Any => Ok(()),
        Pattern::Proto(token) => {
            if prototype::is(token.clone()).type_of(value) {
                Ok(())
            } else {
                Err(TyError::new(ErrorKind::Mistaken, value, token.name()))
            }
        }
        Pattern::Equal(expected) => {
            if value == expected {
                Ok(())
            } else {
                Err(TyError::new(
                    ErrorKind::Mistaken,
                    value,
                    expected.to_string(),
                ))
            }
        }
        Pattern::Map(entries) => check_map(entries, value, mode),
        Pattern::Seq(items) => check_seq(items, value, mode),
        Pattern::Typed(ty) => ty.check_with(mode, value),
        Pattern::Rule(rule) => match parent {
            Some((data, key)) => rule.check_in(data, key, mode),
            None => rule.check_value(value, mode),
        },
    }
}

fn check_map(
    entries: &IndexMap<String, Pattern>,
    value: &Value,
    mode: Mode,
) -> Result<(), TyError> {
    let record = match value {
        Value::Object(record) => record,
        _ => return Err(TyError::new(ErrorKind::Mistaken, value, "Object")),
    };
    for (key, pattern) in entries {
        match pattern {
            Pattern::Rule(rule) => rule
                .check_in(record, key, mode)
                .map_err(|err| err.at(key.clone()))?,
            _ => match record.get(key) {
                Some(member) => check_pattern(pattern, member, mode, Some((record, key)))
                    .map_err(|err| err.at(key.clone()))?,
                None => return Err(TyError::missing(pattern.name(), key.clone())),
            },
        }
    }
    if mode == Mode::Strict {
        for (key, member) in record {
            if !entries.contains_key(key) {
                return Err(TyError::new(ErrorKind::Dirty, member, "{..}").at(key.clone()));
            }
        }
    }
    Ok(())
}

fn check_seq(items: &[Pattern], value: &Value, mode: Mode) -> Result<(), TyError> {
    let elements = match value {
        Value::Array(elements) => elements,
        _ => return Err(TyError::new(ErrorKind::Mistaken, value, "Array")),
    };
    match items {
        [] => Ok(()),
        [item] => {
            for (index, element) in elements.iter().enumerate() {
                check_pattern(item, element, mode, None).map_err(|err| err.at(index))?;
            }
            Ok(())
        }
        items => {
            for (index, element) in elements.iter().enumerate() {
                let matched = items
                    .iter()
                    .any(|item| check_pattern(item, element, mode, None).is_ok());
                if !matched {
                    return Err(TyError::new(ErrorKind::Mistaken, element, "[..]").at(index));
                }
            }
            Ok(())
        }
    }
}

fn check_tuple(items: &[Pattern], value: &Value, mode: Mode) -> Result<(), TyError> {
    let elements = match value {
        Value::Array(elements) => elements,
        _ => return Err(TyError::new(ErrorKind::Mistaken, value, "Tuple")),
    };
    if elements.len() != items.len() {
        let tolerated = mode == Mode::Loose && elements.len() > items.len();
        if !tolerated {
            return Err(TyError::new(ErrorKind::Dirty, value, "Tuple"));
        }
    }
    for (index, (item, element)) in items.iter().zip(elements).enumerate() {
        check_pattern(item, element, mode, None).map_err(|err| err.at(index))?;
    }
    Ok(())
}

fn check_enum(options: &[Pattern], value: &Value, mode: Mode) -> Result<(), TyError> {
    let matched = options
        .iter()
        .any(|option| check_pattern(option, value, mode, None).is_ok());
    if matched {
        Ok(())
    } else {
        Err(TyError::new(ErrorKind::Mistaken, value, "Enum"))
    }
}

fn check_range(
    min: f64,
    max: f64,
    min_bound: bool,
    max_bound: bool,
    value: &Value,
) -> Result<(), TyError> {
    let name = format!(
        "{}{min}, {max}{}",
        if min_bound { '[' } else { '(' },
        if max_bound { ']' } else { ')' }
    );
    let number = match value.as_number() {
        Some(number) => number,
        None => return Err(TyError::new(ErrorKind::Mistaken, value, name)),
    };
    let below = if min_bound { number < min } else { number <= min };
    let above = if max_bound { number > max } else { number >= max };
    if below || above {
        return Err(TyError::new(ErrorKind::Unexcepted, value, name));
    }
    Ok(())
}
