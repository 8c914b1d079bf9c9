use crate::path::{Path, Segment};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Kind tags for type and write-path failures.
///
/// The first block covers pattern mismatches, the second covers write-path
/// refusals surfaced through the schema boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ToSchema, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Value shape does not match the pattern.
    Mistaken,
    /// Strict-mode length or key mismatch.
    Dirty,
    /// Required-present member is absent.
    Missing,
    /// Value present where it should not be.
    Overflow,
    /// A user predicate or validator rejected.
    Exception,
    /// Bounds violation.
    Unexcepted,

    Locked,
    Disabled,
    Readonly,
    Compute,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Mistaken => "mistaken",
            ErrorKind::Dirty => "dirty",
            ErrorKind::Missing => "missing",
            ErrorKind::Overflow => "overflow",
            ErrorKind::Exception => "exception",
            ErrorKind::Unexcepted => "unexcepted",
            ErrorKind::Locked => "locked",
            ErrorKind::Disabled => "disabled",
            ErrorKind::Readonly => "readonly",
            ErrorKind::Compute => "compute",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(out, "{}", self.as_str())
    }
}

/// Structured type error: kind, offending value, pattern name, path and an
/// optional nested cause.
///
/// A root `assert` failure produces exactly one `TyError` whose path points
/// at the offending sub-location; path segments are prepended while the
/// check recursion unwinds.
#[derive(Debug, Clone, PartialEq)]
pub struct TyError {
    kind: ErrorKind,
    value: Value,
    pattern: String,
    path: Path,
    message: Option<String>,
    cause: Option<Box<TyError>>,
}

impl TyError {
    pub fn new(kind: ErrorKind, value: &Value, pattern: impl Into<String>) -> Self {
        TyError {
            kind,
            value: value.clone(),
            pattern: pattern.into(),
            path: Path::root(),
            message: None,
            cause: None,
        }
    }

    /// A `missing` error for an absent member; the offending "value" is Null.
    pub fn missing(pattern: impl Into<String>, key: impl Into<Segment>) -> Self {
        TyError::new(ErrorKind::Missing, &Value::Null, pattern).at(key)
    }

    /// Prepends a location segment; returns self for unwinding chains.
    pub fn at(mut self, segment: impl Into<Segment>) -> Self {
        self.path.prepend(segment);
        self
    }

    pub fn caused_by(mut self, cause: TyError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Replaces the rendered message wholesale (rule `message` overrides).
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cause(&self) -> Option<&TyError> {
        self.cause.as_deref()
    }

    /// The stable human-readable form:
    /// `<kind>: value <repr> does not match <pattern> at <path>`,
    /// with the ` at <path>` clause omitted for a root path. A message
    /// override set by a rule replaces the whole template.
    pub fn message(&self) -> String {
        if let Some(message) = &self.message {
            return message.clone();
        }
        if self.path.is_root() {
            format!(
                "{}: value {} does not match {}",
                self.kind, self.value, self.pattern
            )
        } else {
            format!(
                "{}: value {} does not match {} at {}",
                self.kind, self.value, self.pattern, self.path
            )
        }
    }
}

impl fmt::Display for TyError {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(out, "{}", self.message())
    }
}

impl std::error::Error for TyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;

    #[test]
    fn renders_the_stable_form() {
        let err = TyError::new(ErrorKind::Mistaken, &Value::from("x"), "Number")
            .at("age")
            .at("profile");

        assert_that(err.to_string())
            .is_equal_to(r#"mistaken: value "x" does not match Number at profile.age"#.to_string());
    }

    #[test]
    fn omits_the_path_clause_at_root() {
        let err = TyError::new(ErrorKind::Mistaken, &Value::from(1), "String");

        assert_that(err.to_string())
            .is_equal_to("mistaken: value 1 does not match String".to_string());
    }

    #[test]
    fn message_override_wins() {
        let err =
            TyError::new(ErrorKind::Exception, &Value::from(1), "Custom").with_message("too long");

        assert_that(err.to_string()).is_equal_to("too long".to_string());
    }

    #[test]
    fn cause_is_the_error_source() {
        let inner = TyError::new(ErrorKind::Mistaken, &Value::from(1), "String");
        let outer = TyError::new(ErrorKind::Mistaken, &Value::Null, "Dict").caused_by(inner);

        assert_that(std::error::Error::source(&outer).is_some()).is_true();
    }
}
