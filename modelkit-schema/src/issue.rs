use modelkit_ty::{ErrorKind, TyError};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// A meta evaluation failure, normalized at the schema boundary and routed
/// through the context's error sink and the field's `catch`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("meta '{meta}' of field '{key}' failed: {error}")]
pub struct SchemaIssue {
    pub key: String,
    /// The meta that failed (`"compute"`, `"setter"`, `"type"`, ...).
    pub meta: &'static str,
    #[source]
    pub error: TyError,
}

impl SchemaIssue {
    pub fn new(key: impl Into<String>, meta: &'static str, error: TyError) -> Self {
        SchemaIssue {
            key: key.into(),
            meta,
            error,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// One validation finding for a field.
///
/// `at` is the index of the validator that produced the finding; required
/// and type failures carry no index.
#[derive(Debug, Clone, PartialEq, ToSchema, Serialize, Deserialize)]
pub struct FieldIssue {
    pub key: String,
    pub at: Option<usize>,
    pub kind: ErrorKind,
    pub message: String,
}

impl FieldIssue {
    pub fn new(
        key: impl Into<String>,
        at: Option<usize>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        FieldIssue {
            key: key.into(),
            at,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(out, "{}: {}", self.key, self.message)
    }
}
