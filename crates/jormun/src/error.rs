//! Error taxonomy and result types for the interpreter core.
//!
//! Two layers exist, mirroring the engine's status protocol:
//! - [`JsResult`] is the Rust-level status returned by every fallible core
//!   function. `Err` means an error value must reach the embedder.
//! - [`JsError`] is the value-level error: kind, message, and (for parser
//!   errors) the file name and line number of the failing token.
//!
//! Property misses are not errors. Operations that can decline (for example
//! a property lookup that finds nothing) return [`Lookup::Declined`] so
//! callers can distinguish "absent" from "failed" without unwinding.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can produce a runtime error.
pub type JsResult<T> = Result<T, JsError>;

/// Error kinds reaching JavaScript as constructor names.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and
/// `Into<&'static str>` implementations. The string representation matches
/// the JavaScript constructor name exactly (e.g. `TypeError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Base error class; matches any error kind in instance checks.
    Error,
    EvalError,
    /// Engine-internal failures (malformed internal state, bad host input).
    InternalError,
    /// Allocation failure. A VM carries a pre-built singleton of this kind
    /// so reporting it never allocates.
    MemoryError,
    RangeError,
    ReferenceError,
    SyntaxError,
    TypeError,
    #[strum(serialize = "URIError")]
    UriError,
    AggregateError,
}

impl ErrorKind {
    /// Checks whether this kind would be caught by a handler for
    /// `handler_kind`. Only `Error` acts as a base class; every other kind
    /// matches itself alone.
    #[must_use]
    pub fn is_kind_of(self, handler_kind: Self) -> bool {
        self == handler_kind || handler_kind == Self::Error
    }
}

/// A value-level error as seen by the embedder and by JavaScript code.
///
/// Parser errors additionally carry `file_name` and `line_number`; runtime
/// errors leave both unset. The `Display` form matches the engine's
/// `error_string` output: `"TypeError: message"`, with a ` (file:line)`
/// suffix when location is known and not suppressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsError {
    kind: ErrorKind,
    message: String,
    file_name: Option<String>,
    line_number: Option<u32>,
}

impl JsError {
    /// Creates an error of the given kind with a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file_name: None,
            line_number: None,
        }
    }

    /// Creates a `SyntaxError` carrying source position information.
    pub fn syntax(message: impl Into<String>, file_name: impl Into<String>, line_number: u32) -> Self {
        Self {
            kind: ErrorKind::SyntaxError,
            message: message.into(),
            file_name: Some(file_name.into()),
            line_number: Some(line_number),
        }
    }

    /// Creates a `TypeError`.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    /// Creates a `RangeError`.
    pub fn range_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RangeError, message)
    }

    /// Creates a `ReferenceError`.
    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReferenceError, message)
    }

    /// Creates an `InternalError`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    /// The pre-built allocation-failure error. Kept allocation-free so it
    /// can be reported when the arena itself is exhausted.
    #[must_use]
    pub fn out_of_memory() -> Self {
        Self {
            kind: ErrorKind::MemoryError,
            message: String::new(),
            file_name: None,
            line_number: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// File name of the failing source, for parser errors.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// One-based line number of the failing token, for parser errors.
    #[must_use]
    pub fn line_number(&self) -> Option<u32> {
        self.line_number
    }

    /// Strips source position, used when the VM was created with the
    /// `quiet` option so error text stays stable across file renames.
    pub fn strip_location(&mut self) {
        self.file_name = None;
        self.line_number = None;
    }
}

impl fmt::Display for JsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)?;
        } else {
            write!(f, "{}: {}", self.kind, self.message)?;
        }
        if let (Some(file), Some(line)) = (&self.file_name, self.line_number) {
            write!(f, " ({file}:{line})")?;
        }
        Ok(())
    }
}

impl std::error::Error for JsError {}

/// Outcome of an operation that can find something or decline.
///
/// `Declined` indicates a miss (property not found) that callers may want to
/// handle without it being an error; it never carries an error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    Declined,
}

impl<T> Lookup<T> {
    /// Converts to an `Option`, discarding the distinction from `None`.
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::Declined => None,
        }
    }

    /// Returns the found value or a fallback.
    pub fn unwrap_or(self, fallback: T) -> T {
        match self {
            Self::Found(value) => value,
            Self::Declined => fallback,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Self::Found(value) => Lookup::Found(f(value)),
            Self::Declined => Lookup::Declined,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn kind_display_matches_constructor_names() {
        assert_eq!(ErrorKind::TypeError.to_string(), "TypeError");
        assert_eq!(ErrorKind::UriError.to_string(), "URIError");
        assert_eq!(ErrorKind::from_str("URIError").unwrap(), ErrorKind::UriError);
    }

    #[test]
    fn error_kind_hierarchy() {
        assert!(ErrorKind::TypeError.is_kind_of(ErrorKind::Error));
        assert!(ErrorKind::TypeError.is_kind_of(ErrorKind::TypeError));
        assert!(!ErrorKind::TypeError.is_kind_of(ErrorKind::RangeError));
        assert!(ErrorKind::Error.is_kind_of(ErrorKind::Error));
    }

    #[test]
    fn syntax_error_display_carries_location() {
        let err = JsError::syntax("Unexpected token \"}\"", "module.js", 12);
        assert_eq!(err.to_string(), "SyntaxError: Unexpected token \"}\" (module.js:12)");

        let mut quiet = err.clone();
        quiet.strip_location();
        assert_eq!(quiet.to_string(), "SyntaxError: Unexpected token \"}\"");
    }

    #[test]
    fn memory_error_is_allocation_free() {
        let err = JsError::out_of_memory();
        assert_eq!(err.kind(), ErrorKind::MemoryError);
        assert_eq!(err.message(), "");
        assert_eq!(err.to_string(), "MemoryError");
    }

    #[test]
    fn lookup_tri_state() {
        let found: Lookup<i32> = Lookup::Found(3);
        assert!(found.is_found());
        assert_eq!(found.found(), Some(3));
        assert_eq!(Lookup::<i32>::Declined.unwrap_or(7), 7);
    }
}
