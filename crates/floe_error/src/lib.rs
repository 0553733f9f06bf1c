//! Error type shared by all floe crates.
//!
//! Every error carries an [`ErrorKind`] so callers can tell malformed input
//! (shape, schema, missing columns, bad arguments) apart from evaluation
//! failures and internal engine bugs.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// Broad classification of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Length or dimension mismatch.
    Shape,
    /// Datatype or column-set mismatch between operands.
    Schema,
    /// Referenced column, group or key is absent.
    NotFound,
    /// Failure while evaluating an operator or a user supplied function.
    Compute,
    /// Name collision where uniqueness is required.
    Duplicate,
    /// Malformed call arguments.
    InvalidArgument,
    /// Unsupported operation or selector combination.
    NotImplemented,
    /// Internal invariant violation. Indicates a bug in the engine.
    Panic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Shape => "ShapeError",
            Self::Schema => "SchemaError",
            Self::NotFound => "NotFoundError",
            Self::Compute => "ComputeError",
            Self::Duplicate => "DuplicateError",
            Self::InvalidArgument => "ValueError",
            Self::NotImplemented => "NotImplementedError",
            Self::Panic => "PanicException",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug)]
pub struct DbError {
    inner: Box<DbErrorInner>,
}

#[derive(Debug)]
struct DbErrorInner {
    kind: ErrorKind,
    msg: String,
    fields: Vec<(Cow<'static, str>, String)>,
    source: Option<Box<dyn Error + Send + Sync>>,
    backtrace: Backtrace,
}

impl DbError {
    /// Create a new compute error.
    pub fn new(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Compute, msg)
    }

    pub fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        DbError {
            inner: Box::new(DbErrorInner {
                kind,
                msg: msg.into(),
                fields: Vec::new(),
                source: None,
                backtrace: Backtrace::capture(),
            }),
        }
    }

    /// Create a compute error wrapping some underlying error.
    pub fn with_source(msg: impl Into<String>, source: Box<dyn Error + Send + Sync>) -> Self {
        let mut err = Self::new(msg);
        err.inner.source = Some(source);
        err
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Shape, msg)
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Schema, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::NotFound, msg)
    }

    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Duplicate, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::InvalidArgument, msg)
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::NotImplemented, msg)
    }

    pub fn panic(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Panic, msg)
    }

    /// Attach a key/value pair providing additional context.
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<Cow<'static, str>>,
        V: fmt::Display,
    {
        self.inner.fields.push((key.into(), value.to_string()));
        self
    }

    /// Replace the kind of this error, keeping everything else.
    pub fn into_kind(mut self, kind: ErrorKind) -> Self {
        self.inner.kind = kind;
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    pub fn message(&self) -> &str {
        &self.inner.msg
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .fields
            .iter()
            .map(|(k, v)| (k.as_ref(), v.as_str()))
    }

    /// Errors caused by user input can be handled by the caller. Panic errors
    /// indicate a defect and should not be retried.
    pub fn is_recoverable(&self) -> bool {
        self.inner.kind != ErrorKind::Panic
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.inner.backtrace
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.inner.kind, self.inner.msg)?;

        for (key, value) in &self.inner.fields {
            write!(f, "\n  {key}: {value}")?;
        }

        if let Some(source) = &self.inner.source {
            write!(f, "\nError source: {source}")?;
        }

        if self.inner.backtrace.status() == BacktraceStatus::Captured {
            write!(f, "\nBacktrace:\n{}", self.inner.backtrace)?;
        }

        Ok(())
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<fmt::Error> for DbError {
    fn from(value: fmt::Error) -> Self {
        DbError::with_source("Format error", Box::new(value))
    }
}

impl From<std::io::Error> for DbError {
    fn from(value: std::io::Error) -> Self {
        DbError::with_source("IO error", Box::new(value))
    }
}

/// Adds context to errors from other libraries.
pub trait ResultExt<T, E> {
    fn context(self, msg: &'static str) -> Result<T>;
    fn context_fn<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Error + Send + Sync + 'static> ResultExt<T, E> for std::result::Result<T, E> {
    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| DbError::with_source(msg, Box::new(e)))
    }

    fn context_fn<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| DbError::with_source(f(), Box::new(e)))
    }
}

pub trait OptionExt<T> {
    /// Error with a message naming the missing value if `None`.
    fn required(self, what: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, what: &'static str) -> Result<T> {
        self.ok_or_else(|| DbError::new(format!("Missing required value: {what}")))
    }
}

/// Run a caller supplied closure, turning a panic inside it into a compute
/// error instead of unwinding through the engine.
pub fn catch_user_panic<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Err(DbError::new("User function panicked").with_field("panic", msg))
        }
    }
}

/// Return early with a not implemented error.
#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)+) => {{
        let msg = format!($($arg)+);
        return Err($crate::DbError::not_implemented(format!("Not yet implemented: {msg}")));
    }};
}
