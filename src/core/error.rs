use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single field-level validation problem, addressable by a field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// The asynchronous operation a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Save,
    Load,
    Sync,
    Import,
    Reset,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Save => "save",
            Self::Load => "load",
            Self::Sync => "sync",
            Self::Import => "import",
            Self::Reset => "reset",
        };
        write!(f, "{label}")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Validation failed: {}", join_field_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("Storage error ({}): {message}", .code.as_deref().unwrap_or("no code"))]
    Storage {
        code: Option<String>,
        message: String,
    },

    #[error("{operation} failed: {message}")]
    Persistence {
        operation: OperationKind,
        message: String,
        cause: Option<Box<StoreError>>,
    },

    #[error("Item '{0}' not found")]
    NotFound(String),

    #[error("An item named '{0}' already exists")]
    DuplicateName(String),

    #[error("Store '{0}' has no persistence adapter")]
    NotInitialized(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub fn storage(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn persistence(operation: OperationKind, message: impl Into<String>, cause: StoreError) -> Self {
        Self::Persistence {
            operation,
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Wraps an I/O failure, keeping its errno-style class code when one is known.
    pub fn from_io(err: &std::io::Error, context: &str) -> Self {
        Self::Storage {
            code: io_error_code(err).map(str::to_string),
            message: format!("{context}: {err}"),
        }
    }

    /// Class code of this error or of the first wrapped cause carrying one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Storage { code, .. } => code.as_deref(),
            Self::Persistence { cause, .. } => cause.as_deref().and_then(Self::code),
            _ => None,
        }
    }

    /// Field-level problems of this error or of a wrapped validation cause.
    pub fn field_errors(&self) -> Option<&[FieldError]> {
        match self {
            Self::Validation(fields) => Some(fields),
            Self::Persistence { cause, .. } => cause.as_deref().and_then(Self::field_errors),
            _ => None,
        }
    }

    pub fn cause(&self) -> Option<&StoreError> {
        match self {
            Self::Persistence { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

fn join_field_errors(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Maps an I/O error onto the errno-style codes the failure classifier understands.
pub fn io_error_code(err: &std::io::Error) -> Option<&'static str> {
    use std::io::ErrorKind;

    // Linux errno values.
    match err.raw_os_error() {
        Some(28) => return Some("ENOSPC"),
        Some(122) => return Some("EDQUOT"),
        Some(30) => return Some("EROFS"),
        Some(1) => return Some("EPERM"),
        _ => {}
    }

    match err.kind() {
        ErrorKind::PermissionDenied => Some("EACCES"),
        ErrorKind::TimedOut => Some("ETIMEDOUT"),
        ErrorKind::ConnectionRefused => Some("ECONNREFUSED"),
        ErrorKind::ConnectionReset => Some("ECONNRESET"),
        ErrorKind::ConnectionAborted => Some("ECONNABORTED"),
        ErrorKind::BrokenPipe => Some("EPIPE"),
        ErrorKind::NotFound => Some("ENOENT"),
        ErrorKind::AlreadyExists => Some("EEXIST"),
        _ => None,
    }
}
