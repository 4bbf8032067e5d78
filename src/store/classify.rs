use crate::core::{FieldError, OperationKind, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PERMISSION_CODES: &[&str] = &["EACCES", "EPERM", "EROFS"];
pub const DISK_SPACE_CODES: &[&str] = &["ENOSPC", "EDQUOT"];
pub const NETWORK_TIMEOUT_CODES: &[&str] = &[
    "ETIMEDOUT",
    "ECONNRESET",
    "ECONNREFUSED",
    "ECONNABORTED",
    "ENOTFOUND",
    "EAI_AGAIN",
    "ENETUNREACH",
    "EHOSTUNREACH",
    "EPIPE",
];

/// Failure taxonomy used to decide between retrying and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Validation,
    Permission,
    DiskSpace,
    NetworkTimeout,
    NotFound,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::Permission => "permission",
            Self::DiskSpace => "disk-space",
            Self::NetworkTimeout => "network-timeout",
            Self::NotFound => "not-found",
            Self::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureClassification {
    pub kind: FailureKind,
    pub retryable: bool,
    /// Complete sentence suitable for display.
    pub message: String,
    pub field_errors: Option<Vec<FieldError>>,
}

impl FailureClassification {
    fn new(kind: FailureKind, retryable: bool, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable,
            message: sentence(message.into()),
            field_errors: None,
        }
    }
}

/// Classifies a raw failure.
///
/// Checks run in priority order: structural validation, permission codes,
/// disk-space codes, network/timeout codes, operation-tagged persistence
/// errors, then everything else (retryable).
pub fn classify_failure(err: &StoreError) -> FailureClassification {
    if let Some(fields) = err.field_errors() {
        return validation_failure(fields);
    }

    if let Some(code) = err.code() {
        if PERMISSION_CODES.contains(&code) {
            return FailureClassification::new(
                FailureKind::Permission,
                false,
                "Permission denied while accessing settings storage. Please check storage permissions",
            );
        }
        if DISK_SPACE_CODES.contains(&code) {
            return FailureClassification::new(
                FailureKind::DiskSpace,
                false,
                "Insufficient storage space to save settings. Free up disk space and try again",
            );
        }
        if NETWORK_TIMEOUT_CODES.contains(&code) {
            return FailureClassification::new(
                FailureKind::NetworkTimeout,
                true,
                "Settings storage timed out or is unreachable. The operation can be retried",
            );
        }
    }

    match err {
        StoreError::Persistence {
            operation,
            message,
            cause,
        } => classify_tagged(*operation, message, cause.as_deref()),
        StoreError::NotFound(id) => FailureClassification::new(
            FailureKind::NotFound,
            false,
            format!("The item '{id}' could not be found"),
        ),
        StoreError::DuplicateName(name) => {
            let mut classification = FailureClassification::new(
                FailureKind::Validation,
                false,
                format!("An item named '{name}' already exists. Please choose a different name"),
            );
            classification.field_errors = Some(vec![FieldError::new(
                "name",
                format!("'{name}' is already in use"),
            )]);
            classification
        }
        // Retrying cannot fix a missing adapter or a bad configuration.
        StoreError::NotInitialized(_) | StoreError::Config(_) => FailureClassification::new(
            FailureKind::Unknown,
            false,
            format!("Settings storage is not ready: {err}"),
        ),
        other => FailureClassification::new(
            FailureKind::Unknown,
            true,
            format!("An unexpected error occurred: {other}"),
        ),
    }
}

fn classify_tagged(
    operation: OperationKind,
    message: &str,
    cause: Option<&StoreError>,
) -> FailureClassification {
    match operation {
        OperationKind::Save => {
            let lower = message.to_lowercase();
            if lower.contains("validation") || lower.contains("invalid") {
                return FailureClassification::new(
                    FailureKind::Validation,
                    false,
                    format!("Failed to save settings because the data is invalid: {message}"),
                );
            }
            if lower.contains("permission") || lower.contains("access denied") {
                return FailureClassification::new(
                    FailureKind::Permission,
                    false,
                    format!("Failed to save settings: {message}. Please check storage permissions"),
                );
            }
            FailureClassification::new(
                FailureKind::Unknown,
                true,
                format!("Failed to save settings: {message}"),
            )
        }
        _ => {
            let (kind, retryable) = match cause {
                Some(cause) => {
                    let inner = classify_failure(cause);
                    (inner.kind, inner.retryable)
                }
                None => (FailureKind::Unknown, true),
            };
            let verb = match operation {
                OperationKind::Load | OperationKind::Sync => "load",
                OperationKind::Import => "import",
                OperationKind::Reset => "reset",
                OperationKind::Save => "save",
            };
            FailureClassification::new(kind, retryable, format!("Failed to {verb} settings: {message}"))
        }
    }
}

fn validation_failure(fields: &[FieldError]) -> FailureClassification {
    let listed = fields
        .iter()
        .map(|field| format!("{} ({})", field.path, field.message))
        .collect::<Vec<_>>()
        .join(", ");
    let message = if listed.is_empty() {
        "The settings data is invalid".to_string()
    } else {
        format!("The settings data is invalid: {listed}")
    };

    let mut classification = FailureClassification::new(FailureKind::Validation, false, message);
    classification.field_errors = Some(fields.to_vec());
    classification
}

fn sentence(mut message: String) -> String {
    let trimmed_len = message.trim_end().len();
    message.truncate(trimmed_len);
    if !message.ends_with(['.', '!', '?']) {
        message.push('.');
    }
    message
}
