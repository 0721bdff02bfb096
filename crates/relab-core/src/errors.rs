//! Structured error types shared across relab crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`RelabError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (batch names, identities, paths).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the relab engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum RelabError {
    /// Malformed or unusable specifications.
    #[error("specification error: {0}")]
    Spec(ErrorInfo),
    /// Identity derivation failures (hashing, diff naming).
    #[error("naming error: {0}")]
    Naming(ErrorInfo),
    /// Checkpoint store failures.
    #[error("checkpoint error: {0}")]
    Checkpoint(ErrorInfo),
    /// Result persistence failures.
    #[error("persist error: {0}")]
    Persist(ErrorInfo),
    /// Resumption scan failures.
    #[error("scan error: {0}")]
    Scan(ErrorInfo),
    /// Failures raised by user experiment code.
    #[error("experiment error: {0}")]
    Experiment(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl RelabError {
    /// Wraps a failure from user experiment code.
    pub fn experiment(code: impl Into<String>, message: impl Into<String>) -> Self {
        RelabError::Experiment(ErrorInfo::new(code, message))
    }

    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            RelabError::Spec(info)
            | RelabError::Naming(info)
            | RelabError::Checkpoint(info)
            | RelabError::Persist(info)
            | RelabError::Scan(info)
            | RelabError::Experiment(info)
            | RelabError::Serde(info) => info,
        }
    }
}
