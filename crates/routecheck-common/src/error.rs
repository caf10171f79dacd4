//! Error types for routecheck
//!
//! Errors are structured with fields so that a failed conformance step reports
//! what was observed, what was expected and how long the engine waited.
//! Each variant maps to one failure class with its own retry policy:
//!
//! - render and admission errors abort the current step immediately
//! - transient and not-found errors are folded into "no match yet" by pollers
//! - deadline-exceeded is the terminal state of every poll or sample loop

use std::time::Duration;

use thiserror::Error;

/// Main error type for routecheck operations
#[derive(Debug, Error)]
pub enum Error {
    /// A template could not be materialized into a manifest
    #[error("render error for {template}: {message}")]
    Render {
        /// Template path or name
        template: String,
        /// Description of what failed (missing placeholder, bad path, malformed YAML)
        message: String,
    },

    /// The control plane rejected a create or patch
    #[error("admission rejected {kind}/{name}: {message}")]
    Admission {
        /// Resource kind that was submitted
        kind: String,
        /// Resource name that was submitted
        name: String,
        /// Server message, verbatim
        message: String,
    },

    /// A poll or sample loop did not observe its expectation before the deadline
    #[error(
        "timed out after {waited:?} ({attempts} attempts) waiting for {description}: expected {expected}, last observed {}",
        .last_observed.as_deref().unwrap_or("<nothing>")
    )]
    DeadlineExceeded {
        /// What the loop was waiting for
        description: String,
        /// Human-readable expectation (matcher or predicate)
        expected: String,
        /// Last value the loop observed, if any attempt completed
        last_observed: Option<String>,
        /// Wall-clock time spent in the loop
        waited: Duration,
        /// Number of observations performed
        attempts: u32,
    },

    /// A single observation failed for an infrastructure reason
    #[error("transient error [{context}]: {message}")]
    Transient {
        /// Where the error occurred (e.g., "get_object", "exec")
        context: String,
        /// Description of what failed
        message: String,
    },

    /// The requested object does not exist
    #[error("{kind} {} not found", qualified_name(.namespace.as_deref(), .name))]
    NotFound {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
        /// Namespace, for namespaced resources
        namespace: Option<String>,
    },

    /// An operation could not be invoked at all
    #[error("operation error [{context}]: {message}")]
    Operation {
        /// Where the error occurred (e.g., "exec", "sample")
        context: String,
        /// Description of what failed
        message: String,
    },

    /// An assertion over observed state failed
    #[error("assertion failed: {message}")]
    Assertion {
        /// What did not hold
        message: String,
    },

    /// Configuration could not be loaded or is invalid
    #[error("config error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

fn qualified_name(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{}/{}", ns, name),
        None => name.to_string(),
    }
}

impl Error {
    /// Create a render error for a template
    pub fn render(template: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Render {
            template: template.into(),
            message: msg.into(),
        }
    }

    /// Create an admission error carrying the server message verbatim
    pub fn admission(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Admission {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a transient error with context
    pub fn transient(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transient {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error for a resource
    pub fn not_found(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: Option<&str>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
            namespace: namespace.map(str::to_string),
        }
    }

    /// Create an operation error with context
    pub fn operation(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Operation {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create an assertion error
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion {
            message: msg.into(),
        }
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Whether this error is a single failed observation that may succeed later
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient { .. })
    }

    /// Whether this error reports an absent object
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Check if this error is retryable by collaborator plumbing
    ///
    /// Render, admission, assertion and config errors require a fix by the test
    /// author and are never retried; a rejected admission stays rejected.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transient { .. } => true,
            Error::Operation { .. } => false,
            Error::NotFound { .. } => false,
            Error::Render { .. }
            | Error::Admission { .. }
            | Error::DeadlineExceeded { .. }
            | Error::Assertion { .. }
            | Error::Config { .. }
            | Error::Serialization { .. } => false,
        }
    }

    /// Last observed value carried by a deadline-exceeded error
    pub fn last_observed(&self) -> Option<&str> {
        match self {
            Error::DeadlineExceeded { last_observed, .. } => last_observed.as_deref(),
            _ => None,
        }
    }

    /// The message a test asserts on when it expects an error string
    ///
    /// For admission errors this is the server message alone, so validation
    /// text can be compared without the engine's prefix.
    pub fn message(&self) -> String {
        match self {
            Error::Admission { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
