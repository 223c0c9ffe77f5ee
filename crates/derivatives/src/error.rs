use std::time::Duration;

use bucketmgr_protocol::ErrorClass;

/// Errors produced while polling or resolving derivatives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DerivativeError {
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("{message}")]
    Service { class: ErrorClass, message: String },

    #[error("translation of {urn} failed with status '{status}'")]
    JobFailed { urn: String, status: String },

    #[error("translation did not finish within {}s", .limit.as_secs())]
    Timeout { limit: Duration },

    #[error("poll loop stopped unexpectedly")]
    Interrupted,
}

impl DerivativeError {
    /// Wraps a collaborator failure, keeping its classification.
    pub fn service(class: ErrorClass, message: impl Into<String>) -> Self {
        Self::Service {
            class,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedManifest(message.into())
    }

    /// Classification shown alongside the message.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MalformedManifest(_) => ErrorClass::MalformedManifest,
            Self::Service { class, .. } => *class,
            Self::JobFailed { .. } => ErrorClass::JobFailed,
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::Interrupted => ErrorClass::Fatal,
        }
    }
}
