//! Error classification shared by every crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse classification of a failure, shown next to the human-readable
/// message so the UI can word transient and fatal conditions differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network hiccup or 5xx; retryable within the configured policy.
    TransientNetworkFailure,
    /// Bearer token rejected; retryable after refreshing the token.
    AuthExpired,
    /// Signed upload/download URL rejected; retryable with a fresh URL.
    UrlExpired,
    /// Manifest or identifier could not be interpreted.
    MalformedManifest,
    /// A bounded wait ran out of time.
    Timeout,
    /// The remote translation job itself reported failure.
    JobFailed,
    /// Caller-supplied input was rejected before any request was made.
    InvalidInput,
    /// Local filesystem failure.
    Io,
    /// Anything else; not retried.
    Fatal,
}

impl ErrorClass {
    /// Stable string form used in user-facing messages and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransientNetworkFailure => "transient_network_failure",
            Self::AuthExpired => "auth_expired",
            Self::UrlExpired => "url_expired",
            Self::MalformedManifest => "malformed_manifest",
            Self::Timeout => "timeout",
            Self::JobFailed => "job_failed",
            Self::InvalidInput => "invalid_input",
            Self::Io => "io",
            Self::Fatal => "fatal",
        }
    }

    /// Returns `true` for classes a bounded retry may recover from.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::TransientNetworkFailure | Self::AuthExpired | Self::UrlExpired
        )
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
