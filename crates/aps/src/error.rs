use bucketmgr_derivatives::DerivativeError;
use bucketmgr_protocol::{ErrorClass, InvalidBucketKey};
use bucketmgr_transfer::{TransferError, TransferFailure};

/// Errors from the HTTP client.
#[derive(Debug, thiserror::Error)]
pub enum ApsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("invalid bucket key: {0}")]
    InvalidBucketKey(#[from] InvalidBucketKey),

    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),

    #[error("{failed} of {total} downloads failed")]
    DownloadIncomplete { failed: usize, total: usize },
}

impl ApsError {
    /// Classification shown alongside the message.
    pub fn class(&self) -> ErrorClass {
        match self {
            // Bodies are read as raw bytes, so a decode error here is a
            // connection lost mid-response rather than bad JSON.
            Self::Http(e)
                if e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.is_body()
                    || e.is_decode() =>
            {
                ErrorClass::TransientNetworkFailure
            }
            Self::Http(e) => e
                .status()
                .map_or(ErrorClass::Fatal, |s| classify_status(s.as_u16())),
            Self::Api { status, .. } => classify_status(*status),
            Self::Json(_) => ErrorClass::MalformedManifest,
            Self::Io(_) => ErrorClass::Io,
            Self::Transfer(e) => e.class(),
            Self::InvalidBucketKey(_) | Self::MissingCredentials(_) => ErrorClass::InvalidInput,
            Self::DownloadIncomplete { .. } => ErrorClass::Fatal,
        }
    }
}

/// Maps an HTTP status to a retry class.
///
/// 401 means the bearer token expired, 403 a signed URL expired.
pub fn classify_status(status: u16) -> ErrorClass {
    match status {
        401 => ErrorClass::AuthExpired,
        403 => ErrorClass::UrlExpired,
        408 | 429 | 500..=599 => ErrorClass::TransientNetworkFailure,
        _ => ErrorClass::Fatal,
    }
}

impl From<ApsError> for DerivativeError {
    fn from(err: ApsError) -> Self {
        match err {
            ApsError::Json(e) => DerivativeError::malformed(e.to_string()),
            other => DerivativeError::service(other.class(), other.to_string()),
        }
    }
}

impl From<ApsError> for TransferFailure {
    fn from(err: ApsError) -> Self {
        TransferFailure::new(err.class(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ApsClient;
    use crate::mock_http::{MockServer, Reply};
    use bucketmgr_protocol::Region;

    #[test]
    fn status_classes() {
        assert_eq!(classify_status(401), ErrorClass::AuthExpired);
        assert_eq!(classify_status(403), ErrorClass::UrlExpired);
        assert_eq!(classify_status(429), ErrorClass::TransientNetworkFailure);
        assert_eq!(classify_status(503), ErrorClass::TransientNetworkFailure);
        assert_eq!(classify_status(400), ErrorClass::Fatal);
        assert_eq!(classify_status(404), ErrorClass::Fatal);
    }

    #[test]
    fn api_error_converts_with_class() {
        let err = ApsError::Api {
            status: 401,
            body: "token expired".into(),
        };
        let failure = TransferFailure::from(err);
        assert_eq!(failure.class, ErrorClass::AuthExpired);

        let err = ApsError::Api {
            status: 502,
            body: String::new(),
        };
        assert_eq!(
            DerivativeError::from(err).class(),
            ErrorClass::TransientNetworkFailure
        );
    }

    #[tokio::test]
    async fn body_cut_short_is_transient() {
        let server = MockServer::start(vec![
            Reply::json(200, r#"{"urn":"dXJu","status":"inpro"#).truncated(4096),
        ])
        .await;
        let client = ApsClient::new().unwrap().with_base_url(server.url.clone());

        let err = client
            .manifest("dXJu", Region::Us, "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, ApsError::Http(_)), "{err:?}");
        assert_eq!(err.class(), ErrorClass::TransientNetworkFailure);
    }

    #[test]
    fn json_error_is_malformed_manifest() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = DerivativeError::from(ApsError::from(json_err));
        assert_eq!(err.class(), ErrorClass::MalformedManifest);
    }
}
