//! Shared HTTP client for every endpoint family.
//!
//! One [`ApsClient`] is built at startup and passed by `Arc` to each
//! component that talks to the service.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Response;

use bucketmgr_protocol::Region;

use crate::ApsError;

pub const DEFAULT_BASE_URL: &str = "https://developer.api.autodesk.com";

/// Characters escaped in a single URL path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// HTTP client for authentication, storage and derivative endpoints.
#[derive(Debug, Clone)]
pub struct ApsClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApsClient {
    pub fn new() -> Result<Self, ApsError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("bucketmgr/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Points the client at another host (regional proxies, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Model-derivative endpoint; EMEA lives under `/regions/eu/`.
    pub(crate) fn derivative_url(&self, region: Region, path: &str) -> String {
        match region {
            Region::Us => self.url(&format!("/modelderivative/v2/designdata{path}")),
            Region::Emea => self.url(&format!("/modelderivative/v2/regions/eu/designdata{path}")),
        }
    }
}

/// Escapes one path segment (bucket key, object key, URN).
pub(crate) fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// Turns a non-2xx response into [`ApsError::Api`].
pub(crate) async fn ensure_success(resp: Response) -> Result<Response, ApsError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApsError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Reads a successful JSON response body.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, ApsError> {
    let resp = ensure_success(resp).await?;
    let body = resp.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}
