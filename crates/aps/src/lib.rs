//! HTTP collaborators for the bucket manager.
//!
//! [`ApsClient`] covers two-legged authentication, bucket and object
//! storage, and the model-derivative service. It implements
//! [`ObjectTransfer`](bucketmgr_transfer::ObjectTransfer) for the chunked
//! uploader and [`DerivativeService`](bucketmgr_derivatives::DerivativeService)
//! for the poller and manifest resolver.

pub mod auth;
pub mod client;
pub mod derivative;
pub mod download;
pub mod error;
pub mod oss;

#[cfg(test)]
mod mock_http;

pub use auth::{ClientCredentialsSource, Credentials};
pub use client::{ApsClient, DEFAULT_BASE_URL};
pub use download::{DownloadEvent, DownloadSummary, download_resources};
pub use error::{ApsError, classify_status};
pub use oss::{DEFAULT_BUCKET_POLICY, bucket_key_with_guid};
