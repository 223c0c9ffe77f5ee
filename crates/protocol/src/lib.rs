//! Data model for the bucket manager.
//!
//! Plain serde types that cross crate boundaries: storage buckets and
//! objects, translation jobs, derivative manifests, resolved download
//! resources, access tokens, and the error classification shown to users.

pub mod error;
pub mod manifest;
pub mod types;
pub mod urn;

// Re-export primary types for convenience.
pub use error::ErrorClass;
pub use manifest::{DerivativeDownload, Manifest, ManifestNode, Resource};
pub use types::{
    AccessToken, Bucket, BucketObject, BucketsPage, JobHandle, ObjectsPage, OutputFormat, Region,
    Scope, TranslationJob,
};
pub use urn::{InvalidBucketKey, urn_for_object_id, validate_bucket_key};
