use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Region / formats / scopes
// ---------------------------------------------------------------------------

/// Data-center region a bucket or derivative lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    #[default]
    #[serde(rename = "US")]
    Us,
    #[serde(rename = "EMEA")]
    Emea,
}

impl Region {
    /// Parses a region label. Anything other than `EMEA` maps to `US`.
    pub fn parse(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("EMEA") {
            Self::Emea
        } else {
            Self::Us
        }
    }

    /// Wire label (`US` / `EMEA`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Us => "US",
            Self::Emea => "EMEA",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format requested from a translation job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Svf,
    #[default]
    Svf2,
}

impl OutputFormat {
    /// Parses a format label. Only `svf` selects SVF; everything else is SVF2.
    pub fn parse(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("svf") {
            Self::Svf
        } else {
            Self::Svf2
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svf => "svf",
            Self::Svf2 => "svf2",
        }
    }
}

/// OAuth scope requested when minting an access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    #[serde(rename = "bucket:read")]
    BucketRead,
    #[serde(rename = "bucket:create")]
    BucketCreate,
    #[serde(rename = "data:read")]
    DataRead,
    #[serde(rename = "data:write")]
    DataWrite,
    #[serde(rename = "viewables:read")]
    ViewablesRead,
}

impl Scope {
    /// Scopes needed by every bucket manager operation.
    pub const DEFAULT: [Scope; 5] = [
        Scope::BucketRead,
        Scope::BucketCreate,
        Scope::DataRead,
        Scope::DataWrite,
        Scope::ViewablesRead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BucketRead => "bucket:read",
            Self::BucketCreate => "bucket:create",
            Self::DataRead => "data:read",
            Self::DataWrite => "data:write",
            Self::ViewablesRead => "viewables:read",
        }
    }

    /// Joins scopes into the space separated form the token endpoint expects.
    pub fn join(scopes: &[Scope]) -> String {
        scopes
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ---------------------------------------------------------------------------
// Translation jobs
// ---------------------------------------------------------------------------

/// A translation request. Immutable once submitted; status is fetched, not stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationJob {
    /// Base64 URN of the source object.
    pub urn: String,
    pub formats: Vec<OutputFormat>,
    pub region: Region,
}

/// Response to a job submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    /// `created` or `success` (job already done).
    pub result: String,
    pub urn: String,
}

// ---------------------------------------------------------------------------
// Buckets and objects
// ---------------------------------------------------------------------------

/// A storage bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub bucket_key: String,
    #[serde(default)]
    pub created_date: i64,
    #[serde(default)]
    pub policy_key: String,
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketsPage {
    #[serde(default)]
    pub items: Vec<Bucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// An object stored in a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketObject {
    pub bucket_key: String,
    pub object_key: String,
    pub object_id: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
}

/// One page of an object listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectsPage {
    #[serde(default)]
    pub items: Vec<BucketObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

// ---------------------------------------------------------------------------
// Access tokens
// ---------------------------------------------------------------------------

/// Opaque bearer token plus its expiry instant.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Builds a token that expires `expires_in` seconds from now.
    pub fn new(value: String, expires_in: i64) -> Self {
        Self {
            value,
            expires_at: Utc::now() + Duration::seconds(expires_in),
        }
    }

    /// Whole seconds until expiry, floored at zero.
    pub fn seconds_left(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }

    pub fn is_expired(&self) -> bool {
        self.seconds_left() == 0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
