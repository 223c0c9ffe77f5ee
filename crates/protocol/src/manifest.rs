//! Derivative manifest tree and the flat download resources resolved from it.

use serde::{Deserialize, Serialize};

/// Manifest of a translation job: status plus the derivative tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Canonical base64 URN of the source, as normalized by the server.
    #[serde(default)]
    pub urn: String,
    /// `pending`, `inprogress`, `success`, `failed` or `timeout`.
    #[serde(default)]
    pub status: String,
    /// Free text such as `"25% complete"` or `"complete"`.
    #[serde(default)]
    pub progress: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivatives: Option<Vec<ManifestNode>>,
}

impl Manifest {
    /// Returns `true` if the server reports the job as failed.
    pub fn is_failed(&self) -> bool {
        matches!(self.status.as_str(), "failed" | "timeout")
    }
}

/// One element of the derivative tree.
///
/// A node without a URN is not downloadable but may still have children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ManifestNode>,
}

impl ManifestNode {
    /// The node's URN if it is present and non-empty.
    pub fn downloadable_urn(&self) -> Option<&str> {
        self.urn.as_deref().filter(|u| !u.is_empty())
    }
}

/// Signed download location for one derivative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivativeDownload {
    pub url: String,
    #[serde(default, rename = "content-type")]
    pub content_type: String,
    #[serde(default)]
    pub size: Option<u64>,
    /// `Set-Cookie` values returned alongside the body; not part of the JSON.
    #[serde(skip)]
    pub cookies: Vec<String>,
}

/// A file to download: the flat output of manifest resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// File name without directories.
    pub file_name: String,
    pub content_type: String,
    /// Absolute remote URL.
    pub remote_path: String,
    /// Signed cookies that authorize the GET.
    pub cookies: Vec<String>,
    /// Relative local path including the file name.
    pub local_path: String,
}

impl Resource {
    /// Cookie header value (`a=1; b=2`).
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|c| c.split(';').next().unwrap_or_default().trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
