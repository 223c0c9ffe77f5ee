//! Maps derivative URNs to local directory layouts.

use bucketmgr_transfer::validate_relative_path;
use percent_encoding::percent_decode_str;

use crate::DerivativeError;

/// Path segment that some manifests insert between the source URN and the
/// derivative tree.
const OUTPUT_SEGMENT: &str = "output";

/// Local layout of one derivative.
///
/// `url` and `file_name` stay empty until the signed download location has
/// been fetched and passed to [`PathInfo::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathInfo {
    /// Relative directory, empty or ending in `/`.
    pub local_path: String,
    pub url: Option<String>,
    pub file_name: Option<String>,
}

impl PathInfo {
    /// Fills in the download URL and the file name taken from it.
    pub fn resolve(&mut self, url: &str) -> Result<(), DerivativeError> {
        self.file_name = Some(file_name_from_url(url)?);
        self.url = Some(url.to_string());
        Ok(())
    }

    /// Directory plus file name, once resolved.
    pub fn relative_file_path(&self) -> Option<String> {
        self.file_name
            .as_ref()
            .map(|name| format!("{}{}", self.local_path, name))
    }
}

/// Derives the local directory for a percent-encoded derivative URN.
///
/// The URN is decoded, cut after its final `/`, stripped of its leading
/// namespace segment (everything up to the first `/`), and every `output`
/// segment is removed. A URN without any `/` is malformed.
pub fn decompose_urn(urn: &str) -> Result<PathInfo, DerivativeError> {
    let decoded = percent_decode_str(urn)
        .decode_utf8()
        .map_err(|_| DerivativeError::malformed(format!("URN is not valid UTF-8: {urn}")))?;

    let Some(last) = decoded.rfind('/') else {
        return Err(DerivativeError::malformed(format!(
            "URN has no path separator: {decoded}"
        )));
    };
    let base = &decoded[..=last];
    // `base` ends in '/', so a first '/' always exists.
    let first = base.find('/').unwrap_or(last);
    let directory = &base[first + 1..];

    let segments: Vec<&str> = directory
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != OUTPUT_SEGMENT)
        .collect();

    let local_path = if segments.is_empty() {
        String::new()
    } else {
        format!("{}/", segments.join("/"))
    };

    if !local_path.is_empty() {
        validate_relative_path(&local_path)
            .map_err(|e| DerivativeError::malformed(format!("{e} (from {decoded})")))?;
    }

    Ok(PathInfo {
        local_path,
        url: None,
        file_name: None,
    })
}

/// Percent-decoded final path segment of a download URL.
///
/// Query strings and fragments are ignored.
pub fn file_name_from_url(url: &str) -> Result<String, DerivativeError> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();
    let name = percent_decode_str(segment)
        .decode_utf8()
        .map_err(|_| DerivativeError::malformed(format!("file name is not valid UTF-8: {url}")))?;

    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(DerivativeError::malformed(format!(
            "no usable file name in URL: {url}"
        )));
    }
    Ok(name.into_owned())
}
