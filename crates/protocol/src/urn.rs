//! Object URNs and bucket key rules.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Minimum bucket key length accepted by the storage service.
pub const MIN_BUCKET_KEY_LEN: usize = 3;
/// Maximum bucket key length accepted by the storage service.
pub const MAX_BUCKET_KEY_LEN: usize = 128;

/// Error returned for a bucket key the storage service would reject.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidBucketKey {
    #[error("bucket key must be 3-128 characters, got {0}")]
    Length(usize),

    #[error("bucket key may only contain a-z, 0-9, '-', '_' and '.': found {0:?}")]
    Character(char),
}

/// Encodes an object id (`urn:adsk.objects:os.object:<bucket>/<key>`) into
/// the URL-safe base64 URN used for translation and manifest calls.
pub fn urn_for_object_id(object_id: &str) -> String {
    URL_SAFE_NO_PAD.encode(object_id.as_bytes())
}

/// Checks a bucket key against the storage service's naming rules.
pub fn validate_bucket_key(key: &str) -> Result<(), InvalidBucketKey> {
    let len = key.chars().count();
    if !(MIN_BUCKET_KEY_LEN..=MAX_BUCKET_KEY_LEN).contains(&len) {
        return Err(InvalidBucketKey::Length(len));
    }
    if let Some(bad) = key
        .chars()
        .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '-' | '_' | '.'))
    {
        return Err(InvalidBucketKey::Character(bad));
    }
    Ok(())
}
