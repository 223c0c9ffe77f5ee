use std::path::{Component, Path};

use crate::TransferError;

/// Validates that a relative path stays inside whatever directory it is
/// joined to.
///
/// Rejects empty paths, absolute paths, Windows prefixes (`C:`, `\\server`)
/// and any `..` segment. Segments are checked on both `/` and `\` so a
/// manifest-supplied name is judged the same on every platform.
pub fn validate_relative_path(relative: &str) -> Result<(), TransferError> {
    if relative.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    if relative.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(TransferError::InvalidPath(format!(
            "parent directory traversal not allowed: {relative}"
        )));
    }

    let path = Path::new(relative);
    if path.is_absolute() || relative.starts_with('/') || relative.starts_with('\\') {
        return Err(TransferError::InvalidPath(format!(
            "absolute path not allowed: {relative}"
        )));
    }

    for component in path.components() {
        match component {
            Component::Prefix(_) => {
                return Err(TransferError::InvalidPath(format!(
                    "path prefix not allowed: {relative}"
                )));
            }
            Component::RootDir | Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "path escapes its base directory: {relative}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}
