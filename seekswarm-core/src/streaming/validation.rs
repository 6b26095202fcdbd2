//! Boundary validation for stream requests

use crate::torrent::InfoHashError;

/// Reasons a stream request is rejected before any state is created.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Invalid file path: {reason}")]
    InvalidPath { reason: String },

    #[error("Invalid info hash {value:?}: {source}")]
    InvalidInfohash {
        value: String,
        #[source]
        source: InfoHashError,
    },
}

/// Checks a torrent identifier and a user-supplied file path.
///
/// Paths are rejected when they contain a `..` segment under either
/// separator or an embedded NUL byte, so they can never climb out of the
/// torrent root once the engine joins them onto a download directory.
///
/// # Errors
///
/// - `ValidationError::MissingField` - Empty or whitespace-only identifier or path
/// - `ValidationError::InvalidPath` - Parent-directory segment or NUL byte in the path
pub fn validate_request(torrent_id: &str, file_path: &str) -> Result<(), ValidationError> {
    if torrent_id.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: "torrent_id",
        });
    }
    if file_path.trim().is_empty() {
        return Err(ValidationError::MissingField { field: "file_path" });
    }
    if file_path.contains('\0') {
        return Err(ValidationError::InvalidPath {
            reason: "path contains a NUL byte".to_string(),
        });
    }
    if file_path
        .split(['/', '\\'])
        .any(|segment| segment.trim() == "..")
    {
        return Err(ValidationError::InvalidPath {
            reason: "path contains a parent-directory segment".to_string(),
        });
    }
    Ok(())
}
