use std::path::{Component, Path};

use sha2::{Digest, Sha256};

use crate::TransferError;

/// Number of hex characters kept from the source digest.
const FINGERPRINT_LEN: usize = 16;

/// Longest display name carried into a remote object name, in characters.
const MAX_DISPLAY_CHARS: usize = 120;

/// Name used when nothing printable survives sanitizing.
const FALLBACK_NAME: &str = "media";

/// Stable short identifier for a source reference.
pub fn source_fingerprint(source_ref: &str) -> String {
    let digest = Sha256::digest(source_ref.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// Makes a user-supplied display name safe to use as a single path
/// component.
///
/// Separators become `_`, control characters are dropped, leading dots and
/// surrounding whitespace are trimmed, and the result is capped in length.
pub fn sanitize_display_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();

    let trimmed = cleaned.trim().trim_start_matches('.').trim();
    let capped: String = trimmed.chars().take(MAX_DISPLAY_CHARS).collect();

    if capped.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        capped
    }
}

/// Builds the remote object name for a source.
///
/// The same source and display name always produce the same name, so a
/// resubmitted transfer lands on the same remote object.
pub fn remote_object_name(source_ref: &str, display_name: &str) -> String {
    format!(
        "{}_{}",
        source_fingerprint(source_ref),
        sanitize_display_name(display_name)
    )
}

/// Validates that `name` is exactly one normal path component.
///
/// Rejects empty names, separators, `.`/`..` and absolute or prefixed
/// paths, so joining it onto a base directory cannot escape that directory.
pub fn validate_object_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }
    if name.contains(['/', '\\']) {
        return Err(TransferError::InvalidName(format!(
            "separator not allowed: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TransferError::InvalidName(format!(
            "not a plain file name: {name}"
        ))),
    }
}
