use crate::TransferError;

const INVALID_CHARS: &[char] = &['"', '*', ':', '<', '>', '?', '|'];

/// Validates the name of a file to be created on the site.
///
/// Rejects:
/// - Empty names
/// - Names containing a path separator (`/` or `\`)
/// - Characters the document library refuses (`" * : < > ? |`)
/// - The special names `.` and `..`
pub fn validate_target_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }

    if name.contains(['/', '\\']) {
        return Err(TransferError::InvalidName(format!(
            "path separator not allowed: {name}"
        )));
    }

    if let Some(c) = name.chars().find(|c| INVALID_CHARS.contains(c)) {
        return Err(TransferError::InvalidName(format!(
            "character '{c}' not allowed: {name}"
        )));
    }

    if name == "." || name == ".." {
        return Err(TransferError::InvalidName(format!(
            "relative name not allowed: {name}"
        )));
    }

    Ok(())
}
