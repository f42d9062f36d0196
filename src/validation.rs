//! Checks on user-supplied values before they reach `op`.
//!
//! Arguments are passed to the child directly, never through a shell, so the
//! concern here is option injection and garbage rather than metacharacters.

use crate::{OppyError, Result};

/// Maximum allowed length for vault names and item references.
const MAX_ARGUMENT_LENGTH: usize = 255;

/// Validates a vault name or item reference.
///
/// Rejects:
/// - empty values
/// - values longer than 255 characters
/// - null bytes and control characters
/// - a leading `-`, which `op` would parse as a flag
///
/// # Example
///
/// ```
/// use oppy::validation::validate_argument;
///
/// assert!(validate_argument("vault", "Private").is_ok());
/// assert!(validate_argument("item", "GitHub (work)").is_ok());
/// assert!(validate_argument("item", "--format=json").is_err());
/// ```
pub fn validate_argument(kind: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(OppyError::InvalidArgument(format!("{kind} cannot be empty")));
    }

    if value.len() > MAX_ARGUMENT_LENGTH {
        return Err(OppyError::InvalidArgument(format!(
            "{kind} exceeds maximum length of {MAX_ARGUMENT_LENGTH} characters"
        )));
    }

    if value.contains('\0') {
        return Err(OppyError::InvalidArgument(format!("{kind} contains null byte")));
    }

    if value.chars().any(char::is_control) {
        return Err(OppyError::InvalidArgument(format!(
            "{kind} contains control characters"
        )));
    }

    if value.starts_with('-') {
        return Err(OppyError::InvalidArgument(format!(
            "{kind} cannot start with '-'"
        )));
    }

    Ok(())
}
