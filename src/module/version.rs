//! Module version parsing and minimum-version compatibility.

use crate::error::{RegistryError, RegistryResult};
use semver::Version;

/// Parse a module version, padding `"1"` and `"1.2"` to three components.
pub fn parse_version(value: &str) -> RegistryResult<Version> {
    let trimmed = value.trim().trim_start_matches('v');
    let padded = match trimmed.split('.').count() {
        1 => format!("{trimmed}.0.0"),
        2 => format!("{trimmed}.0"),
        _ => trimmed.to_string(),
    };

    Version::parse(&padded).map_err(|e| RegistryError::InvalidVersion {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// `available` satisfies the `required` floor: same major, and minor/patch at or above it.
pub fn is_version_compatible(available: &Version, required: &Version) -> bool {
    if available.major != required.major {
        return false;
    }
    (available.minor, available.patch) >= (required.minor, required.patch)
}
