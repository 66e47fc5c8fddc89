//! Semver version-tag normalization, ported from `lecturer_deployment.py`:
//! a bare `"1.2"` normalizes to `"1.2.0"` before any comparison.

use computor_core::ApiError;
use semver::Version;

pub fn normalize_version_tag(raw: &str) -> Result<String, ApiError> {
    let dot_count = raw.matches('.').count();
    let candidate = match dot_count {
        0 => format!("{raw}.0.0"),
        1 => format!("{raw}.0"),
        _ => raw.to_string(),
    };
    Version::parse(&candidate)
        .map(|v| v.to_string())
        .map_err(|e| ApiError::validation(format!("invalid version tag {raw:?}: {e}")))
}
