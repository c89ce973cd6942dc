//! Lenient version parsing.
//!
//! Release manifests are written by hand often enough that `"99.0"` or
//! `"v2"` show up. Missing minor and patch components are read as zero, so
//! `"99.0"` compares equal to `99.0.0`.

use semver::Version;

use crate::error::UpdateError;

pub fn parse_lenient(input: &str) -> Result<Version, UpdateError> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if let Ok(version) = Version::parse(trimmed) {
        return Ok(version);
    }

    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);

    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty()
        || parts.len() > 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(UpdateError::VersionParseError(format!(
            "not a version: '{input}'"
        )));
    }

    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);

    Ok(Version::parse(&padded)?)
}
