//! Versioning of emitted JSON and persisted experiment files.

/// Bumped in MAJOR when a field is removed or changes type; additive
/// changes bump MINOR.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Check if a stored schema version can be read by this build.
pub fn is_compatible(version: &str) -> bool {
    let major = |v: &str| {
        v.split('.')
            .next()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0)
    };
    major(SCHEMA_VERSION) == major(version)
}
