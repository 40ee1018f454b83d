//! Version token helpers
//!
//! Version tokens are opaque strings owned by each registry. These helpers
//! read them as semver where possible (a leading `v` is tolerated) and fall
//! back to plain string comparison otherwise.

use semver::{Version, VersionReq};

/// Parse a token as a single semver version, ignoring a leading `v`.
pub fn parse(token: &str) -> Option<Version> {
    let trimmed = token.strip_prefix('v').unwrap_or(token);
    Version::parse(trimmed).ok()
}

/// Whether the token is a range or inequality rather than a single pin.
///
/// Ranges are never bumped automatically.
pub fn is_range(token: &str) -> bool {
    if parse(token).is_some() {
        return false;
    }
    let trimmed = token.trim();
    if trimmed.contains("||") || trimmed.contains(" - ") {
        return true;
    }
    VersionReq::parse(trimmed).is_ok()
}

/// Whether the token is a semver prerelease such as `1.0.0-rc.1`.
pub fn is_prerelease(token: &str) -> bool {
    parse(token).is_some_and(|v| !v.pre.is_empty())
}

/// Whether `candidate` should replace `current`.
///
/// When both tokens are semver the candidate must be strictly greater, so a
/// registry pointing at an older release never produces a downgrade.
/// Otherwise any different token counts as newer.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    match (parse(candidate), parse(current)) {
        (Some(candidate), Some(current)) => candidate > current,
        _ => candidate != current,
    }
}
