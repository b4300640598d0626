//! Classify the magnitude of a version change.
//!
//! Versions are accepted when they start with `v?MAJOR.MINOR.PATCH`; anything
//! after the numeric triple (pre-release tags, build metadata, extra
//! components) is ignored. A version that does not match is treated as the
//! riskiest possible change.

use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

use super::strategy::UpdateStrategy;

/// Magnitude of a version change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    Patch,
    Minor,
    Major,
}

impl UpdateType {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateType::Patch => "patch",
            UpdateType::Minor => "minor",
            UpdateType::Major => "major",
        }
    }

    pub fn strategy(self) -> UpdateStrategy {
        UpdateStrategy::for_update(self)
    }
}

impl fmt::Display for UpdateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify the change from `current` to `target`.
///
/// Unparseable input on either side yields [`UpdateType::Major`]. Equal or
/// regressive targets classify as [`UpdateType::Patch`].
pub fn classify(current: &str, target: &str) -> UpdateType {
    let (Some(current), Some(target)) = (parse_release(current), parse_release(target)) else {
        return UpdateType::Major;
    };

    if target.major > current.major {
        UpdateType::Major
    } else if target.minor > current.minor {
        UpdateType::Minor
    } else {
        // Higher patch, identical, and regressive targets all land here.
        UpdateType::Patch
    }
}

/// Extract the leading `MAJOR.MINOR.PATCH` triple of a version string.
///
/// An optional `v` prefix is accepted. Returns `None` when the string does not
/// begin with three dot-separated digit runs, or when a component overflows.
pub fn parse_release(version: &str) -> Option<Version> {
    let rest = version.strip_prefix('v').unwrap_or(version);

    let (major, rest) = take_digits(rest)?;
    let rest = rest.strip_prefix('.')?;
    let (minor, rest) = take_digits(rest)?;
    let rest = rest.strip_prefix('.')?;
    let (patch, _) = take_digits(rest)?;

    Some(Version::new(
        major.parse().ok()?,
        minor.parse().ok()?,
        patch.parse().ok()?,
    ))
}

fn take_digits(input: &str) -> Option<(&str, &str)> {
    let end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    if end == 0 {
        return None;
    }
    Some(input.split_at(end))
}
