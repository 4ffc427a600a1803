//! Lenient semantic versions
//!
//! Release tags in the wild are rarely strict semver: `v2.1`, `3.0.0beta`,
//! `1.2.3.4` all show up. [`SemanticVersion`] accepts any string that starts
//! with a dotted run of numbers and orders it the way semver would, padding
//! missing components with zeros. Pre-release identifiers use semver
//! precedence (via the `semver` crate) and build metadata is carried along
//! but ignored for ordering and equality.

use semver::{BuildMetadata, Prerelease};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use tracing::warn;

use crate::error::{Error, Result};

/// Version used when the build did not substitute a real version string
pub const FALLBACK_VERSION: &str = "1.0.0";

/// Placeholder left behind by unsubstituted build templates
const VERSION_PLACEHOLDER: &str = "@project.version@";

/// Immutable, totally ordered version value
#[derive(Clone)]
pub struct SemanticVersion {
    components: Vec<u64>,
    pre: Prerelease,
    build: BuildMetadata,
    original: String,
}

impl SemanticVersion {
    /// Parse a version string, best effort
    ///
    /// Fails with [`Error::InvalidVersionFormat`] only when no leading
    /// numeric component can be found or a component overflows.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let body = trimmed
            .strip_prefix(['v', 'V'])
            .unwrap_or(trimmed);

        let (rest, build) = match body.split_once('+') {
            Some((rest, build)) => (rest, Some(build)),
            None => (body, None),
        };

        let core_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (core, suffix) = rest.split_at(core_end);
        let core = core.trim_end_matches('.');

        if core.is_empty() {
            return Err(Error::invalid_version(format!(
                "'{}' has no numeric version component",
                input
            )));
        }

        let components = core
            .split('.')
            .map(|part| {
                part.parse::<u64>().map_err(|e| {
                    Error::invalid_version(format!(
                        "'{}' has an invalid component '{}': {}",
                        input, part, e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let pre = parse_pre_release(input, suffix.trim_start_matches(['-', '.']))?;
        let build = match build {
            Some(build) => parse_build(input, build)?,
            None => BuildMetadata::EMPTY,
        };

        Ok(Self {
            components,
            pre,
            build,
            original: trimmed.to_string(),
        })
    }

    /// Parse the version of the running build
    ///
    /// An empty string or an unsubstituted `@project.version@` placeholder
    /// falls back to [`FALLBACK_VERSION`].
    pub fn running_or_default(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == VERSION_PLACEHOLDER {
            warn!("Version string not found. Using {}", FALLBACK_VERSION);
            return Self::parse(FALLBACK_VERSION);
        }
        Self::parse(trimmed)
    }

    /// Whether `self` orders strictly after `other`
    pub fn is_newer_than(&self, other: &SemanticVersion) -> bool {
        self.cmp(other) == Ordering::Greater
    }

    /// Whether `self` is an update for the `current` version
    pub fn is_update_for(&self, current: &SemanticVersion) -> bool {
        self.is_newer_than(current)
    }

    /// Whether `self` orders equal to or after `other`
    pub fn is_same_or_newer(&self, other: &SemanticVersion) -> bool {
        self.cmp(other) != Ordering::Less
    }

    /// Numeric components as parsed (no zero padding)
    pub fn components(&self) -> &[u64] {
        &self.components
    }

    /// Pre-release qualifier, if any
    pub fn pre_release(&self) -> Option<&str> {
        (!self.pre.is_empty()).then(|| self.pre.as_str())
    }

    /// Build metadata, if any
    pub fn build(&self) -> Option<&str> {
        (!self.build.is_empty()).then(|| self.build.as_str())
    }

    /// The string this version was parsed from (trimmed)
    pub fn as_str(&self) -> &str {
        &self.original
    }

    fn significant_components(&self) -> &[u64] {
        let len = self
            .components
            .iter()
            .rposition(|c| *c != 0)
            .map_or(0, |i| i + 1);
        &self.components[..len]
    }
}

fn parse_pre_release(input: &str, raw: &str) -> Result<Prerelease> {
    if raw.is_empty() {
        return Ok(Prerelease::EMPTY);
    }
    if let Ok(pre) = Prerelease::new(raw) {
        return Ok(pre);
    }

    let normalized = raw
        .split('.')
        .map(sanitize_identifier)
        .filter(|id| !id.is_empty())
        .map(|id| {
            if id.chars().all(|c| c.is_ascii_digit()) {
                let stripped = id.trim_start_matches('0');
                if stripped.is_empty() { "0".to_string() } else { stripped.to_string() }
            } else {
                id
            }
        })
        .collect::<Vec<_>>()
        .join(".");

    if normalized.is_empty() {
        return Ok(Prerelease::EMPTY);
    }
    Prerelease::new(&normalized).map_err(|e| {
        Error::invalid_version(format!(
            "'{}' has an unorderable pre-release '{}': {}",
            input, raw, e
        ))
    })
}

fn parse_build(input: &str, raw: &str) -> Result<BuildMetadata> {
    if let Ok(build) = BuildMetadata::new(raw) {
        return Ok(build);
    }
    let normalized = raw
        .split('.')
        .map(sanitize_identifier)
        .filter(|id| !id.is_empty())
        .collect::<Vec<_>>()
        .join(".");
    if normalized.is_empty() {
        return Ok(BuildMetadata::EMPTY);
    }
    BuildMetadata::new(&normalized).map_err(|e| {
        Error::invalid_version(format!(
            "'{}' has invalid build metadata '{}': {}",
            input, raw, e
        ))
    })
}

fn sanitize_identifier(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ordering => return ordering,
            }
        }
        self.pre.cmp(&other.pre)
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl Hash for SemanticVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Must agree with Eq: trailing zeros and build metadata are insignificant
        self.significant_components().hash(state);
        self.pre.as_str().hash(state);
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl fmt::Debug for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SemanticVersion({})", self.original)
    }
}

impl FromStr for SemanticVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.original)
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
