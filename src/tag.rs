use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use semver::Version;
use tracing::warn;

use crate::error::AppError;
use crate::models::SemverDiff;

/// Tag normalization formula, written as `<regex> => <replacement>`.
#[derive(Debug, Clone)]
pub struct TagTransform {
    pattern: Regex,
    replacement: String,
}

impl TagTransform {
    pub fn parse(formula: &str) -> Result<Self, AppError> {
        let (pattern, replacement) =
            formula
                .split_once("=>")
                .ok_or_else(|| AppError::InvalidTransform {
                    formula: formula.to_string(),
                })?;
        Ok(Self {
            pattern: Regex::new(pattern.trim())?,
            replacement: replacement.trim().to_string(),
        })
    }

    /// Rewrite `tag` when the pattern matches, substituting `$N` groups.
    pub fn apply(&self, tag: &str) -> String {
        match self.pattern.captures(tag) {
            Some(caps) => substitute(&self.replacement, &caps),
            None => tag.to_string(),
        }
    }
}

/// `$N` placeholders are replaced by the Nth group; unmatched groups become empty.
fn substitute(replacement: &str, caps: &Captures<'_>) -> String {
    let mut out = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' || !chars.peek().is_some_and(|d| d.is_ascii_digit()) {
            out.push(c);
            continue;
        }
        let mut index = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            index.push(d);
            chars.next();
        }
        if let Some(m) = index.parse::<usize>().ok().and_then(|i| caps.get(i)) {
            out.push_str(m.as_str());
        }
    }
    out
}

/// Parse an optional formula once for a batch of tags. An invalid formula
/// is logged and yields `None`, which behaves like the identity.
pub fn parse_transform(formula: Option<&str>) -> Option<TagTransform> {
    let formula = formula?;
    match TagTransform::parse(formula) {
        Ok(transform) => Some(transform),
        Err(e) => {
            warn!(formula, error = %e, "ignoring tag transform");
            None
        }
    }
}

pub fn apply_transform(transform: Option<&TagTransform>, tag: &str) -> String {
    match transform {
        Some(transform) => transform.apply(tag),
        None => tag.to_string(),
    }
}

/// Normalize a single tag through an optional formula.
pub fn transform_tag(formula: Option<&str>, tag: &str) -> String {
    apply_transform(parse_transform(formula).as_ref(), tag)
}

/// Parse a tag as semver, leniently: a leading `v` is allowed, and tags
/// that are not strict semver are coerced from their first numeric run.
pub fn parse_semver(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    if let Ok(version) = Version::parse(stripped) {
        return Some(version);
    }
    coerce(stripped)
}

static COERCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").ok());

fn coerce(raw: &str) -> Option<Version> {
    let caps = COERCE.as_ref()?.captures(raw)?;
    let part = |i: usize| -> Option<u64> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };
    Some(Version::new(part(1)?, part(2)?, part(3)?))
}

/// Precedence ordering; build metadata is ignored.
pub fn compare_semver(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

/// True when `candidate` is a strictly higher version than `current`.
pub fn is_greater_semver(candidate: &str, current: &str) -> bool {
    match (parse_semver(candidate), parse_semver(current)) {
        (Some(candidate), Some(current)) => {
            compare_semver(&candidate, &current) == Ordering::Greater
        }
        _ => false,
    }
}

/// Magnitude of the change between two tags. `None` when either side does
/// not parse; pre-release bumps of a base field count as that field.
pub fn diff_semver(local: &str, remote: &str) -> Option<SemverDiff> {
    let local = parse_semver(local)?;
    let remote = parse_semver(remote)?;
    let diff = if local.major != remote.major {
        SemverDiff::Major
    } else if local.minor != remote.minor {
        SemverDiff::Minor
    } else if local.patch != remote.patch {
        SemverDiff::Patch
    } else if local.pre != remote.pre {
        SemverDiff::Prerelease
    } else {
        SemverDiff::Unknown
    };
    Some(diff)
}
