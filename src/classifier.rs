//! Update classification for a container's image/result pair.
//!
//! Everything here is derived on demand from the container; nothing is
//! written back, so a held `Container` can never carry a stale verdict.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use crate::models::{Container, Kind, SemverDiff, UpdateKind};
use crate::tag::{apply_transform, diff_semver, parse_transform};

/// The unsuppressed diff between local and remote state, or `None` when
/// they agree.
///
/// A creation-date-only difference yields `Kind::Unknown` without a
/// `remote_value`, so it cannot be skip-listed.
pub fn raw_update(container: &Container) -> Option<UpdateKind> {
    let result = container.result.as_ref()?;
    let image = &container.image;

    if image.digest.watch {
        if let (Some(local), Some(remote)) = (&image.digest.value, &result.digest) {
            if local == remote {
                return None;
            }
            return Some(UpdateKind {
                kind: Kind::Digest,
                local_value: Some(local.clone()),
                remote_value: Some(remote.clone()),
                semver_diff: None,
            });
        }
    }

    let transform = parse_transform(container.transform_tags.as_deref());
    let local_tag = apply_transform(transform.as_ref(), &image.tag.value);
    let remote_tag = apply_transform(transform.as_ref(), &result.tag);

    if local_tag != remote_tag {
        let semver_diff = image.tag.semver.then(|| {
            diff_semver(&local_tag, &remote_tag).unwrap_or(SemverDiff::Unknown)
        });
        return Some(UpdateKind {
            kind: Kind::Tag,
            local_value: Some(image.tag.value.clone()),
            remote_value: Some(result.tag.clone()),
            semver_diff,
        });
    }

    match (image.created, result.created) {
        (Some(local), Some(remote)) if local != remote => Some(UpdateKind::default()),
        _ => None,
    }
}

/// The raw diff, or an empty `Unknown` kind when there is none.
pub fn update_kind(container: &Container) -> UpdateKind {
    raw_update(container).unwrap_or_default()
}

pub fn is_suppressed(container: &Container, update_kind: &UpdateKind) -> bool {
    is_suppressed_at(container, update_kind, Utc::now())
}

pub fn is_suppressed_at(container: &Container, update_kind: &UpdateKind, now: DateTime<Utc>) -> bool {
    let policy = &container.update_policy;

    if let Some(until) = policy.snooze_until.as_deref().and_then(parse_snooze) {
        if until > now {
            return true;
        }
    }

    let Some(remote) = update_kind.remote_value.as_ref() else {
        return false;
    };
    match update_kind.kind {
        Kind::Tag => policy.skip_tags.contains(remote),
        Kind::Digest => policy.skip_digests.contains(remote),
        Kind::Unknown => false,
    }
}

pub fn update_available(container: &Container) -> bool {
    update_available_at(container, Utc::now())
}

pub fn update_available_at(container: &Container, now: DateTime<Utc>) -> bool {
    match raw_update(container) {
        Some(kind) => !is_suppressed_at(container, &kind, now),
        None => false,
    }
}

/// RFC 3339, or a bare date taken as midnight UTC.
fn parse_snooze(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
        Err(_) => {
            warn!(snooze_until = raw, "ignoring unparseable snooze date");
            None
        }
    }
}
