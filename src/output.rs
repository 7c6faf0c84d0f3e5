use colored::Colorize;

use tagwatch::classifier::{raw_update, update_available, update_kind};
use tagwatch::models::{Container, Kind, ManifestDescriptor, ManifestVersion, SemverDiff};
use tagwatch::trigger::Trigger;

/// Print the tag list of one image
pub fn print_tags(image: &str, tags: &[String]) {
    println!("\n{} ({} tags)", image.bold(), tags.len());
    println!("{}", "─".repeat(60));
    for tag in tags {
        println!("  {}", tag);
    }
}

pub fn print_manifest(image: &str, reference: &str, descriptor: &ManifestDescriptor) {
    let version = match descriptor.version {
        ManifestVersion::V1 => "v1",
        ManifestVersion::V2 => "v2",
    };
    let created = match &descriptor.created {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "unknown".to_string(),
    };
    println!(
        "{}:{} {} ({}, created {})",
        image.bold(),
        reference,
        descriptor.digest,
        version.dimmed(),
        created.dimmed()
    );
}

/// Print the classification of one container
pub fn print_verdict(container: &Container) {
    let kind = update_kind(container);
    let remote = container
        .result
        .as_ref()
        .map(|r| r.tag.as_str())
        .unwrap_or("?");

    let label = if update_available(container) {
        "UPDATE".yellow().bold()
    } else if raw_update(container).is_some() {
        "SUPPRESSED".dimmed().bold()
    } else {
        "    OK".green().bold()
    };

    let detail = match kind.kind {
        Kind::Digest => format!(
            "digest {} -> {}",
            truncate_digest(kind.local_value.as_deref().unwrap_or("")),
            truncate_digest(kind.remote_value.as_deref().unwrap_or(""))
        ),
        Kind::Tag => format!(
            "tag {} -> {}{}",
            container.image.tag.value,
            remote,
            kind.semver_diff
                .map(|d| format!(" ({})", semver_label(d)))
                .unwrap_or_default()
        ),
        Kind::Unknown => format!("tag {}", container.image.tag.value),
    };

    println!(
        "  [{}] {:<24} {}",
        label,
        container.display_name.as_deref().unwrap_or(&container.name),
        detail.dimmed()
    );
}

fn semver_label(diff: SemverDiff) -> &'static str {
    match diff {
        SemverDiff::Major => "major",
        SemverDiff::Minor => "minor",
        SemverDiff::Patch => "patch",
        SemverDiff::Prerelease => "prerelease",
        SemverDiff::Unknown => "unknown",
    }
}

pub fn print_notification(trigger: &Trigger, title: &str, body: &str) {
    println!("\n  {} {}", format!("[{}]", trigger.id()).cyan().bold(), title.bold());
    for line in body.lines() {
        println!("    {}", line);
    }
}

pub fn print_batch(trigger: &Trigger, title: &str, containers: &[&Container]) {
    println!("\n  {} {}", format!("[{}]", trigger.id()).cyan().bold(), title.bold());
    for container in containers {
        println!("    - {}", trigger.render_simple_title(container));
    }
}

fn truncate_digest(digest: &str) -> &str {
    digest.get(..19).unwrap_or(digest)
}

/// Print final summary
pub fn print_summary(checked: usize, available: usize, notifications: usize, errors: usize) {
    println!("\n{}", "═".repeat(60));
    println!(
        "{} Checked {} containers, {} updates available, {} notifications, {} errors",
        "SUMMARY:".bold(),
        checked,
        available.to_string().yellow().bold(),
        notifications,
        if errors > 0 {
            errors.to_string().red().bold().to_string()
        } else {
            errors.to_string()
        }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_digest() {
        assert_eq!(
            truncate_digest("sha256:0123456789abcdef0123"),
            "sha256:0123456789ab"
        );
        assert_eq!(truncate_digest("sha256:abc"), "sha256:abc");
        assert_eq!(truncate_digest(""), "");
    }

    #[test]
    fn test_truncate_digest_non_ascii_boundary() {
        // byte 19 falls inside the two-byte 'é'
        let digest = "sha256:0123456789aéxyz";
        assert_eq!(truncate_digest(digest), digest);
    }
}
