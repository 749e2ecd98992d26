//! core::naming
//!
//! Branch naming rules.
//!
//! # Features
//!
//! - Generate slugs from titles
//! - Generate publish branch names that are deterministic for a given
//!   branch record and unlikely to collide across projects

use chrono::{DateTime, Utc};

use super::types::{BranchId, BranchName, ProjectId, TypeError};

/// Generate a branch name slug from free text.
///
/// Converts the first line into a valid branch name component:
/// - Lowercase
/// - Spaces and underscores become hyphens
/// - Remove invalid characters
/// - Truncate to reasonable length
///
/// # Example
///
/// ```
/// use inkpress::core::naming::slugify;
///
/// assert_eq!(slugify("Spring Launch Notes"), "spring-launch-notes");
/// assert_eq!(slugify("Fix typo #123"), "fix-typo-123");
/// ```
pub fn slugify(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("");

    first_line
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else if c == ' ' || c == '_' || c == '-' {
                Some('-')
            } else {
                None
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(40)
        .collect::<String>()
        .trim_end_matches('-')
        .to_string()
}

/// Name of the working branch for a publish branch record.
///
/// Format: `<prefix>/<project-slug>-<yyyymmdd>-<branch-short>`. The
/// branch record id makes the name unique; the UTC timestamp keeps it readable.
/// Projects whose name slugifies to nothing use their short id instead.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use inkpress::core::naming::publish_branch_name;
/// use inkpress::core::types::{BranchId, ProjectId};
///
/// let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
/// let name =
///     publish_branch_name("inkpress", "Docs Site", &ProjectId::new(), &BranchId::new(), at)
///         .unwrap();
/// assert!(name.as_str().starts_with("inkpress/docs-site-"));
/// assert!(name.as_str().contains("-20260304050607-"));
/// ```
pub fn publish_branch_name(
    prefix: &str,
    project_name: &str,
    project: &ProjectId,
    branch: &BranchId,
    at: DateTime<Utc>,
) -> Result<BranchName, TypeError> {
    let prefix = prefix.trim_matches('/');
    let label = match slugify(project_name) {
        slug if slug.is_empty() => project.short(),
        slug => slug,
    };
    BranchName::new(format!(
        "{}/{}-{}-{}",
        prefix,
        label,
        at.format("%Y%m%d%H%M%S"),
        branch.short()
    ))
}
