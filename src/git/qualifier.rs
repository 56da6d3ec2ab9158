//! Build qualifiers: `<yyyyMMdd-HHmmss>-<branch>` with `/` in the branch
//! name replaced by `_`.

use chrono::{DateTime, Local, TimeZone};
use std::path::Path;

use super::{GitError, RepositoryInspector};

pub const DETACHED: &str = "DETACHED";

pub fn format_qualifier<Tz: TimeZone>(timestamp: &DateTime<Tz>, branch: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}-{}",
        timestamp.format("%Y%m%d-%H%M%S"),
        branch.replace('/', "_")
    )
}

fn branch_or_detached(
    inspector: &RepositoryInspector,
    repo: &Path,
    branch: Option<&str>,
) -> Result<String, GitError> {
    match branch {
        Some(branch) => Ok(branch.to_string()),
        None => Ok(inspector
            .current_branch(repo)?
            .unwrap_or_else(|| DETACHED.to_string())),
    }
}

/// Qualifier from the latest commit date over all submodules, so that
/// rebuilding an unchanged tree yields the same qualifier.
pub fn create_qualifier(repo: &Path, branch: Option<&str>) -> Result<String, GitError> {
    let inspector = RepositoryInspector;
    let timestamp = inspector.latest_submodule_commit(repo)?;
    let branch = branch_or_detached(&inspector, repo, branch)?;
    Ok(format_qualifier(&timestamp, &branch))
}

/// Qualifier from the current time.
pub fn create_now_qualifier(repo: &Path, branch: Option<&str>) -> Result<String, GitError> {
    let inspector = RepositoryInspector;
    let branch = branch_or_detached(&inspector, repo, branch)?;
    Ok(format_qualifier(&Local::now(), &branch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    #[test]
    fn test_format_qualifier_replaces_slashes() {
        let timestamp = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2016, 3, 7)
                .unwrap()
                .and_hms_opt(14, 5, 9)
                .unwrap(),
        );
        assert_eq!(
            format_qualifier(&timestamp, "release/2.0.0"),
            "20160307-140509-release_2.0.0"
        );
    }

    #[test]
    fn test_explicit_branch_skips_repository_lookup() {
        let temp = tempfile::tempdir().unwrap();
        // Not a repository: only the branch lookup would need one.
        let branch = branch_or_detached(&RepositoryInspector, temp.path(), Some("master")).unwrap();
        assert_eq!(branch, "master");
    }
}
