//! Version rewriting across a repository and its submodules.
//!
//! Maven-style versions (`2.1.0-SNAPSHOT`) are rewritten in build files.
//! Eclipse bundle metadata uses the OSGi form, where `-SNAPSHOT` becomes
//! `.qualifier`, and is rewritten in that form.

use std::fs;
use std::path::{Path, PathBuf};

use regex::{Captures, Regex};
use thiserror::Error;
use walkdir::WalkDir;

use crate::external::{CommitOptions, VersionControl};
use crate::git::GitError;

const SKIPPED_DIRS: [&str; 4] = [".git", "target", "node_modules", ".local-deploy-repository"];

/// Gradle writes its output to `build/` next to the build script; other
/// directories named `build` hold sources.
fn is_gradle_output(dir: &Path) -> bool {
    dir.file_name().is_some_and(|name| name == "build")
        && dir.parent().is_some_and(|parent| {
            parent.join("build.gradle").is_file() || parent.join("build.gradle.kts").is_file()
        })
}

const BUILD_FILES: [&str; 5] = [
    "pom.xml",
    "metaborg.yaml",
    "build.gradle",
    "build.gradle.kts",
    "gradle.properties",
];

const ECLIPSE_FILES: [&str; 3] = ["MANIFEST.MF", "feature.xml", "category.xml"];

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("Invalid version '{version}'")]
    InvalidVersion { version: String },
    #[error("Cannot rewrite {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot walk repository tree: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Cannot commit version change: {0}")]
    Git(#[from] GitError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Report what would change without writing or committing.
    pub dry_run: bool,
    /// Commit the changes in every affected repository.
    pub commit: bool,
}

impl RewriteOptions {
    pub fn commit() -> Self {
        Self {
            dry_run: false,
            commit: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub changed_files: Vec<PathBuf>,
    /// Repositories a commit was made in, submodules in declaration order
    /// followed by the root.
    pub committed: Vec<PathBuf>,
}

/// Rewrites every version declaration under a repository.
pub trait VersionRewriter {
    fn rewrite(
        &self,
        repo: &Path,
        from: &str,
        to: &str,
        options: RewriteOptions,
    ) -> Result<RewriteReport, VersionError>;
}

/// OSGi form of a Maven version.
pub fn eclipse_version(version: &str) -> String {
    match version.strip_suffix("-SNAPSHOT") {
        Some(base) => format!("{base}.qualifier"),
        None => version.to_string(),
    }
}

/// Matches `version` only where it is not part of a longer version or word.
fn version_pattern(version: &str) -> Result<Regex, VersionError> {
    if version.is_empty() || version.chars().any(char::is_whitespace) {
        return Err(VersionError::InvalidVersion {
            version: version.to_string(),
        });
    }
    Regex::new(&format!(
        r"(^|[^\w.\-]){}($|[^\w.\-])",
        regex::escape(version)
    ))
    .map_err(|_| VersionError::InvalidVersion {
        version: version.to_string(),
    })
}

fn replace_version(content: &str, pattern: &Regex, to: &str) -> Option<String> {
    let mut replaced = content.to_string();
    let mut changed = false;
    // Adjacent occurrences share a boundary character, so a second pass
    // picks up those the first one skipped.
    for _ in 0..2 {
        let next = pattern
            .replace_all(&replaced, |caps: &Captures<'_>| format!("{}{}{}", &caps[1], to, &caps[2]))
            .to_string();
        if next == replaced {
            break;
        }
        changed = true;
        replaced = next;
    }
    changed.then_some(replaced)
}

enum FileKind {
    Build,
    Eclipse,
}

fn classify(path: &Path) -> Option<FileKind> {
    let name = path.file_name()?.to_str()?;
    if BUILD_FILES.contains(&name) {
        Some(FileKind::Build)
    } else if ECLIPSE_FILES.contains(&name) || name.ends_with(".product") {
        Some(FileKind::Eclipse)
    } else {
        None
    }
}

/// Rewrites versions in the working tree and commits through a
/// [`VersionControl`].
pub struct TreeVersionRewriter<'a> {
    vcs: &'a dyn VersionControl,
}

impl<'a> TreeVersionRewriter<'a> {
    pub fn new(vcs: &'a dyn VersionControl) -> Self {
        Self { vcs }
    }
}

impl VersionRewriter for TreeVersionRewriter<'_> {
    fn rewrite(
        &self,
        repo: &Path,
        from: &str,
        to: &str,
        options: RewriteOptions,
    ) -> Result<RewriteReport, VersionError> {
        let build_pattern = version_pattern(from)?;
        let eclipse_pattern = version_pattern(&eclipse_version(from))?;
        version_pattern(to)?;
        let eclipse_to = eclipse_version(to);

        tracing::info!(from, to, dry_run = options.dry_run, "Setting versions");

        let mut report = RewriteReport::default();
        let walker = WalkDir::new(repo).into_iter().filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && (entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIPPED_DIRS.contains(&name))
                    || is_gradle_output(entry.path())))
        });
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let (pattern, replacement) = match classify(path) {
                Some(FileKind::Build) => (&build_pattern, to),
                Some(FileKind::Eclipse) => (&eclipse_pattern, eclipse_to.as_str()),
                None => continue,
            };

            let content = fs::read_to_string(path).map_err(|source| VersionError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let Some(updated) = replace_version(&content, pattern, replacement) else {
                continue;
            };

            tracing::debug!(file = %path.display(), "Version updated");
            if !options.dry_run {
                fs::write(path, updated).map_err(|source| VersionError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
            report.changed_files.push(path.to_path_buf());
        }

        if options.commit && !options.dry_run && !report.changed_files.is_empty() {
            let message = format!("Set version to {to}");
            let submodules = self.vcs.submodules(repo)?;
            let mut root_changed = false;
            for file in &report.changed_files {
                if !submodules.iter().any(|s| file.starts_with(&s.path)) {
                    root_changed = true;
                }
            }
            for submodule in &submodules {
                if report.changed_files.iter().any(|f| f.starts_with(&submodule.path)) {
                    tracing::info!(submodule = %submodule.name, "Committing version change");
                    self.vcs.add_all(&submodule.path)?;
                    self.vcs
                        .commit(&submodule.path, &message, CommitOptions::default())?;
                    report.committed.push(submodule.path.clone());
                }
            }
            if root_changed {
                self.vcs.add_all(repo)?;
                self.vcs.commit(repo, &message, CommitOptions::default())?;
                report.committed.push(repo.to_path_buf());
            }
        }

        tracing::info!(files = report.changed_files.len(), "Versions set");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::SubmoduleEntry;
    use crate::testing::{GitCall, MockVersionControl};

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_eclipse_version_conversion() {
        assert_eq!(eclipse_version("2.1.0-SNAPSHOT"), "2.1.0.qualifier");
        assert_eq!(eclipse_version("2.0.0"), "2.0.0");
    }

    #[test]
    fn test_boundaries_prevent_partial_matches() {
        let pattern = version_pattern("2.0.0").unwrap();
        assert_eq!(
            replace_version("<version>2.0.0</version> 12.0.0 2.0.0-SNAPSHOT 2.0.0.1", &pattern, "2.1.0"),
            Some("<version>2.1.0</version> 12.0.0 2.0.0-SNAPSHOT 2.0.0.1".to_string())
        );
        assert_eq!(replace_version("2.0.01", &pattern, "2.1.0"), None);
    }

    #[test]
    fn test_adjacent_occurrences_are_all_replaced() {
        let pattern = version_pattern("1.0").unwrap();
        assert_eq!(
            replace_version("1.0,1.0,1.0", &pattern, "2.0"),
            Some("2.0,2.0,2.0".to_string())
        );
    }

    #[test]
    fn test_rejects_empty_version() {
        assert!(matches!(
            version_pattern(""),
            Err(VersionError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn test_rewrite_commits_affected_submodules() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write(&root.join("pom.xml"), "<version>2.1.0-SNAPSHOT</version>\n");
        write(
            &root.join("jsglr/pom.xml"),
            "<parent><version>2.1.0-SNAPSHOT</version></parent>\n",
        );
        write(
            &root.join("jsglr/META-INF/MANIFEST.MF"),
            "Bundle-Version: 2.1.0.qualifier\n",
        );
        write(&root.join("jsglr/target/pom.xml"), "<version>2.1.0-SNAPSHOT</version>\n");
        write(&root.join("sdf/pom.xml"), "<version>1.0.0</version>\n");
        write(&root.join("sdf/README.md"), "2.1.0-SNAPSHOT\n");

        let vcs = MockVersionControl::new(root)
            .with_submodule(SubmoduleEntry::new("jsglr", root.join("jsglr")))
            .with_submodule(SubmoduleEntry::new("sdf", root.join("sdf")));
        let report = TreeVersionRewriter::new(&vcs)
            .rewrite(root, "2.1.0-SNAPSHOT", "2.1.0", RewriteOptions::commit())
            .unwrap();

        assert_eq!(report.changed_files.len(), 3);
        assert_eq!(
            fs::read_to_string(root.join("jsglr/META-INF/MANIFEST.MF")).unwrap(),
            "Bundle-Version: 2.1.0\n"
        );
        assert_eq!(
            fs::read_to_string(root.join("jsglr/target/pom.xml")).unwrap(),
            "<version>2.1.0-SNAPSHOT</version>\n"
        );
        assert_eq!(
            fs::read_to_string(root.join("sdf/README.md")).unwrap(),
            "2.1.0-SNAPSHOT\n"
        );
        assert_eq!(report.committed, vec![root.join("jsglr"), root.to_path_buf()]);
        assert!(vcs
            .calls()
            .contains(&GitCall::Commit(root.join("jsglr"), "Set version to 2.1.0".to_string())));
    }

    #[test]
    fn test_build_directories_with_poms_are_rewritten() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write(
            &root.join("releng/build/parent/pom.xml"),
            "<version>2.0.0-SNAPSHOT</version>\n",
        );
        write(
            &root.join("releng/build/java/pom.xml"),
            "<parent><version>2.0.0-SNAPSHOT</version></parent>\n",
        );
        write(&root.join("spoofax-gradle/build.gradle"), "version = \"2.0.0-SNAPSHOT\"\n");
        write(
            &root.join("spoofax-gradle/build/tmp/pom.xml"),
            "<version>2.0.0-SNAPSHOT</version>\n",
        );

        let vcs = MockVersionControl::new(root);
        let report = TreeVersionRewriter::new(&vcs)
            .rewrite(root, "2.0.0-SNAPSHOT", "2.0.0", RewriteOptions::default())
            .unwrap();

        assert_eq!(report.changed_files.len(), 3);
        assert_eq!(
            fs::read_to_string(root.join("releng/build/parent/pom.xml")).unwrap(),
            "<version>2.0.0</version>\n"
        );
        assert_eq!(
            fs::read_to_string(root.join("releng/build/java/pom.xml")).unwrap(),
            "<parent><version>2.0.0</version></parent>\n"
        );
        assert_eq!(
            fs::read_to_string(root.join("spoofax-gradle/build/tmp/pom.xml")).unwrap(),
            "<version>2.0.0-SNAPSHOT</version>\n"
        );
    }

    #[test]
    fn test_dry_run_changes_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        write(&root.join("pom.xml"), "<version>2.1.0-SNAPSHOT</version>\n");

        let vcs = MockVersionControl::new(root);
        let report = TreeVersionRewriter::new(&vcs)
            .rewrite(
                root,
                "2.1.0-SNAPSHOT",
                "2.1.0",
                RewriteOptions {
                    dry_run: true,
                    commit: true,
                },
            )
            .unwrap();

        assert_eq!(report.changed_files, vec![root.join("pom.xml")]);
        assert!(report.committed.is_empty());
        assert!(vcs.calls().is_empty());
        assert_eq!(
            fs::read_to_string(root.join("pom.xml")).unwrap(),
            "<version>2.1.0-SNAPSHOT</version>\n"
        );
    }
}
