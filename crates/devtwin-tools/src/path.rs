//! Repository path resolution shared by all path-taking tools
//!
//! Every tool rejects absolute paths and paths that lexically escape the
//! repo root; resolution stays lexical so targets that do not exist yet
//! (write_file, patch adds) still validate.

use std::path::{Component, Path, PathBuf};

/// Resolve a repo-relative path, normalizing backslashes to forward slashes.
pub fn resolve_repo_path(root: &Path, raw: &str) -> Result<PathBuf, String> {
    let normalized = raw.replace('\\', "/");
    let p = Path::new(&normalized);
    if p.is_absolute() {
        return Err(format!("absolute paths are not allowed: {raw}"));
    }
    let mut stack: Vec<String> = Vec::new();
    for component in p.components() {
        match component {
            Component::Normal(part) => stack.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return Err(format!("path escapes repository root: {raw}"));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!("absolute paths are not allowed: {raw}"));
            }
        }
    }
    let mut out = root.to_path_buf();
    for part in stack {
        out.push(part);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_absolute_and_escaping_paths() {
        let root = Path::new("/repo");
        assert!(resolve_repo_path(root, "/etc/passwd").is_err());
        assert!(resolve_repo_path(root, "../up.txt").is_err());
        assert!(resolve_repo_path(root, "a/b/../../../up.txt").is_err());
    }

    #[test]
    fn normalizes_separators_and_dots() {
        let root = Path::new("/repo");
        assert_eq!(
            resolve_repo_path(root, "src\\lib\\mod.rs").unwrap(),
            PathBuf::from("/repo/src/lib/mod.rs")
        );
        assert_eq!(
            resolve_repo_path(root, "./src/../README.md").unwrap(),
            PathBuf::from("/repo/README.md")
        );
    }
}
