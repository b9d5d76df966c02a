//! Commit construction and filesystem application

use crate::parser::{
    identify_files_added, identify_files_needed, text_to_patch, Chunk, Patch, PatchAction,
    PATCH_PREFIX,
};
use crate::{DiffError, DiffResult};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Add,
    Delete,
    Update,
}

#[derive(Clone, Debug)]
pub struct Change {
    pub kind: ChangeKind,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
}

/// Fully materialized file states, ready to write. Building the commit is
/// where context resolution can still fail; applying it cannot leave a file
/// half-patched.
#[derive(Clone, Debug, Default)]
pub struct Commit {
    pub changes: Vec<(String, Change)>,
}

/// Synthesize the post-patch content of one updated file.
fn get_updated_file(text: &str, chunks: &[Chunk], path: &str) -> DiffResult<String> {
    let orig_lines: Vec<&str> = text.split('\n').collect();
    let mut dest_lines: Vec<String> = Vec::new();
    let mut orig_index = 0usize;

    for chunk in chunks {
        if chunk.orig_index > orig_lines.len() {
            return Err(DiffError::new(format!(
                "{path}: chunk.orig_index {} > len(lines) {}",
                chunk.orig_index,
                orig_lines.len()
            )));
        }
        if orig_index > chunk.orig_index {
            return Err(DiffError::new(format!(
                "{path}: orig_index {orig_index} > chunk.orig_index {}",
                chunk.orig_index
            )));
        }
        dest_lines.extend(
            orig_lines[orig_index..chunk.orig_index]
                .iter()
                .map(|s| s.to_string()),
        );
        orig_index = chunk.orig_index;
        dest_lines.extend(chunk.ins_lines.iter().cloned());
        orig_index += chunk.del_lines.len();
    }
    dest_lines.extend(orig_lines[orig_index..].iter().map(|s| s.to_string()));
    Ok(dest_lines.join("\n"))
}

/// Resolve every action against the original contents.
pub fn patch_to_commit(patch: &Patch, orig: &BTreeMap<String, String>) -> DiffResult<Commit> {
    let mut commit = Commit::default();
    for (path, action) in &patch.actions {
        let change = match action {
            PatchAction::Delete => Change {
                kind: ChangeKind::Delete,
                old_content: orig.get(path).cloned(),
                new_content: None,
            },
            PatchAction::Add { content } => Change {
                kind: ChangeKind::Add,
                old_content: None,
                new_content: Some(content.clone()),
            },
            PatchAction::Update { chunks } => {
                let old = orig.get(path).ok_or_else(|| {
                    DiffError::new(format!("Update File Error: Missing File: {path}"))
                })?;
                Change {
                    kind: ChangeKind::Update,
                    old_content: Some(old.clone()),
                    new_content: Some(get_updated_file(old, chunks, path)?),
                }
            }
        };
        commit.changes.push((path.clone(), change));
    }
    Ok(commit)
}

/// Write a commit through caller-supplied hooks.
pub fn apply_commit<W, R>(commit: &Commit, mut write_fn: W, mut remove_fn: R) -> DiffResult<()>
where
    W: FnMut(&str, &str) -> DiffResult<()>,
    R: FnMut(&str) -> DiffResult<()>,
{
    for (path, change) in &commit.changes {
        match change.kind {
            ChangeKind::Delete => remove_fn(path)?,
            ChangeKind::Add | ChangeKind::Update => {
                write_fn(path, change.new_content.as_deref().unwrap_or_default())?
            }
        }
    }
    Ok(())
}

/// Reject absolute paths and `..` escapes, returning the repo-anchored path.
/// Lexical so that Add targets (which do not exist yet) still validate.
fn resolve_repo_relative(repo_dir: &Path, rel: &str) -> DiffResult<PathBuf> {
    let p = Path::new(rel);
    if p.is_absolute() {
        return Err(DiffError::new("We do not support absolute paths."));
    }
    let mut stack: Vec<&std::ffi::OsStr> = Vec::new();
    for component in p.components() {
        match component {
            Component::Normal(part) => stack.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if stack.pop().is_none() {
                    return Err(DiffError::new("Path escapes repository root."));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(DiffError::new("We do not support absolute paths."));
            }
        }
    }
    let mut out = repo_dir.to_path_buf();
    for part in stack {
        out.push(part);
    }
    Ok(out)
}

/// Parse and apply a patch against a repository working tree.
/// Returns `"Done!"` on success; on any error the tree is unchanged except
/// for files whose changes were fully written before a later file's IO
/// failure (context failures always happen before the first write).
pub fn process_patch_in_repo(repo_dir: &Path, patch_text: &str) -> DiffResult<String> {
    if !patch_text.starts_with(PATCH_PREFIX) {
        return Err(DiffError::new("Patch must start with *** Begin Patch\n"));
    }

    let mut orig: BTreeMap<String, String> = BTreeMap::new();
    for path in identify_files_needed(patch_text) {
        let abs = resolve_repo_relative(repo_dir, &path)?;
        let content = std::fs::read_to_string(&abs)
            .map_err(|_| DiffError::new(format!("File not found: {path}")))?;
        orig.insert(path, content);
    }
    for path in identify_files_added(patch_text) {
        let abs = resolve_repo_relative(repo_dir, &path)?;
        if abs.exists() {
            return Err(DiffError::new(format!(
                "Add File Error: File already exists: {path}"
            )));
        }
    }

    let (patch, fuzz) = text_to_patch(patch_text, &orig)?;
    if fuzz > 0 {
        debug!("patch applied with fuzz {}", fuzz);
    }
    let commit = patch_to_commit(&patch, &orig)?;

    apply_commit(
        &commit,
        |path, content| {
            let abs = resolve_repo_relative(repo_dir, path)?;
            if let Some(parent) = abs.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DiffError::new(format!("{path}: {e}")))?;
            }
            std::fs::write(&abs, content).map_err(|e| DiffError::new(format!("{path}: {e}")))
        },
        |path| {
            let abs = resolve_repo_relative(repo_dir, path)?;
            std::fs::remove_file(&abs).map_err(|e| DiffError::new(format!("{path}: {e}")))
        },
    )?;

    Ok("Done!".to_string())
}
