//! Shared exclusion globs for listing and search
//!
//! Pruning applied even when a repository carries no .gitignore: VCS
//! metadata, dependency trees, build outputs, caches, and binary or
//! minified assets. Patterns are matched against paths relative to the
//! walk root.

use globset::{Glob, GlobSet, GlobSetBuilder};

/// Directories never descended into, at any depth.
const DIR_GLOBS: &[&str] = &[
    "**/.git",
    "**/.hg",
    "**/.svn",
    "**/node_modules",
    "**/.venv",
    "**/venv",
    "**/dist",
    "**/build",
    "**/target",
    "**/__pycache__",
    "**/.tox",
    "**/.mypy_cache",
];

/// Heavy binary assets skipped by both listing and search.
const BINARY_GLOBS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.pdf", "*.zip", "*.ico",
];

fn build(pattern_sets: &[&[&str]]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for patterns in pattern_sets {
        for pattern in *patterns {
            if let Ok(glob) = Glob::new(pattern) {
                builder.add(glob);
            }
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

pub fn dir_excludes() -> GlobSet {
    build(&[DIR_GLOBS])
}

/// File exclusions for directory listings: binaries plus minified assets.
pub fn listing_excludes() -> GlobSet {
    build(&[BINARY_GLOBS, &["*.min.js", "*.min.css"]])
}

/// File exclusions for content search: binaries, anything minified, and
/// lockfiles.
pub fn search_excludes() -> GlobSet {
    build(&[BINARY_GLOBS, &["*.min.*", "*.lock"]])
}
