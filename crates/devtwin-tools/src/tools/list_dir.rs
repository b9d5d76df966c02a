//! list_dir — recursive listing that respects repository ignore rules

use crate::path::resolve_repo_path;
use crate::registry::{Tool, ToolResult};
use crate::walk;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ListDirTool {
    repo_dir: PathBuf,
}

impl ListDirTool {
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List files under a directory relative to the repository root, \
         honoring .gitignore and pruning build outputs and caches."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory relative to the repository root (default '.')"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let rel = args["path"].as_str().unwrap_or(".");
        let base = match resolve_repo_path(&self.repo_dir, rel) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        if !base.exists() {
            return ToolResult::text(String::new());
        }
        if base.is_file() {
            return ToolResult::text(
                base.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
        }

        let dir_excludes = walk::dir_excludes();
        let file_excludes = walk::listing_excludes();
        let filter_base = base.clone();
        let mut entries: Vec<String> = Vec::new();
        let walker = ignore::WalkBuilder::new(&base)
            .hidden(false)
            .filter_entry(move |entry| {
                let rel_path = entry
                    .path()
                    .strip_prefix(&filter_base)
                    .unwrap_or_else(|_| entry.path());
                !dir_excludes.is_match(rel_path)
            })
            .build();
        for entry in walker.flatten() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let Ok(rel_path) = entry.path().strip_prefix(&base) else {
                continue;
            };
            if file_excludes.is_match(rel_path) {
                continue;
            }
            entries.push(rel_path.to_string_lossy().replace('\\', "/"));
        }
        entries.sort();

        debug!("list_dir: {} -> {} entries", rel, entries.len());
        ToolResult::text(entries.join("\n"))
    }
}
