//! search — bounded regex file search with ignore-rule awareness

use crate::path::resolve_repo_path;
use crate::registry::{Tool, ToolResult};
use crate::walk;
use regex::Regex;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

const MAX_RESULTS: usize = 200;
const MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

pub struct SearchTool {
    repo_dir: PathBuf,
}

impl SearchTool {
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search files for a regex pattern relative to the repository root. \
         Honors .gitignore, skips binaries and large files, and returns up \
         to 200 matches as path:line:content."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory relative to the repo root (default '.')"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(pattern) = args["pattern"].as_str() else {
            return ToolResult::error("Missing required parameter: pattern");
        };
        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("invalid regex: {e}")),
        };
        let rel = args["path"].as_str().unwrap_or(".");
        let base = match resolve_repo_path(&self.repo_dir, rel) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        let mut results: Vec<String> = Vec::new();
        if base.is_file() {
            search_one(&base, &base, &regex, &mut results);
        } else {
            let dir_excludes = walk::dir_excludes();
            let file_excludes = walk::search_excludes();
            let filter_base = base.clone();
            let walker = ignore::WalkBuilder::new(&base)
                .hidden(true)
                .max_filesize(Some(MAX_FILE_SIZE))
                .filter_entry(move |entry| {
                    let rel_path = entry
                        .path()
                        .strip_prefix(&filter_base)
                        .unwrap_or_else(|_| entry.path());
                    !dir_excludes.is_match(rel_path)
                })
                .build();
            for entry in walker.flatten() {
                if results.len() >= MAX_RESULTS {
                    break;
                }
                if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    continue;
                }
                let rel_path = entry
                    .path()
                    .strip_prefix(&base)
                    .unwrap_or_else(|_| entry.path());
                if file_excludes.is_match(rel_path) {
                    continue;
                }
                search_one(entry.path(), &base, &regex, &mut results);
            }
        }
        results.truncate(MAX_RESULTS);

        debug!("search: '{}' -> {} matches", pattern, results.len());
        ToolResult::text(results.join("\n"))
    }
}

fn search_one(path: &Path, base: &Path, regex: &Regex, results: &mut Vec<String>) {
    let Ok(bytes) = std::fs::read(path) else {
        return;
    };
    // Skip binary files
    if bytes.iter().take(512).any(|b| *b == 0) {
        return;
    }
    let content = String::from_utf8_lossy(&bytes);
    let rel = path.strip_prefix(base).unwrap_or(path);
    for (i, line) in content.lines().enumerate() {
        if regex.is_match(line) {
            results.push(format!(
                "{}:{}:{}",
                rel.to_string_lossy().replace('\\', "/"),
                i + 1,
                line
            ));
            if results.len() >= MAX_RESULTS {
                return;
            }
        }
    }
}
