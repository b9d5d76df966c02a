//! read_file — file contents with optional 1-based inclusive line slicing

use crate::path::resolve_repo_path;
use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub struct ReadFileTool {
    repo_dir: PathBuf,
}

impl ReadFileTool {
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file relative to the repository root. Optional \
         line_start/line_end select a 1-based inclusive slice; otherwise the \
         full content is returned."
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
                    "description": "Path relative to the repository root"
                },
                "line_start": {
                    "type": "integer",
                    "description": "First line to include (1-based)"
                },
                "line_end": {
                    "type": "integer",
                    "description": "Last line to include (1-based, inclusive)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(path) = args["path"].as_str() else {
            return ToolResult::error("Missing required parameter: path");
        };
        let resolved = match resolve_repo_path(&self.repo_dir, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        let text = match fs::read_to_string(&resolved).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ToolResult::text(format!("NOT_FOUND: {path}"));
            }
            Err(e) => return ToolResult::error(format!("failed to read {path}: {e}")),
        };

        let line_start = args["line_start"].as_i64();
        let line_end = args["line_end"].as_i64();
        if line_start.is_none() && line_end.is_none() {
            return ToolResult::text(text);
        }

        let lines: Vec<&str> = text.lines().collect();
        let mut start = line_start.unwrap_or(1).max(1) as usize;
        let mut end = line_end.unwrap_or(lines.len() as i64).max(1) as usize;
        if start > end {
            std::mem::swap(&mut start, &mut end);
        }
        let start0 = (start - 1).min(lines.len());
        let end0 = end.min(lines.len());

        debug!("read_file: {} [{}..{}]", path, start, end);
        ToolResult::text(lines[start0..end0].join("\n"))
    }
}
