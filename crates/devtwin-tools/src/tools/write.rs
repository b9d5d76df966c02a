//! write_file — create or overwrite a file, creating parent directories

use crate::path::resolve_repo_path;
use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub struct WriteFileTool {
    repo_dir: PathBuf,
}

impl WriteFileTool {
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write UTF-8 content to a file relative to the repository root, \
         creating parent directories. Always provide a full relative path \
         with forward slashes; backslashes are normalized."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the repository root, forward slashes"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(path) = args["path"].as_str() else {
            return ToolResult::error("Missing required parameter: path");
        };
        let Some(content) = args["content"].as_str() else {
            return ToolResult::error("Missing required parameter: content");
        };

        let normalized = path.replace('\\', "/");
        let resolved = match resolve_repo_path(&self.repo_dir, &normalized) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                return ToolResult::error(format!("could not create parent dirs: {e}"));
            }
        }
        match fs::write(&resolved, content).await {
            Ok(()) => {
                debug!("write_file: {} ({} bytes)", normalized, content.len());
                ToolResult::text(format!("WROTE {} ({} bytes)", normalized, content.len()))
            }
            Err(e) => ToolResult::error(format!("could not write {normalized}: {e}")),
        }
    }
}
