//! debug_env — diagnostic summary of the working environment

use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub struct DebugEnvTool {
    repo_dir: PathBuf,
}

impl DebugEnvTool {
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for DebugEnvTool {
    fn name(&self) -> &str {
        "debug_env"
    }

    fn description(&self) -> &str {
        "Show the repository path and its top-level contents."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        let mut info = vec![
            format!("Repository directory: {}", self.repo_dir.display()),
            format!("Directory exists: {}", self.repo_dir.exists()),
        ];
        if let Ok(entries) = std::fs::read_dir(&self.repo_dir) {
            let mut listed: Vec<String> = entries
                .flatten()
                .map(|e| {
                    let name = e.file_name().to_string_lossy().into_owned();
                    if e.path().is_dir() {
                        format!("  DIR:  {name}/")
                    } else {
                        format!("  FILE: {name}")
                    }
                })
                .collect();
            listed.sort();
            info.push(format!("Contents ({} items):", listed.len()));
            let total = listed.len();
            info.extend(listed.into_iter().take(10));
            if total > 10 {
                info.push(format!("  ... and {} more items", total - 10));
            }
        }
        ToolResult::text(info.join("\n"))
    }
}
