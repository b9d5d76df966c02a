//! apply_patch — multi-file patch application via devtwin-patch

use crate::registry::{Tool, ToolResult};
use devtwin_patch::{identify_files_needed, process_patch_in_repo};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct ApplyPatchTool {
    repo_dir: PathBuf,
}

impl ApplyPatchTool {
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ApplyPatchTool {
    fn name(&self) -> &str {
        "apply_patch"
    }

    fn description(&self) -> &str {
        "Apply a multi-file patch to the repository. Input must start with \
         '*** Begin Patch' and end with '*** End Patch'; paths must be \
         relative. Returns 'Done!' on success or an ERROR: string."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "patch_text": {
                    "type": "string",
                    "description": "Full patch text including the Begin/End envelope"
                }
            },
            "required": ["patch_text"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(patch_text) = args["patch_text"].as_str() else {
            return ToolResult::error("Missing required parameter: patch_text");
        };

        if !patch_text.trim_start().starts_with("*** Begin Patch") {
            return ToolResult::error(
                "Patch must start with '*** Begin Patch' and end with '*** End Patch'.\n\
                 Tips: make smaller patches (5-10 lines), read the file right before \
                 patching, and use exact context.\n\
                 Fallback: use replace_in_file or replace_region for targeted edits.",
            );
        }

        // Check Update targets up front so the model gets a listing of what
        // actually exists next to a mistyped path.
        for path in identify_files_needed(patch_text) {
            let is_update = patch_text
                .lines()
                .any(|l| l == format!("*** Update File: {path}"));
            if !is_update {
                continue;
            }
            let full = self.repo_dir.join(&path);
            if full.exists() {
                continue;
            }
            let listing = full
                .parent()
                .filter(|p| p.exists())
                .and_then(|p| p.read_dir().ok())
                .map(|entries| {
                    entries
                        .flatten()
                        .filter(|e| e.path().is_file())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join(", ")
                });
            return ToolResult::error(match listing {
                Some(files) => format!(
                    "File not found: {path}. Files in the same directory: [{files}]"
                ),
                None => format!(
                    "File not found: {path}.\nTip: verify the relative path and use forward slashes."
                ),
            });
        }

        match process_patch_in_repo(&self.repo_dir, patch_text) {
            Ok(done) => {
                debug!("apply_patch: ok");
                ToolResult::text(done)
            }
            Err(e) => {
                let msg = e.to_string();
                let mut out = format!("Patch format error: {msg}");
                if msg.contains("Invalid Context") || msg.contains("Invalid EOF Context") {
                    out.push_str(
                        "\n\nSuggestions:\n\
                         - File changed or context drifted. Read the file again immediately before patching.\n\
                         - Use smaller hunks (5-10 lines) with exact surrounding context.\n\
                         - Avoid non-ASCII punctuation in context; prefer plain ASCII.\n\
                         - Fall back to replace_in_file or replace_region for surgical changes.",
                    );
                }
                ToolResult::error(out)
            }
        }
    }
}
