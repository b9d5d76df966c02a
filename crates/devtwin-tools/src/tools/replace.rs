//! replace_in_file / replace_region — regex-based targeted edits

use crate::path::resolve_repo_path;
use crate::registry::{Tool, ToolResult};
use regex::RegexBuilder;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

fn build_regex(pattern: &str, flags: &str) -> Result<regex::Regex, regex::Error> {
    let fl = flags.to_lowercase();
    RegexBuilder::new(pattern)
        .case_insensitive(fl.contains('i'))
        .multi_line(fl.contains('m'))
        .dot_matches_new_line(fl.contains('s'))
        .build()
}

pub struct ReplaceInFileTool {
    repo_dir: PathBuf,
}

impl ReplaceInFileTool {
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ReplaceInFileTool {
    fn name(&self) -> &str {
        "replace_in_file"
    }

    fn description(&self) -> &str {
        "Regex-based targeted edit to a file relative to the repository \
         root. Replacement supports capture references like $1. Returns \
         NO_MATCHES when the pattern does not occur."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File relative to the repo root" },
                "pattern": { "type": "string", "description": "Regex pattern" },
                "replacement": { "type": "string", "description": "Replacement text ($1 for groups)" },
                "flags": { "type": "string", "description": "Letters combining [i]gnorecase, [m]ultiline, [s] dotall" },
                "count": { "type": "integer", "description": "Max replacements (default 1, 0 = all)" }
            },
            "required": ["path", "pattern", "replacement"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(path) = args["path"].as_str() else {
            return ToolResult::error("Missing required parameter: path");
        };
        let Some(pattern) = args["pattern"].as_str() else {
            return ToolResult::error("Missing required parameter: pattern");
        };
        let Some(replacement) = args["replacement"].as_str() else {
            return ToolResult::error("Missing required parameter: replacement");
        };
        let flags = args["flags"].as_str().unwrap_or("");
        let count = args["count"].as_u64().unwrap_or(1) as usize;

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

        let regex = match build_regex(pattern, flags) {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("bad regex: {e}")),
        };

        let matches = regex.find_iter(&text).count();
        if matches == 0 {
            return ToolResult::text("NO_MATCHES");
        }
        let limit = if count == 0 { matches } else { count.min(matches) };
        let new_text = regex.replacen(&text, limit, replacement);

        if let Err(e) = fs::write(&resolved, new_text.as_ref()).await {
            return ToolResult::error(format!("could not write {path}: {e}"));
        }
        debug!("replace_in_file: {} x{}", path, limit);
        ToolResult::text(format!("REPLACED {limit} occurrence(s) in {path}"))
    }
}

pub struct ReplaceRegionTool {
    repo_dir: PathBuf,
}

impl ReplaceRegionTool {
    pub fn new(repo_dir: impl AsRef<Path>) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ReplaceRegionTool {
    fn name(&self) -> &str {
        "replace_region"
    }

    fn description(&self) -> &str {
        "Replace the first region between start_pattern and end_pattern. \
         DOTALL is on by default so patterns span newlines. With \
         include_markers=false only the inner span is replaced."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "File relative to the repo root" },
                "start_pattern": { "type": "string", "description": "Regex matching the region start" },
                "end_pattern": { "type": "string", "description": "Regex matching the region end" },
                "replacement": { "type": "string", "description": "Replacement text" },
                "flags": { "type": "string", "description": "Regex flags (default 's')" },
                "include_markers": { "type": "boolean", "description": "Replace the markers too (default true)" }
            },
            "required": ["path", "start_pattern", "end_pattern", "replacement"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(path) = args["path"].as_str() else {
            return ToolResult::error("Missing required parameter: path");
        };
        let Some(start_pattern) = args["start_pattern"].as_str() else {
            return ToolResult::error("Missing required parameter: start_pattern");
        };
        let Some(end_pattern) = args["end_pattern"].as_str() else {
            return ToolResult::error("Missing required parameter: end_pattern");
        };
        let Some(replacement) = args["replacement"].as_str() else {
            return ToolResult::error("Missing required parameter: replacement");
        };
        let flags = args["flags"].as_str().unwrap_or("s");
        let include_markers = args["include_markers"].as_bool().unwrap_or(true);

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

        let start_re = match build_regex(start_pattern, flags) {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("bad start regex: {e}")),
        };
        let end_re = match build_regex(end_pattern, flags) {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("bad end regex: {e}")),
        };

        let Some(start_match) = start_re.find(&text) else {
            return ToolResult::text("NO_START_MATCH");
        };
        let Some(end_match) = end_re.find(&text[start_match.end()..]) else {
            return ToolResult::text("NO_END_MATCH");
        };

        let start_idx = if include_markers {
            start_match.start()
        } else {
            start_match.end()
        };
        let end_idx = start_match.end()
            + if include_markers {
                end_match.end()
            } else {
                end_match.start()
            };

        let new_text = format!("{}{}{}", &text[..start_idx], replacement, &text[end_idx..]);
        if let Err(e) = fs::write(&resolved, &new_text).await {
            return ToolResult::error(format!("could not write {path}: {e}"));
        }
        debug!("replace_region: {}", path);
        ToolResult::text(format!("REPLACED REGION in {path}"))
    }
}
