//! notes_read / note_write — shared developer notes journal

use crate::registry::{Tool, ToolResult};
use devtwin_core::ArtifactsJournal;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct NoteWriteTool {
    journal: Option<Arc<ArtifactsJournal>>,
}

impl NoteWriteTool {
    pub fn new(journal: Option<Arc<ArtifactsJournal>>) -> Self {
        Self { journal }
    }
}

#[async_trait::async_trait]
impl Tool for NoteWriteTool {
    fn name(&self) -> &str {
        "note_write"
    }

    fn description(&self) -> &str {
        "Append a developer note with a topic and free-form content to the \
         shared notes log. Use for observations, hypotheses, command \
         attempts, and outcomes."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": { "type": "string", "description": "Short note topic" },
                "content": { "type": "string", "description": "Free-form note content" }
            },
            "required": ["topic", "content"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(topic) = args["topic"].as_str() else {
            return ToolResult::error("Missing required parameter: topic");
        };
        let Some(content) = args["content"].as_str() else {
            return ToolResult::error("Missing required parameter: content");
        };
        let Some(journal) = &self.journal else {
            return ToolResult::text("NO_ARTIFACTS_DIR");
        };
        journal.append_note(topic, content);
        ToolResult::text(format!("NOTE_ADDED: {topic}"))
    }
}

pub struct NotesReadTool {
    journal: Option<Arc<ArtifactsJournal>>,
}

impl NotesReadTool {
    pub fn new(journal: Option<Arc<ArtifactsJournal>>) -> Self {
        Self { journal }
    }
}

#[async_trait::async_trait]
impl Tool for NotesReadTool {
    fn name(&self) -> &str {
        "notes_read"
    }

    fn description(&self) -> &str {
        "Read recent notes, optionally filtered by topic. Returns up to \
         `limit` most recent entries (default 20)."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": { "type": "string", "description": "Only return notes with this topic" },
                "limit": { "type": "integer", "description": "Max entries to return (default 20)" }
            }
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(journal) = &self.journal else {
            return ToolResult::text("NO_NOTES");
        };
        let exists = journal
            .notes_path()
            .map(|p| p.exists())
            .unwrap_or(false);
        if !exists {
            return ToolResult::text("NO_NOTES");
        }
        let topic = args["topic"].as_str();
        let limit = args["limit"].as_u64().unwrap_or(20) as usize;
        let entries = journal.recent_notes(topic, limit);
        ToolResult::text(entries.join("\n"))
    }
}
