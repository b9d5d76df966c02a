//! Artifacts journal — append-only events and notes with regenerated views
//!
//! Every write here is best-effort: a failed journal append must never fail
//! the tool invocation or loop step that triggered it.

use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

const NOTES_FILE: &str = ".devtwin_notes.jsonl";

/// Owns `events.jsonl`, `.devtwin_notes.jsonl`, and the regenerated
/// `notes.md` under one artifacts directory, plus an in-memory mirror of
/// the event stream for graph decisions.
pub struct ArtifactsJournal {
    dir: Option<PathBuf>,
    events: Mutex<Vec<Value>>,
}

impl ArtifactsJournal {
    pub fn new(artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(artifacts_dir.into()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// A journal that only mirrors events in memory. Used by tests and by
    /// loops run without an artifacts directory.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn events_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join("events.jsonl"))
    }

    pub fn notes_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(NOTES_FILE))
    }

    pub fn notes_md_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join("notes.md"))
    }

    /// Snapshot of the in-memory event mirror.
    pub fn events(&self) -> Vec<Value> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Append an event to the mirror and to `events.jsonl`.
    pub fn append_event(&self, event: Value) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        if let Some(path) = self.events_path() {
            let _ = append_jsonl(&path, &event);
        }
    }

    /// Append a note and regenerate the markdown view.
    pub fn append_note(&self, topic: &str, content: &str) {
        let Some(path) = self.notes_path() else {
            return;
        };
        let entry = json!({
            "ts": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            "topic": topic,
            "content": content,
        });
        if append_jsonl(&path, &entry).is_ok() {
            self.regenerate_notes_md();
        }
    }

    /// Record the start of a tool loop for traceability.
    pub fn loop_start(&self, tag: &str) {
        self.append_note("loop_start", &format!("{tag} started"));
    }

    fn regenerate_notes_md(&self) {
        let (Some(notes_path), Some(md_path)) = (self.notes_path(), self.notes_md_path()) else {
            return;
        };
        let Ok(raw) = std::fs::read_to_string(&notes_path) else {
            return;
        };
        let mut lines: Vec<String> = Vec::new();
        for line in raw.lines() {
            let Ok(obj) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            lines.push(format!(
                "- [{}] **{}**: {}",
                obj["ts"].as_str().unwrap_or(""),
                obj["topic"].as_str().unwrap_or(""),
                obj["content"].as_str().unwrap_or(""),
            ));
        }
        let body = if lines.is_empty() {
            "(no notes)".to_string()
        } else {
            lines.join("\n")
        };
        let _ = std::fs::write(&md_path, body);
    }

    /// Auto-note shell outcomes: non-zero exits, and successful installs.
    pub fn note_shell_exit(&self, command: &str, result_text: &str) {
        let Some(code) = parse_exit_code(result_text) else {
            return;
        };
        if code != 0 {
            self.append_note("shell_error", &format!("{command} -> exit {code}"));
        } else if command.contains("npm install") {
            self.append_note("shell_ok", "npm install -> exit 0");
        }
    }

    /// Auto-note missing files surfaced by read_file.
    pub fn maybe_note_read_not_found(&self, tool_name: &str, result_text: &str) {
        if tool_name == "read_file" && result_text.starts_with("NOT_FOUND:") {
            self.append_note("read_not_found", result_text);
        }
    }

    /// Auto-note accepted finalize calls with their commit message.
    pub fn note_finalize(&self, args: &Value) {
        if let Some(cm) = args.get("commit_message").and_then(|v| v.as_str()) {
            if !cm.is_empty() {
                self.append_note("finalize", cm);
            }
        }
    }

    /// Read the newest notes, optionally filtered by topic, most recent last.
    pub fn recent_notes(&self, topic: Option<&str>, limit: usize) -> Vec<String> {
        let Some(path) = self.notes_path() else {
            return Vec::new();
        };
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };
        let mut entries: Vec<String> = Vec::new();
        for line in raw.lines().rev() {
            let Ok(obj) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            if let Some(t) = topic {
                if obj["topic"].as_str() != Some(t) {
                    continue;
                }
            }
            entries.push(format!(
                "[{}] {}: {}",
                obj["ts"].as_str().unwrap_or(""),
                obj["topic"].as_str().unwrap_or(""),
                obj["content"].as_str().unwrap_or(""),
            ));
            if entries.len() >= limit.max(1) {
                break;
            }
        }
        entries.reverse();
        entries
    }
}

fn append_jsonl(path: &Path, value: &Value) -> std::io::Result<()> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{value}")?;
    debug!("journal append: {}", path.display());
    Ok(())
}

/// Extract the exit code from framed shell output (`[exit N]`).
pub fn parse_exit_code(text: &str) -> Option<i32> {
    let re = Regex::new(r"\[exit\s+(-?\d+)\]").expect("static regex");
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn journal() -> (ArtifactsJournal, PathBuf) {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir =
            std::env::temp_dir().join(format!("devtwin-journal-{}-{}", std::process::id(), id));
        std::fs::create_dir_all(&dir).unwrap();
        (ArtifactsJournal::new(&dir), dir)
    }

    #[test]
    fn events_are_mirrored_and_persisted() {
        let (j, dir) = journal();
        j.append_event(json!({"tool": "shell", "args": {"command": "ls"}, "result": "ok"}));
        j.append_event(json!({"type": "assistant", "content": "hi"}));
        assert_eq!(j.event_count(), 2);

        let raw = std::fs::read_to_string(j.events_path().unwrap()).unwrap();
        assert_eq!(raw.lines().count(), 2);
        let first: Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        assert_eq!(first["tool"], "shell");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn notes_regenerate_markdown_view() {
        let (j, dir) = journal();
        j.append_note("test", "first note");
        j.append_note("other", "second note");

        let md = std::fs::read_to_string(j.notes_md_path().unwrap()).unwrap();
        assert!(md.contains("**test**: first note"));
        assert!(md.contains("**other**: second note"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn shell_exit_auto_notes() {
        let (j, dir) = journal();
        j.note_shell_exit("npm test", "$ npm test\n[exit 1]\nboom");
        j.note_shell_exit("npm install", "$ npm install\n[exit 0]\nok");
        let notes = j.recent_notes(None, 10);
        assert!(notes.iter().any(|n| n.contains("shell_error")));
        assert!(notes.iter().any(|n| n.contains("npm install -> exit 0")));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn recent_notes_filters_by_topic_and_limit() {
        let (j, dir) = journal();
        for i in 0..5 {
            j.append_note("a", &format!("note {i}"));
        }
        j.append_note("b", "unrelated");
        let notes = j.recent_notes(Some("a"), 3);
        assert_eq!(notes.len(), 3);
        assert!(notes.last().unwrap().contains("note 4"));
        assert!(notes.iter().all(|n| !n.contains("unrelated")));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn exit_code_parsing() {
        assert_eq!(parse_exit_code("$ ls\n[exit 0]\nfoo"), Some(0));
        assert_eq!(parse_exit_code("[exit 137]"), Some(137));
        assert_eq!(parse_exit_code("no marker"), None);
    }
}
