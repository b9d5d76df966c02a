//! Run configuration — `config/default.json` plus dotted CLI overrides
//!
//! Set once at driver entry and threaded through the run state; nothing in
//! the core mutates it afterwards.

use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct DevtwinConfig {
    pub agents: BTreeMap<String, AgentSettings>,
    pub timeouts: Timeouts,
    pub limits: Limits,
    pub providers: Providers,
    pub docker: DockerConfig,
    pub file_types: FileTypes,
    pub testing: Testing,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_steps: usize,
    pub max_history_chars: Option<usize>,
    pub keep_last_messages: Option<i64>,
    pub max_tool_result_chars: Option<usize>,
    pub tools: BTreeMap<String, ToolToggle>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: 50,
            max_history_chars: None,
            keep_last_messages: None,
            max_tool_result_chars: None,
            tools: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ToolToggle {
    pub enabled: bool,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub default_shell_timeout: u64,
    pub max_shell_timeout: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default_shell_timeout: 60,
            max_shell_timeout: 600,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_history_chars: usize,
    pub keep_last_messages: i64,
    pub default_tool_result_chars: usize,
    pub max_stuck_ratio: f64,
    pub max_todo_count: usize,
    pub max_not_implemented_count: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_history_chars: 100_000,
            keep_last_messages: 40,
            default_tool_result_chars: 4000,
            max_stuck_ratio: 0.6,
            max_todo_count: 10,
            max_not_implemented_count: 3,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Providers {
    pub supported: Vec<String>,
    pub openrouter_base_url: String,
}

impl Default for Providers {
    fn default() -> Self {
        Self {
            supported: vec![
                "google".into(),
                "openai".into(),
                "anthropic".into(),
                "openrouter".into(),
            ],
            openrouter_base_url: "https://openrouter.ai/api/v1".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub workspace_dir: String,
    pub sleep_cmd: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            workspace_dir: "/workspace".into(),
            sleep_cmd: "sleep infinity".into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FileTypes {
    pub source_extensions: Vec<String>,
}

impl Default for FileTypes {
    fn default() -> Self {
        Self {
            source_extensions: vec![
                ".js".into(),
                ".jsx".into(),
                ".ts".into(),
                ".tsx".into(),
                ".py".into(),
                ".rs".into(),
                ".go".into(),
            ],
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Testing {
    pub repeat_guard: bool,
    pub default_test_timeout: u64,
}

impl Default for Testing {
    fn default() -> Self {
        Self {
            repeat_guard: true,
            default_test_timeout: 180,
        }
    }
}

/// Per-agent history budgets, with agent overrides falling back to `limits`.
#[derive(Clone, Copy, Debug)]
pub struct HistorySettings {
    pub max_history_chars: usize,
    pub keep_last_messages: i64,
    pub max_tool_result_chars: usize,
}

impl DevtwinConfig {
    /// Load from a JSON file and apply `key.path=value` overrides.
    pub fn load(path: &Path, overrides: &[String]) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut data: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid JSON in {}: {e}", path.display())))?;
        apply_overrides(&mut data, overrides)?;
        serde_json::from_value(data).map_err(|e| Error::Config(format!("bad config shape: {e}")))
    }

    /// Load an explicit file (must exist), else `config/default.json` when
    /// present, else built-in defaults. Overrides apply in every case.
    pub fn load_or_default(path: Option<&Path>, overrides: &[String]) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path, overrides);
        }
        let default_path = Path::new("config/default.json");
        if default_path.exists() {
            return Self::load(default_path, overrides);
        }
        let mut data = Value::Object(Default::default());
        apply_overrides(&mut data, overrides)?;
        serde_json::from_value(data).map_err(|e| Error::Config(format!("bad config shape: {e}")))
    }

    pub fn agent(&self, name: &str) -> AgentSettings {
        self.agents.get(name).cloned().unwrap_or_default()
    }

    /// Tool names enabled for an agent, in declaration order.
    pub fn enabled_tools(&self, agent: &str) -> Vec<String> {
        self.agent(agent)
            .tools
            .iter()
            .filter(|(_, t)| t.enabled)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn history(&self, agent: &str) -> HistorySettings {
        let a = self.agent(agent);
        HistorySettings {
            max_history_chars: a.max_history_chars.unwrap_or(self.limits.max_history_chars),
            keep_last_messages: a
                .keep_last_messages
                .unwrap_or(self.limits.keep_last_messages),
            max_tool_result_chars: a
                .max_tool_result_chars
                .unwrap_or(self.limits.default_tool_result_chars),
        }
    }
}

/// Apply dotted-key overrides (`agents.unified.max_steps=300`) onto raw JSON.
/// Values autoconvert: bool, then integer, then float, else string.
fn apply_overrides(data: &mut Value, overrides: &[String]) -> Result<()> {
    for raw in overrides {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("override '{raw}' is not key=value")))?;
        let mut cursor = &mut *data;
        let parts: Vec<&str> = key.split('.').collect();
        for part in &parts[..parts.len() - 1] {
            if !cursor.is_object() {
                *cursor = Value::Object(Default::default());
            }
            cursor = cursor
                .as_object_mut()
                .expect("just coerced to object")
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
        }
        let last = parts[parts.len() - 1];
        if !cursor.is_object() {
            *cursor = Value::Object(Default::default());
        }
        cursor
            .as_object_mut()
            .expect("just coerced to object")
            .insert(last.to_string(), convert_scalar(value));
    }
    Ok(())
}

fn convert_scalar(s: &str) -> Value {
    match s {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::from(f);
    }
    Value::from(s)
}
