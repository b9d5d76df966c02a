//! Run-state data model: issue, plan, analysis, iteration records

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Problem statement handed to a run (a GitHub issue or a benchmark case).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Issue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

/// Step lifecycle. At most one step may be `in_progress` at a time; the
/// plan store enforces this by demoting the previous one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Stuck,
}

impl StepStatus {
    /// Finalization treats both completed and stuck steps as settled.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Stuck)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default)]
    pub status: StepStatus,
}

impl Step {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            rationale: None,
            status: StepStatus::Pending,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Plan {
    /// True when every step reached `completed`. Stuck steps do NOT count
    /// here; they only satisfy the finalize validator.
    pub fn all_completed(&self) -> bool {
        self.steps
            .iter()
            .all(|s| s.status == StepStatus::Completed)
    }

    /// Steps that are neither completed nor stuck.
    pub fn unsettled_steps(&self) -> Vec<&Step> {
        self.steps
            .iter()
            .filter(|s| !s.status.is_settled())
            .collect()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TestStrategy {
    #[serde(default)]
    pub runner: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Inferred project facts, written once by the analysis node.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Analysis {
    pub project_type: String,
    pub build_commands: Vec<String>,
    pub test_commands: Vec<String>,
    pub run_commands: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile_suggested: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relevant_files: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lint_commands: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_strategy: Option<TestStrategy>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// Summary of the most recent test-looking shell invocation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LastTest {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    pub preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_failed_nodeid: Option<String>,
}

/// The coder's claim about the iteration. The graph may override `done`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Iteration {
    pub commit_message: String,
    pub done: bool,
}

/// Optional containerized execution target for shell commands.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DockerTarget {
    pub container_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
}

/// One coder iteration in `transcript.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub input: Value,
    pub output: Value,
}

/// Final run verdict written to `summary.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Summary {
    pub status: String,
    pub commit_message: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Summary {
    pub fn new(done: bool, commit_message: impl Into<String>) -> Self {
        Self {
            status: if done { "success" } else { "incomplete" }.to_string(),
            commit_message: commit_message.into(),
            extra: BTreeMap::new(),
        }
    }
}
