//! Plan store — `plan.json` persistence with status-preserving updates

use crate::error::Result;
use crate::types::{Plan, Step, StepStatus};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Incoming step from `plan_update(steps=...)`. Status is optional: absent
/// means "keep whatever the existing step with this id has".
#[derive(Clone, Debug, serde::Deserialize)]
pub struct StepUpdate {
    pub id: serde_json::Value,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub status: Option<StepStatus>,
}

impl StepUpdate {
    /// Ids are matched stringified, so numeric ids from the model still work.
    pub fn id_string(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// File-backed plan document. Every mutation is a read-modify-write of the
/// whole file; a single concurrent writer is assumed.
#[derive(Clone, Debug)]
pub struct PlanStore {
    path: PathBuf,
}

impl PlanStore {
    pub fn new(artifacts_dir: impl AsRef<Path>) -> Self {
        Self {
            path: artifacts_dir.as_ref().join("plan.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Raw file text, if a plan was persisted.
    pub fn read_text(&self) -> Option<String> {
        std::fs::read_to_string(&self.path).ok()
    }

    /// Load the plan; a missing or unreadable file yields an empty plan.
    pub fn load(&self) -> Plan {
        self.read_text()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    pub fn save(&self, plan: &Plan) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(plan)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    /// Replace the step list. The status of any surviving step id is carried
    /// over (unless the incoming step sets one); new ids start `pending`.
    pub fn set_steps(&self, steps: Vec<StepUpdate>) -> Result<usize> {
        let existing: BTreeMap<String, StepStatus> = self
            .load()
            .steps
            .into_iter()
            .map(|s| (s.id.clone(), s.status))
            .collect();

        let merged: Vec<Step> = steps
            .into_iter()
            .map(|s| {
                let id = s.id_string();
                let status = s
                    .status
                    .or_else(|| existing.get(&id).copied())
                    .unwrap_or(StepStatus::Pending);
                Step {
                    id,
                    description: s.description,
                    rationale: s.rationale,
                    status,
                }
            })
            .collect();

        let count = merged.len();
        self.save(&Plan { steps: merged })?;
        Ok(count)
    }

    pub fn mark_completed(&self, ids: &[String]) -> Result<usize> {
        self.mark(ids, StepStatus::Completed)
    }

    pub fn mark_stuck(&self, ids: &[String]) -> Result<usize> {
        self.mark(ids, StepStatus::Stuck)
    }

    /// Mark one step in-progress, demoting any other in-progress step back
    /// to pending so the single-in-progress invariant holds.
    pub fn mark_in_progress(&self, id: &str) -> Result<usize> {
        let mut plan = self.load();
        let mut updated = 0;
        for step in &mut plan.steps {
            if step.id == id {
                step.status = StepStatus::InProgress;
                updated += 1;
            } else if step.status == StepStatus::InProgress {
                step.status = StepStatus::Pending;
            }
        }
        self.save(&plan)?;
        Ok(updated)
    }

    fn mark(&self, ids: &[String], status: StepStatus) -> Result<usize> {
        let mut plan = self.load();
        let mut updated = 0;
        for step in &mut plan.steps {
            if ids.iter().any(|id| *id == step.id) {
                step.status = status;
                updated += 1;
            }
        }
        self.save(&plan)?;
        Ok(updated)
    }

    /// True when the persisted plan has any step not yet `completed`.
    /// Used by the loop's continuation nudge; stuck counts as unfinished
    /// here, matching the stricter plan-completeness gate.
    pub fn has_unfinished_steps(&self) -> bool {
        if !self.exists() {
            return false;
        }
        self.load()
            .steps
            .iter()
            .any(|s| s.status != StepStatus::Completed)
    }
}
