//! Finalize admissibility checks and the advisory placeholder scan

use devtwin_core::{DevtwinConfig, PlanStore, Step};
use regex::RegexBuilder;
use serde_json::Value;
use std::path::Path;
use walkdir::WalkDir;

#[derive(Debug, Default)]
pub struct FinalizeVerdict {
    pub ok: bool,
    pub reasons: Vec<String>,
    pub incomplete_steps: Vec<Step>,
}

impl FinalizeVerdict {
    /// Step ids for the rejection nudge, clipped for readability.
    pub fn incomplete_ids(&self, limit: usize) -> String {
        self.incomplete_steps
            .iter()
            .take(limit)
            .map(|s| s.id.clone())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Validate a finalize request: the commit message must be non-empty, and
/// with plan gating every step must be completed or stuck, with the stuck
/// ratio below the configured threshold. Placeholder findings never gate.
pub fn validate_finalize(
    args: &Value,
    artifacts_dir: Option<&Path>,
    check_plan_completion: bool,
    config: &DevtwinConfig,
) -> FinalizeVerdict {
    let mut verdict = FinalizeVerdict::default();

    let commit_ok = args
        .get("commit_message")
        .and_then(|v| v.as_str())
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    if !commit_ok {
        verdict.reasons.push("missing commit_message".into());
    }

    if check_plan_completion {
        if let Some(dir) = artifacts_dir {
            let store = PlanStore::new(dir);
            if store.exists() {
                let plan = store.load();
                let total = plan.steps.len();
                let stuck = plan
                    .steps
                    .iter()
                    .filter(|s| s.status == devtwin_core::StepStatus::Stuck)
                    .count();
                verdict.incomplete_steps =
                    plan.unsettled_steps().into_iter().cloned().collect();

                if total > 0 && stuck > 0 {
                    let ratio = stuck as f64 / total as f64;
                    if ratio > config.limits.max_stuck_ratio {
                        verdict
                            .reasons
                            .push("too many steps marked as stuck - likely misuse".into());
                    }
                }
                if !verdict.incomplete_steps.is_empty() {
                    verdict.reasons.push("plan has incomplete steps".into());
                }
            }
        }
    }

    verdict.ok = verdict.reasons.is_empty();
    verdict
}

/// Advisory scan for placeholder implementations (TODO/FIXME/XXX and
/// "not implemented"). Reported on accepted finalize, never blocking.
pub fn placeholder_findings(repo_dir: &Path, config: &DevtwinConfig) -> Vec<String> {
    let mut findings = Vec::new();
    let todo_re = RegexBuilder::new(r"TODO|FIXME|XXX")
        .case_insensitive(true)
        .build()
        .expect("static regex");
    let not_impl_re = RegexBuilder::new(r"not implemented")
        .case_insensitive(true)
        .build()
        .expect("static regex");

    let mut todo_count = 0usize;
    let mut not_impl_count = 0usize;
    for entry in WalkDir::new(repo_dir)
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !matches!(
                name.as_ref(),
                "node_modules" | "__pycache__" | ".git" | "dist" | "build" | "target"
            )
        })
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !config
            .file_types
            .source_extensions
            .iter()
            .any(|ext| name.ends_with(ext.as_str()))
        {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        todo_count += todo_re.find_iter(&content).count();
        not_impl_count += not_impl_re.find_iter(&content).count();
    }

    if todo_count > config.limits.max_todo_count {
        findings.push(format!(
            "{todo_count} TODO comments found - implement actual functionality instead of placeholders"
        ));
    }
    if not_impl_count > config.limits.max_not_implemented_count {
        findings.push(format!(
            "{not_impl_count} 'not implemented' markers found - replace placeholder errors with working code"
        ));
    }
    findings
}
