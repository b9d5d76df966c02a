//! plan_read / plan_update — plan document access for the LLM

use crate::registry::{Tool, ToolResult};
use devtwin_core::{PlanStore, StepUpdate};
use serde_json::{json, Value};

pub struct PlanReadTool {
    store: Option<PlanStore>,
}

impl PlanReadTool {
    pub fn new(store: Option<PlanStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Tool for PlanReadTool {
    fn name(&self) -> &str {
        "plan_read"
    }

    fn description(&self) -> &str {
        "Read the current plan JSON and return its text. Returns NO_PLAN if \
         no plan exists yet."
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value) -> ToolResult {
        match &self.store {
            Some(store) => match store.read_text() {
                Some(text) => ToolResult::text(text),
                None => ToolResult::text("NO_PLAN"),
            },
            None => ToolResult::text("NO_PLAN"),
        }
    }
}

pub struct PlanUpdateTool {
    store: Option<PlanStore>,
}

impl PlanUpdateTool {
    pub fn new(store: Option<PlanStore>) -> Self {
        Self { store }
    }
}

fn id_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

#[async_trait::async_trait]
impl Tool for PlanUpdateTool {
    fn name(&self) -> &str {
        "plan_update"
    }

    fn description(&self) -> &str {
        "Create or update the plan. Pass steps=[{id, description, rationale}] \
         to (re)create it; statuses of existing ids are preserved. Use \
         mark_completed=[ids], mark_stuck=[ids], or mark_in_progress=id to \
         update statuses. mark_in_progress demotes any other in-progress \
         step. Use 'stuck' only when blocked by tooling or environment \
         factors, never for core implementation work."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "steps": {
                    "type": "array",
                    "description": "Full step list: objects with id, description, optional rationale and status",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": { "type": "string" },
                            "description": { "type": "string" },
                            "rationale": { "type": "string" },
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed", "stuck"]
                            }
                        },
                        "required": ["id", "description"]
                    }
                },
                "mark_completed": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Step ids to mark completed"
                },
                "mark_in_progress": {
                    "type": "string",
                    "description": "Single step id to mark in_progress"
                },
                "mark_stuck": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Step ids to mark stuck (last resort)"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(store) = &self.store else {
            return ToolResult::text("NO_ARTIFACTS_DIR");
        };

        if let Some(raw_steps) = args.get("steps").filter(|v| v.is_array()) {
            let steps: Vec<StepUpdate> = match serde_json::from_value(raw_steps.clone()) {
                Ok(s) => s,
                Err(e) => return ToolResult::error(format!("bad steps payload: {e}")),
            };
            return match store.set_steps(steps) {
                Ok(n) => ToolResult::text(format!("PLAN_CREATED with {n} steps")),
                Err(e) => ToolResult::error(format!("could not write plan: {e}")),
            };
        }

        let mut updated = 0;
        if let Some(ids) = args.get("mark_completed") {
            match store.mark_completed(&id_list(ids)) {
                Ok(n) => updated += n,
                Err(e) => return ToolResult::error(format!("could not write plan: {e}")),
            }
        }
        if let Some(ids) = args.get("mark_stuck") {
            match store.mark_stuck(&id_list(ids)) {
                Ok(n) => updated += n,
                Err(e) => return ToolResult::error(format!("could not write plan: {e}")),
            }
        }
        if let Some(id) = args.get("mark_in_progress").and_then(|v| v.as_str()) {
            match store.mark_in_progress(id) {
                Ok(n) => updated += n,
                Err(e) => return ToolResult::error(format!("could not write plan: {e}")),
            }
        }
        ToolResult::text(format!("PLAN_UPDATED {updated} step(s)"))
    }
}
