//! finalize — declare the work complete
//!
//! The loop intercepts this tool and runs the admissibility check before
//! the call ever reaches execute(); this implementation only exists so the
//! tool has a definition to bind.

use crate::registry::{Tool, ToolResult};
use serde_json::{json, Value};

pub struct FinalizeTool;

impl FinalizeTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FinalizeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for FinalizeTool {
    fn name(&self) -> &str {
        "finalize"
    }

    fn description(&self) -> &str {
        "Call this when all necessary changes are complete. If finalize is \
         rejected, read the rejection reason carefully: complete or mark \
         remaining plan steps via plan_update, write a clear commit_message, \
         then call finalize again. Do not repeatedly call finalize with the \
         same issues; address the root cause first."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "commit_message": {
                    "type": "string",
                    "description": "Commit message describing the change"
                },
                "done": {
                    "type": "boolean",
                    "description": "Whether the work is complete (default true)"
                }
            },
            "required": ["commit_message"]
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        ToolResult::text(
            args["commit_message"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        )
    }
}
