//! Unified node — the single-agent path with the full configurable tool set

use crate::events::summarize_last_test;
use crate::state::RunState;
use crate::tool_loop::{run_tool_loop, LoopHooks, LoopOptions};
use crate::validation::placeholder_findings;
use devtwin_core::{Iteration, Result, TranscriptEntry};
use devtwin_llm::LlmProvider;
use devtwin_tools::create_registry;
use serde_json::json;
use tracing::info;

const UNIFIED_BASE_PROMPT: &str = "\
You are an autonomous software engineer resolving one issue end to end: understand \
the repository, plan, implement, and verify.

Available tools:
- {AVAILABLE_TOOLS}

Working style:
- Replace a generic plan with a specific 4-7 step plan using plan_update(steps=[...]) \
before coding, then keep statuses current (mark_in_progress, mark_completed).
- Send brief text updates (8-12 words) before tool calls connecting prior work to \
next actions.
- Read before you write; prefer small, verifiable increments; run the tests after \
meaningful changes.
{PATCH_GUIDANCE}
Completion:
- Call finalize(commit_message, done=true) only when the plan is complete and tests \
pass (or are impossible to run). If finalize is rejected, fix the listed steps first.";

const PATCH_GUIDANCE: &str = "\
- Prefer apply_patch for multi-file edits, with this exact format:
```
*** Begin Patch
*** Update File: path/to/file.py
@@ optional hunk anchor
 context line
-removed line
+added line
 more context
*** End Patch
```
Patch practices: read_file immediately before patching, keep hunks to 5-10 lines, \
use exact whitespace, apply one section at a time, and on failure re-read the file \
and try a smaller hunk or replace_in_file.
";

fn build_prompt(state: &RunState, enabled: &[String]) -> String {
    let tool_lines = enabled
        .iter()
        .map(|name| {
            let description = state
                .config
                .agent("unified")
                .tools
                .get(name)
                .and_then(|t| t.description.clone())
                .unwrap_or_default();
            format!("**{name}**{description}")
        })
        .collect::<Vec<_>>()
        .join("\n- ");
    let patch_guidance = if enabled.iter().any(|n| n == "apply_patch") {
        PATCH_GUIDANCE
    } else {
        ""
    };
    UNIFIED_BASE_PROMPT
        .replace("{AVAILABLE_TOOLS}", &tool_lines)
        .replace("{PATCH_GUIDANCE}", patch_guidance)
}

pub async fn run(state: &mut RunState, provider: &dyn LlmProvider) -> Result<()> {
    let enabled = state.config.enabled_tools("unified");
    let registry = create_registry(&state.tool_context(), &enabled);
    let agent_config = state.config.agent("unified");
    let history = state.config.history("unified");
    let prompt = build_prompt(state, &enabled);

    let context = json!({
        "issue": {"title": &state.issue.title, "body": &state.issue.body},
        "analysis": &state.analysis,
        "last_test": &state.last_test,
        "write_policy": "Use forward slashes and full relative paths. Prefer \
            apply_patch for multi-file edits.",
    });

    let mut options = LoopOptions::new(&state.settings.default_model);
    options.max_steps = agent_config.max_steps;
    options.stop_on_finalize = true;
    options.check_plan_completion = true;
    options.note_tag = Some("unified".into());
    options.max_history_chars = history.max_history_chars;
    options.keep_last_messages = history.keep_last_messages;
    options.max_tool_result_chars = history.max_tool_result_chars;
    options.repeat_guard = state.config.testing.repeat_guard;

    let outcome = run_tool_loop(
        provider,
        &registry,
        &state.journal,
        Some(&state.artifacts_dir),
        &state.config,
        &prompt,
        &context.to_string(),
        options,
        &LoopHooks::default(),
    )
    .await;

    let finalize_args = outcome.finalize_args.clone().unwrap_or_default();
    let done = finalize_args
        .get("done")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let commit_message = finalize_args
        .get("commit_message")
        .and_then(|v| v.as_str())
        .unwrap_or("dev-twin unified changes")
        .to_string();

    if outcome.finalize_args.is_some() {
        for finding in placeholder_findings(&state.repo_dir, &state.config) {
            state.journal.append_note("placeholder_scan", &finding);
        }
    }

    state.reload_plan();
    if let Some(last_test) = summarize_last_test(&state.journal.events(), Some(&state.artifacts_dir))
    {
        state.last_test = Some(last_test);
    }

    state.transcript.push(TranscriptEntry {
        input: context,
        output: json!({
            "finalize": outcome.finalize_args,
            "preview": outcome.last_content,
            "assistant_messages": outcome.assistant_texts,
        }),
    });

    info!("unified: done={}", done);
    state.iteration = Some(Iteration {
        commit_message,
        done,
    });
    Ok(())
}
