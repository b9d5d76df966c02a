//! Coder node — full tool set, resumed conversation, transcript persistence

use crate::state::RunState;
use crate::tool_loop::{run_tool_loop, LoopHooks, LoopOptions};
use crate::validation::placeholder_findings;
use devtwin_core::{Iteration, Result, TranscriptEntry};
use devtwin_llm::LlmProvider;
use devtwin_tools::create_default_registry;
use serde_json::json;
use tracing::info;

/// Prior coder history is capped before reuse to bound growth across
/// iterations.
const MAX_RESUMED_MESSAGES: usize = 60;

const CODER_PROMPT: &str = "\
You are an automated coding agent.

Primary objective:
- Make concrete edits that implement the plan and resolve the issue. Prefer minimal, \
incremental edits that keep the app and tests runnable.

Guidelines:
- Act step-by-step. Prefer small, safe changes; use non-interactive flags in shell.
- Always read_file first to verify context before writing; then edit via apply_patch, \
replace_in_file, or write_file.
- Use forward slashes in paths, relative to the repo root. Do not use bare filenames.
- Prefer apply_patch for multi-file edits; fall back to replace_in_file for surgical changes.
- Use note_write to log observations, hypotheses, command attempts, errors, and next \
steps. Call notes_read at the start of a step to recall prior attempts.
- Keep the plan current: mark_in_progress when starting a step, mark_completed when done.

Loop avoidance:
- If read_file returns NOT_FOUND:, do not keep retrying; search/list or create the file.
- After two reads of the same path, take a different action (write, search, or shell).
- If the same shell command fails twice, note the failure and try an adjusted command.

Completion:
- When a coherent increment is implemented (or you are blocked), call finalize with a \
clear commit_message and done: true.";

pub async fn run(state: &mut RunState, provider: &dyn LlmProvider) -> Result<()> {
    let registry = create_default_registry(&state.tool_context());
    let agent_config = state.config.agent("coder");
    let history = state.config.history("coder");

    let notes_recent = state.journal.recent_notes(None, 20);
    let plan = state.plan_store().load();
    let context = json!({
        "issue": {"title": &state.issue.title, "body": &state.issue.body},
        "analysis": &state.analysis,
        "plan": plan,
        "last_test": &state.last_test,
        "transcript_tail": state.transcript.iter().rev().take(4).rev().collect::<Vec<_>>(),
        "notes_recent": notes_recent,
        "write_policy": "Always provide full relative paths with forward slashes when \
            writing files. After reading a few files, perform targeted edits to \
            implement the plan.",
    });

    // Resume the prior conversation so context survives between iterations
    let prior = state.coder_messages.take().map(|mut messages| {
        if messages.len() > MAX_RESUMED_MESSAGES {
            messages.drain(..messages.len() - MAX_RESUMED_MESSAGES);
        }
        messages
    });
    let resuming = prior.is_some();

    let mut options = LoopOptions::new(&state.settings.default_model);
    options.max_steps = agent_config.max_steps;
    options.stop_on_finalize = true;
    options.note_tag = Some("coder".into());
    options.max_history_chars = history.max_history_chars;
    options.keep_last_messages = history.keep_last_messages;
    options.max_tool_result_chars = history.max_tool_result_chars;
    options.repeat_guard = state.config.testing.repeat_guard;
    options.initial_messages = prior;
    if resuming {
        options.extra_user_message =
            Some(json!({"continue": true, "context": context.clone()}).to_string());
    }

    let outcome = run_tool_loop(
        provider,
        &registry,
        &state.journal,
        Some(&state.artifacts_dir),
        &state.config,
        CODER_PROMPT,
        &context.to_string(),
        options,
        &LoopHooks::default(),
    )
    .await;

    let finalize_args = outcome.finalize_args.clone().unwrap_or_default();
    let mut done = finalize_args
        .get("done")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let commit_message = finalize_args
        .get("commit_message")
        .and_then(|v| v.as_str())
        .unwrap_or("dev-twin changes")
        .to_string();

    // The coder's claim is only honored when the plan agrees
    if done && state.plan_store().has_unfinished_steps() {
        done = false;
    }

    let mut iteration = Iteration {
        commit_message,
        done,
    };

    // Suppressed test-runner loops mean no further progress is coming;
    // finalize the partial work instead of burning more iterations.
    if !iteration.done {
        let text = outcome.last_content.to_lowercase();
        if text.contains("skipped_repeat_group") || text.contains("test_runner_suppressed") {
            iteration = Iteration {
                commit_message: "Partial implementation committed; suppressed repeated test \
                                 runs to avoid infinite loop."
                    .into(),
                done: true,
            };
        }
    }

    if outcome.finalize_args.is_some() {
        let findings = placeholder_findings(&state.repo_dir, &state.config);
        for finding in findings {
            state.journal.append_note("placeholder_scan", &finding);
        }
    }

    state.transcript.push(TranscriptEntry {
        input: context,
        output: json!({
            "text": outcome.last_content,
            "finalize": outcome.finalize_args,
            "assistant_messages": outcome.assistant_texts,
        }),
    });
    let transcript_path = state.artifacts_dir.join("transcript.json");
    if let Some(parent) = transcript_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(
        &transcript_path,
        serde_json::to_string_pretty(&state.transcript)?,
    )?;

    state.coder_messages = Some(outcome.messages);
    info!(
        "coder: done={} ({} iterations so far)",
        iteration.done,
        state.transcript.len()
    );
    state.iteration = Some(iteration);
    Ok(())
}
