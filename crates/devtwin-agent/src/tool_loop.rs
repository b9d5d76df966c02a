//! The tool loop — one LLM call plus sequential tool execution, repeated
//!
//! Scheduling is single-threaded and cooperative: tool calls run in
//! emission order, never in parallel. Everything inside the loop is
//! recoverable — provider failures become synthetic assistant turns the
//! model can react to, and tool failures are just result text.

use crate::messages::{
    clip_text, initialize_messages, push_tool_result, remove_last_transient, trim_messages,
};
use crate::repeat::RepeatGuard;
use crate::validation::validate_finalize;
use devtwin_core::{ArtifactsJournal, DevtwinConfig, PlanStore};
use devtwin_llm::{ChatMessage, ChatRequest, LlmProvider, ToolCall};
use devtwin_tools::ToolRegistry;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct LoopOptions {
    pub model: String,
    pub max_steps: usize,
    pub stop_on_finalize: bool,
    pub check_plan_completion: bool,
    pub max_tool_result_chars: usize,
    pub max_history_chars: usize,
    pub keep_last_messages: i64,
    pub note_tag: Option<String>,
    pub repeat_guard: bool,
    pub initial_messages: Option<Vec<ChatMessage>>,
    pub extra_user_message: Option<String>,
}

impl LoopOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_steps: 8,
            stop_on_finalize: false,
            check_plan_completion: true,
            max_tool_result_chars: 4000,
            max_history_chars: 100_000,
            keep_last_messages: 40,
            note_tag: None,
            repeat_guard: true,
            initial_messages: None,
            extra_user_message: None,
        }
    }
}

type StepHook = Box<dyn Fn(usize, usize) + Send + Sync>;
type TextHook = Box<dyn Fn(&str) + Send + Sync>;
type ToolStartHook = Box<dyn Fn(&str, &Value) + Send + Sync>;
type ToolEndHook = Box<dyn Fn(&str, &str) + Send + Sync>;

/// Optional UI callbacks; journal recording happens regardless.
#[derive(Default)]
pub struct LoopHooks {
    pub on_step: Option<StepHook>,
    pub on_assistant: Option<TextHook>,
    pub on_tool_start: Option<ToolStartHook>,
    pub on_tool_end: Option<ToolEndHook>,
}

#[derive(Debug, Default)]
pub struct LoopOutcome {
    pub last_content: String,
    pub messages: Vec<ChatMessage>,
    pub finalize_args: Option<Value>,
    pub assistant_texts: Vec<String>,
}

#[allow(clippy::too_many_arguments)]
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    registry: &ToolRegistry,
    journal: &ArtifactsJournal,
    artifacts_dir: Option<&Path>,
    config: &DevtwinConfig,
    system_prompt: &str,
    user_input: &str,
    mut options: LoopOptions,
    hooks: &LoopHooks,
) -> LoopOutcome {
    if let Some(tag) = &options.note_tag {
        journal.loop_start(tag);
    }

    let mut messages = initialize_messages(
        system_prompt,
        user_input,
        options.initial_messages.take(),
        options.extra_user_message.as_deref(),
    );
    let mut outcome = LoopOutcome::default();
    let mut guard = RepeatGuard::new(options.repeat_guard);
    let plan_store = artifacts_dir.map(PlanStore::new);

    for step_index in 0..options.max_steps {
        if let Some(hook) = &hooks.on_step {
            hook(step_index + 1, options.max_steps);
        }

        // Transient context: latest plan snapshot plus turn accounting,
        // removed again before trimming.
        let plan_text = plan_store.as_ref().and_then(|s| s.read_text());
        let turns_remaining = options.max_steps - step_index - 1;
        let previews: Vec<Value> = messages
            .iter()
            .rev()
            .take(3)
            .rev()
            .map(|m| {
                json!({
                    "type": m.role.clone(),
                    "content_preview": clip_text(&m.text(), 1000),
                })
            })
            .collect();
        journal.append_event(json!({
            "type": "step_input",
            "step": step_index + 1,
            "messages_preview": previews,
            "plan_text": clip_text(plan_text.as_deref().unwrap_or(""), 3000),
            "turns_remaining": turns_remaining,
            "max_steps": options.max_steps,
        }));
        if let Some(plan) = &plan_text {
            messages.push(ChatMessage::user(format!("<plan>\n{plan}\n</plan>")));
        }
        messages.push(ChatMessage::user(format!(
            "<turns>\nstep={}\nremaining={}\nmax={}\n</turns>",
            step_index + 1,
            turns_remaining,
            options.max_steps
        )));

        let request = ChatRequest {
            model: options.model.clone(),
            messages: messages.clone(),
            tools: Some(registry.definitions()),
            max_tokens: Some(8192),
            temperature: None,
            system: None,
        };

        // A provider failure becomes a synthetic assistant turn so the
        // loop keeps running and the model can observe the error.
        let response = match provider.complete(request).await {
            Ok(r) => r,
            Err(e) => {
                let err_text = format!("LLM error: {e}");
                warn!("{}", err_text);
                journal.append_event(json!({
                    "type": "error",
                    "where": "invoke",
                    "message": err_text.clone(),
                }));
                devtwin_llm::ChatResponse {
                    content: err_text,
                    ..Default::default()
                }
            }
        };

        // Tool-call ids must round-trip; synthesize when absent so the
        // announcement and its result always pair up.
        let tool_calls: Vec<ToolCall> = response
            .tool_calls
            .into_iter()
            .map(|mut tc| {
                if tc.id.is_empty() {
                    tc.id = format!("call_{}", Uuid::new_v4().simple());
                }
                tc
            })
            .collect();
        let content = response.content;
        outcome.last_content = content.clone();

        if tool_calls.is_empty() {
            messages.push(ChatMessage::assistant(content.clone()));
        } else {
            messages.push(ChatMessage::assistant_with_tools(&content, &tool_calls));
        }

        if !content.trim().is_empty() {
            outcome.assistant_texts.push(content.clone());
            journal.append_event(json!({
                "type": "assistant",
                "content": content.clone(),
                "has_tool_calls": !tool_calls.is_empty(),
                "step": step_index + 1,
            }));
            if let Some(hook) = &hooks.on_assistant {
                hook(&content);
            }
        }

        if tool_calls.is_empty() {
            remove_last_transient(&mut messages);
            remove_last_transient(&mut messages);
            if !content.trim().is_empty() {
                // Text-only turn: allow chain-of-thought and keep going
                messages =
                    trim_messages(messages, options.keep_last_messages, options.max_history_chars);
                continue;
            }
            let plan_unfinished = options.check_plan_completion
                && plan_store
                    .as_ref()
                    .map(|s| s.has_unfinished_steps())
                    .unwrap_or(false);
            if plan_unfinished {
                messages.push(ChatMessage::user(
                    "Your plan is not yet complete. Please continue with the remaining steps \
                     and call finalize() when all work is done.",
                ));
                messages =
                    trim_messages(messages, options.keep_last_messages, options.max_history_chars);
                continue;
            }
            messages =
                trim_messages(messages, options.keep_last_messages, options.max_history_chars);
            break;
        }

        let mut finished = false;
        for call in &tool_calls {
            if call.name == "finalize" {
                let verdict = validate_finalize(
                    &call.args,
                    artifacts_dir,
                    options.check_plan_completion,
                    config,
                );
                if verdict.ok {
                    push_tool_result(&mut messages, &call.id, &call.args.to_string(), false);
                    journal.append_event(json!({
                        "tool": "finalize",
                        "args": call.args.clone(),
                        "result": "finalize",
                    }));
                    journal.note_finalize(&call.args);
                    outcome.finalize_args = Some(call.args.clone());
                    if options.stop_on_finalize {
                        finished = true;
                        break;
                    }
                } else {
                    let ids = verdict.incomplete_ids(6);
                    let detail = if ids.is_empty() {
                        String::new()
                    } else {
                        format!(" Remaining steps: {ids}")
                    };
                    journal.append_event(json!({
                        "tool": "finalize",
                        "args": call.args.clone(),
                        "result": format!("rejected: {}{}", verdict.reasons.join("; "), detail),
                    }));
                    push_tool_result(&mut messages, &call.id, &call.args.to_string(), false);
                    let mut nudge = String::from(
                        "Your plan is not fully complete or commit_message is missing. Please \
                         complete and mark remaining steps via plan_update, write a clear \
                         commit_message, then call finalize again.",
                    );
                    if !ids.is_empty() {
                        nudge.push_str(&format!(" Incomplete step ids: {ids}."));
                    }
                    messages.push(ChatMessage::user(nudge));
                }
                continue;
            }

            let Some(tool) = registry.get(&call.name) else {
                push_tool_result(
                    &mut messages,
                    &call.id,
                    &format!("Unknown tool {}", call.name),
                    false,
                );
                continue;
            };

            if let Some(hook) = &hooks.on_tool_start {
                hook(&call.name, &call.args);
            }

            let mut result_text = match guard.check(&call.name, &call.args) {
                Some(skipped) => {
                    if skipped.starts_with("SKIPPED_REPEAT_GROUP") {
                        let command = call
                            .args
                            .get("command")
                            .and_then(|v| v.as_str())
                            .unwrap_or("");
                        journal.append_note("test_runner_suppressed", command);
                    }
                    skipped
                }
                None => tool.execute(call.args.clone()).await.to_content_string(),
            };
            guard.annotate(&call.name, &call.args, &mut result_text);

            journal.append_event(json!({
                "tool": call.name.clone(),
                "args": call.args.clone(),
                "result": result_text.clone(),
            }));
            if call.name == "shell" {
                let command = call
                    .args
                    .get("command")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                journal.note_shell_exit(command, &result_text);
            }
            journal.maybe_note_read_not_found(&call.name, &result_text);

            let clipped = clip_text(&result_text, options.max_tool_result_chars);
            push_tool_result(&mut messages, &call.id, &clipped, false);

            if let Some(hook) = &hooks.on_tool_end {
                let preview: String = result_text.chars().take(240).collect();
                hook(&call.name, &preview);
            }
        }

        remove_last_transient(&mut messages);
        remove_last_transient(&mut messages);
        messages = trim_messages(messages, options.keep_last_messages, options.max_history_chars);

        if finished {
            debug!("loop finished via finalize at step {}", step_index + 1);
            break;
        }
    }

    outcome.messages = messages;
    outcome
}
