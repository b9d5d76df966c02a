//! Setup node — best-effort environment preparation, never gates the graph

use crate::events::summarize_last_test;
use crate::state::RunState;
use crate::tool_loop::{run_tool_loop, LoopHooks, LoopOptions};
use devtwin_core::Result;
use devtwin_llm::LlmProvider;
use devtwin_tools::create_registry;
use serde_json::json;

const SETUP_PROMPT: &str = "\
You prepare the development environment for a coding agent. Tools available: shell, \
list_dir, read_file, search, notes_read, note_write, finalize.

Install dependencies and make the project's tests runnable. Use non-interactive flags \
(--yes, -y, CI=1). Note every command outcome with note_write so later agents can \
reuse what you learned. When the environment is ready (or you are blocked), call \
finalize with a short commit_message describing the state.";

pub async fn run(state: &mut RunState, provider: &dyn LlmProvider) -> Result<()> {
    let names: Vec<String> = [
        "shell",
        "list_dir",
        "read_file",
        "search",
        "notes_read",
        "note_write",
        "finalize",
    ]
    .map(String::from)
    .to_vec();
    let registry = create_registry(&state.tool_context(), &names);
    let agent_config = state.config.agent("setup");
    let history = state.config.history("setup");

    let context = json!({
        "analysis": &state.analysis,
        "transcript_tail": state.transcript.iter().rev().take(4).rev().collect::<Vec<_>>(),
    });

    let mut options = LoopOptions::new(&state.settings.default_model);
    options.max_steps = agent_config.max_steps;
    options.stop_on_finalize = true;
    options.check_plan_completion = false;
    options.note_tag = Some("setup".into());
    options.max_history_chars = history.max_history_chars;
    options.keep_last_messages = history.keep_last_messages;
    options.max_tool_result_chars = history.max_tool_result_chars;
    options.repeat_guard = state.config.testing.repeat_guard;

    run_tool_loop(
        provider,
        &registry,
        &state.journal,
        Some(&state.artifacts_dir),
        &state.config,
        SETUP_PROMPT,
        &context.to_string(),
        options,
        &LoopHooks::default(),
    )
    .await;

    // Surface any test run the setup agent performed for downstream nodes
    if let Some(last_test) = summarize_last_test(&state.journal.events(), None) {
        state.last_test = Some(last_test);
    }
    Ok(())
}
