//! Tests for devtwin-agent: the tool loop protocol, finalize gating, and
//! graph decisions, driven by a deterministic scripted provider

use devtwin_agent::graph::{after_test_lint, Decision, Workflow};
use devtwin_agent::{nodes, run_tool_loop, LoopHooks, LoopOptions, RunState};
use devtwin_core::{
    ArtifactsJournal, DevtwinConfig, Issue, LastTest, PlanStore, Provider, Settings, StepUpdate,
};
use devtwin_llm::{ChatRequest, ChatResponse, LlmProvider, ToolCall};
use devtwin_tools::{create_default_registry, ToolContext};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Deterministic LLM double: each complete() pops the next behavior.
enum Scripted {
    Text(String),
    Tools(Vec<(&'static str, Value)>),
    Fail(String),
}

struct ScriptedProvider {
    script: Mutex<Vec<Scripted>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script),
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        _request: ChatRequest,
    ) -> Result<ChatResponse, devtwin_llm::LlmError> {
        let behavior = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Scripted::Text(String::new())
            } else {
                script.remove(0)
            }
        };
        match behavior {
            Scripted::Text(content) => Ok(ChatResponse {
                content,
                ..Default::default()
            }),
            Scripted::Tools(calls) => Ok(ChatResponse {
                tool_calls: calls
                    .into_iter()
                    .enumerate()
                    .map(|(i, (name, args))| ToolCall {
                        id: format!("call_{i}"),
                        name: name.to_string(),
                        args,
                    })
                    .collect(),
                ..Default::default()
            }),
            Scripted::Fail(message) => Err(devtwin_llm::LlmError::RequestFailed(message)),
        }
    }
}

fn workspace() -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "devtwin-agent-test-{}-{}",
        std::process::id(),
        id
    ));
    std::fs::create_dir_all(dir.join("repo")).unwrap();
    std::fs::create_dir_all(dir.join("artifacts")).unwrap();
    dir
}

fn cleanup(dir: &Path) {
    let _ = std::fs::remove_dir_all(dir);
}

fn upd(id: &str) -> StepUpdate {
    serde_json::from_value(json!({"id": id, "description": id})).unwrap()
}

fn tool_result_contents(message: &devtwin_llm::ChatMessage) -> Vec<String> {
    match &message.content {
        devtwin_llm::MessageContent::Blocks(blocks) => blocks
            .iter()
            .filter_map(|b| match b {
                devtwin_llm::ContentBlock::ToolResult { content, .. } => Some(content.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn test_settings() -> Settings {
    Settings {
        provider: Provider::Anthropic,
        api_key: "test-key".into(),
        default_model: "test-model".into(),
        base_url: None,
        workdir: PathBuf::from(".devtwin_work"),
        github_token: None,
        repo_url: None,
    }
}

fn loop_fixtures(ws: &Path) -> (ToolContext, ArtifactsJournal, DevtwinConfig) {
    let artifacts = ws.join("artifacts");
    let journal = ArtifactsJournal::new(&artifacts);
    let config = DevtwinConfig::default();
    let ctx = ToolContext::new(ws.join("repo"), config.clone())
        .with_artifacts(&artifacts)
        .with_journal(std::sync::Arc::new(ArtifactsJournal::new(&artifacts)));
    (ctx, journal, config)
}

fn options(max_steps: usize) -> LoopOptions {
    let mut options = LoopOptions::new("test-model");
    options.max_steps = max_steps;
    options.stop_on_finalize = true;
    options
}

// ===========================================================================
// Finalize gating
// ===========================================================================

#[tokio::test]
async fn incomplete_plan_rejects_finalize_then_accepts() {
    let ws = workspace();
    let artifacts = ws.join("artifacts");
    let store = PlanStore::new(&artifacts);
    store.set_steps(vec![upd("a"), upd("b")]).unwrap();

    let (ctx, journal, config) = loop_fixtures(&ws);
    let registry = create_default_registry(&ctx);
    let provider = ScriptedProvider::new(vec![
        Scripted::Tools(vec![(
            "finalize",
            json!({"commit_message": "x", "done": true}),
        )]),
        Scripted::Tools(vec![(
            "plan_update",
            json!({"mark_completed": ["a", "b"]}),
        )]),
        Scripted::Tools(vec![(
            "finalize",
            json!({"commit_message": "x", "done": true}),
        )]),
    ]);

    let outcome = run_tool_loop(
        &provider,
        &registry,
        &journal,
        Some(&artifacts),
        &config,
        "finish the work",
        "input",
        options(8),
        &LoopHooks::default(),
    )
    .await;

    // Second finalize accepted
    assert_eq!(
        outcome.finalize_args,
        Some(json!({"commit_message": "x", "done": true}))
    );

    // First finalize was rejected with the incomplete ids, and a nudge was
    // appended rather than dropping the tool message
    let events = journal.events();
    let rejected = events
        .iter()
        .find(|e| {
            e["tool"] == "finalize"
                && e["result"]
                    .as_str()
                    .map(|r| r.starts_with("rejected:"))
                    .unwrap_or(false)
        })
        .expect("rejection event");
    let result = rejected["result"].as_str().unwrap();
    assert!(result.contains("a, b"), "got: {result}");

    let nudged = outcome.messages.iter().any(|m| {
        m.role == "user" && m.text().contains("Incomplete step ids: a, b")
    });
    assert!(nudged, "nudge message should list incomplete steps");
    cleanup(&ws);
}

#[tokio::test]
async fn empty_commit_message_rejected_even_with_complete_plan() {
    let ws = workspace();
    let artifacts = ws.join("artifacts");
    let store = PlanStore::new(&artifacts);
    store.set_steps(vec![upd("a")]).unwrap();
    store.mark_completed(&["a".into()]).unwrap();

    let (ctx, journal, config) = loop_fixtures(&ws);
    let registry = create_default_registry(&ctx);
    let provider = ScriptedProvider::new(vec![Scripted::Tools(vec![(
        "finalize",
        json!({"commit_message": "  ", "done": true}),
    )])]);

    let outcome = run_tool_loop(
        &provider,
        &registry,
        &journal,
        Some(&artifacts),
        &config,
        "p",
        "i",
        options(2),
        &LoopHooks::default(),
    )
    .await;
    assert!(outcome.finalize_args.is_none());
    cleanup(&ws);
}

// ===========================================================================
// Loop protocol
// ===========================================================================

#[tokio::test]
async fn provider_error_becomes_synthetic_assistant_turn() {
    let ws = workspace();
    let (ctx, journal, config) = loop_fixtures(&ws);
    let registry = create_default_registry(&ctx);
    let provider = ScriptedProvider::new(vec![
        Scripted::Fail("connection reset".into()),
        Scripted::Text("recovered".into()),
    ]);

    let outcome = run_tool_loop(
        &provider,
        &registry,
        &journal,
        None,
        &config,
        "p",
        "i",
        options(3),
        &LoopHooks::default(),
    )
    .await;

    let events = journal.events();
    assert!(events
        .iter()
        .any(|e| e["type"] == "error" && e["where"] == "invoke"));
    // The loop continued past the failure
    assert!(outcome.assistant_texts.iter().any(|t| t == "recovered"));
    cleanup(&ws);
}

#[tokio::test]
async fn unknown_tool_yields_tool_message_not_crash() {
    let ws = workspace();
    let (ctx, journal, config) = loop_fixtures(&ws);
    let registry = create_default_registry(&ctx);
    let provider = ScriptedProvider::new(vec![
        Scripted::Tools(vec![("bogus_tool", json!({}))]),
        Scripted::Text("moving on".into()),
    ]);

    let outcome = run_tool_loop(
        &provider,
        &registry,
        &journal,
        None,
        &config,
        "p",
        "i",
        options(3),
        &LoopHooks::default(),
    )
    .await;
    let saw_unknown = outcome
        .messages
        .iter()
        .filter(|m| m.has_tool_result())
        .any(|m| tool_result_contents(m).iter().any(|c| c.contains("Unknown tool bogus_tool")));
    assert!(saw_unknown);
    cleanup(&ws);
}

#[tokio::test]
async fn assistant_event_precedes_tool_events() {
    let ws = workspace();
    let (ctx, journal, config) = loop_fixtures(&ws);
    let registry = create_default_registry(&ctx);
    // Emits text alongside the tool call in the same turn
    struct TextAndTool;
    #[async_trait::async_trait]
    impl LlmProvider for TextAndTool {
        fn name(&self) -> &str {
            "scripted"
        }
        async fn complete(
            &self,
            _request: ChatRequest,
        ) -> Result<ChatResponse, devtwin_llm::LlmError> {
            Ok(ChatResponse {
                content: "running a command".into(),
                tool_calls: vec![ToolCall {
                    id: "c1".into(),
                    name: "shell".into(),
                    args: json!({"command": "echo ordered"}),
                }],
                ..Default::default()
            })
        }
    }
    let provider = TextAndTool;

    run_tool_loop(
        &provider,
        &registry,
        &journal,
        None,
        &config,
        "p",
        "i",
        options(1),
        &LoopHooks::default(),
    )
    .await;

    let events = journal.events();
    let assistant_idx = events
        .iter()
        .position(|e| e["type"] == "assistant")
        .expect("assistant event");
    let shell_idx = events
        .iter()
        .position(|e| e["tool"] == "shell")
        .expect("shell event");
    assert!(assistant_idx < shell_idx);
    assert!(events[assistant_idx]["has_tool_calls"].as_bool().unwrap());
    cleanup(&ws);
}

#[tokio::test]
async fn history_stays_within_budget() {
    let ws = workspace();
    let (ctx, journal, config) = loop_fixtures(&ws);
    let registry = create_default_registry(&ctx);

    // Repeatedly read a large file to inflate tool results
    std::fs::write(ws.join("repo/big.txt"), "line\n".repeat(2000)).unwrap();
    let script: Vec<Scripted> = (0..6)
        .map(|i| {
            Scripted::Tools(vec![(
                "read_file",
                json!({"path": "big.txt", "line_start": 1, "line_end": 1500 + i}),
            )])
        })
        .collect();
    let provider = ScriptedProvider::new(script);

    let mut opts = options(6);
    opts.max_history_chars = 8000;
    opts.keep_last_messages = 40;
    opts.max_tool_result_chars = 4000;

    let outcome = run_tool_loop(
        &provider,
        &registry,
        &journal,
        None,
        &config,
        "p",
        "i",
        opts,
        &LoopHooks::default(),
    )
    .await;

    let total: usize = outcome.messages.iter().map(|m| m.content_len()).sum();
    assert!(
        total <= 8000 || outcome.messages.len() <= 2,
        "history budget exceeded: {total} chars in {} messages",
        outcome.messages.len()
    );
    cleanup(&ws);
}

#[tokio::test]
async fn empty_turn_with_incomplete_plan_gets_nudge() {
    let ws = workspace();
    let artifacts = ws.join("artifacts");
    PlanStore::new(&artifacts)
        .set_steps(vec![upd("pending-step")])
        .unwrap();

    let (ctx, journal, config) = loop_fixtures(&ws);
    let registry = create_default_registry(&ctx);
    let provider = ScriptedProvider::new(vec![
        Scripted::Text(String::new()),
        Scripted::Text("back to work".into()),
    ]);

    let outcome = run_tool_loop(
        &provider,
        &registry,
        &journal,
        Some(&artifacts),
        &config,
        "p",
        "i",
        options(3),
        &LoopHooks::default(),
    )
    .await;
    let nudged = outcome
        .messages
        .iter()
        .any(|m| m.text().contains("plan is not yet complete"));
    assert!(nudged);
    cleanup(&ws);
}

// ===========================================================================
// Repetition guard
// ===========================================================================

#[tokio::test]
async fn repeated_test_runner_is_suppressed() {
    let ws = workspace();
    let (ctx, journal, config) = loop_fixtures(&ws);
    let registry = create_default_registry(&ctx);
    let provider = ScriptedProvider::new(vec![
        Scripted::Tools(vec![("shell", json!({"command": "npm test"}))]),
        Scripted::Tools(vec![("shell", json!({"command": "npm test -s"}))]),
        Scripted::Tools(vec![("shell", json!({"command": "npx jest"}))]),
    ]);

    run_tool_loop(
        &provider,
        &registry,
        &journal,
        None,
        &config,
        "p",
        "i",
        options(3),
        &LoopHooks::default(),
    )
    .await;

    let events = journal.events();
    let shell_results: Vec<&str> = events
        .iter()
        .filter(|e| e["tool"] == "shell")
        .filter_map(|e| e["result"].as_str())
        .collect();
    assert_eq!(shell_results.len(), 3);
    assert!(
        shell_results[2].starts_with("SKIPPED_REPEAT_GROUP: TEST_RUNNER"),
        "got: {}",
        shell_results[2]
    );
    cleanup(&ws);
}

// ===========================================================================
// Graph gates
// ===========================================================================

fn graph_state(ws: &Path) -> RunState {
    RunState::new(
        test_settings(),
        DevtwinConfig::default(),
        Issue {
            number: Some(1),
            title: "fix".into(),
            body: "body".into(),
            labels: vec![],
        },
        ws.join("repo"),
        ws.join("artifacts"),
    )
}

#[tokio::test]
async fn green_tests_and_complete_plan_end_the_graph() {
    let ws = workspace();
    let mut state = graph_state(&ws);

    let store = state.plan_store();
    store.set_steps(vec![upd("a")]).unwrap();
    store.mark_completed(&["a".into()]).unwrap();
    state.reload_plan();
    state.last_test = Some(LastTest {
        command: "npm test".into(),
        exit_code: Some(0),
        ok: Some(true),
        preview: String::new(),
        details_path: None,
        first_failed_nodeid: None,
    });

    assert_eq!(after_test_lint(&state), Decision::End);

    state.last_test.as_mut().unwrap().ok = Some(false);
    assert_eq!(after_test_lint(&state), Decision::Continue);

    state.last_test.as_mut().unwrap().ok = Some(true);
    store.set_steps(vec![upd("a"), upd("b")]).unwrap();
    state.reload_plan();
    assert_eq!(after_test_lint(&state), Decision::Continue);
    cleanup(&ws);
}

#[tokio::test]
async fn test_lint_marks_done_when_no_tests_and_plan_complete() {
    let ws = workspace();
    let mut state = graph_state(&ws);
    let store = state.plan_store();
    store.set_steps(vec![upd("a")]).unwrap();
    store.mark_completed(&["a".into()]).unwrap();

    // Empty repo: no test commands are discovered
    nodes::test_lint::run(&mut state).await.unwrap();
    let iteration = state.iteration.expect("iteration set");
    assert!(iteration.done);
    cleanup(&ws);
}

#[tokio::test]
async fn max_loops_forces_partial_finalize() {
    let ws = workspace();
    let mut state = graph_state(&ws);
    let provider = ScriptedProvider::new(vec![]);

    let workflow = Workflow::new(0);
    workflow.run_multi(&mut state, &provider).await.unwrap();

    let iteration = state.iteration.expect("iteration set");
    assert!(iteration.done);
    assert_eq!(iteration.commit_message, "dev-twin partial");
    assert!(ws.join("artifacts/end_marker.txt").exists());
    cleanup(&ws);
}
