//! Tests for devtwin-tools: ToolResult, ToolRegistry, and all builtin tools
//! against a real filesystem

use devtwin_core::{ArtifactsJournal, DevtwinConfig};
use devtwin_tools::*;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

fn test_workspace() -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "devtwin-tools-test-{}-{}",
        std::process::id(),
        id
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn cleanup(dir: &std::path::Path) {
    let _ = std::fs::remove_dir_all(dir);
}

fn ctx(ws: &std::path::Path) -> ToolContext {
    let artifacts = ws.join("artifacts");
    ToolContext::new(ws, DevtwinConfig::default())
        .with_artifacts(&artifacts)
        .with_journal(Arc::new(ArtifactsJournal::new(&artifacts)))
}

// ===========================================================================
// ToolResult and registry
// ===========================================================================

#[test]
fn tool_result_text_and_error() {
    let r = ToolResult::text("hello");
    assert!(!r.is_error());
    assert_eq!(r.to_content_string(), "hello");

    let e = ToolResult::error("boom");
    assert!(e.is_error());
    assert_eq!(e.to_content_string(), "ERROR: boom");
}

#[tokio::test]
async fn registry_execute_missing_tool() {
    let reg = ToolRegistry::new();
    let result = reg.execute("nonexistent", json!({})).await;
    assert!(result.is_error());
    assert!(result.to_content_string().contains("not found"));
}

#[tokio::test]
async fn default_registry_has_all_tools() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));
    let names = reg.list();
    for expected in [
        "read_file",
        "write_file",
        "list_dir",
        "search",
        "shell",
        "apply_patch",
        "replace_in_file",
        "replace_region",
        "lint",
        "plan_read",
        "plan_update",
        "notes_read",
        "note_write",
        "debug_env",
        "finalize",
    ] {
        assert!(names.contains(&expected), "missing tool {expected}");
    }
    assert_eq!(reg.definitions().len(), names.len());
    cleanup(&ws);
}

#[tokio::test]
async fn registry_partitioning_limits_visible_tools() {
    let ws = test_workspace();
    let reg = create_registry(&ctx(&ws), &["read_file".into(), "search".into()]);
    assert_eq!(reg.list().len(), 2);
    assert!(reg.get("shell").is_none());
    assert!(reg.get("read_file").is_some());
    cleanup(&ws);
}

#[tokio::test]
async fn registry_definitions_are_well_formed() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));
    for def in reg.definitions() {
        assert!(!def.name.is_empty());
        assert!(!def.description.is_empty());
        assert!(def.input_schema.is_object());
    }
    cleanup(&ws);
}

// ===========================================================================
// read_file / write_file
// ===========================================================================

#[tokio::test]
async fn write_then_read_roundtrip() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));

    let r = reg
        .execute("write_file", json!({"path": "sub/dir/deep.txt", "content": "nested"}))
        .await;
    assert!(!r.is_error(), "{}", r.to_content_string());
    assert_eq!(r.to_content_string(), "WROTE sub/dir/deep.txt (6 bytes)");

    let r = reg
        .execute("read_file", json!({"path": "sub/dir/deep.txt"}))
        .await;
    assert_eq!(r.to_content_string(), "nested");
    cleanup(&ws);
}

#[tokio::test]
async fn read_file_line_slice_is_one_based_inclusive() {
    let ws = test_workspace();
    let lines: Vec<String> = (1..=20).map(|i| format!("line {i}")).collect();
    std::fs::write(ws.join("big.txt"), lines.join("\n")).unwrap();
    let reg = create_default_registry(&ctx(&ws));

    let r = reg
        .execute(
            "read_file",
            json!({"path": "big.txt", "line_start": 5, "line_end": 7}),
        )
        .await;
    assert_eq!(r.to_content_string(), "line 5\nline 6\nline 7");

    // Reversed bounds are swapped, not rejected
    let r = reg
        .execute(
            "read_file",
            json!({"path": "big.txt", "line_start": 7, "line_end": 5}),
        )
        .await;
    assert_eq!(r.to_content_string(), "line 5\nline 6\nline 7");
    cleanup(&ws);
}

#[tokio::test]
async fn read_file_missing_returns_not_found() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));
    let r = reg.execute("read_file", json!({"path": "ghost.txt"})).await;
    assert!(!r.is_error());
    assert_eq!(r.to_content_string(), "NOT_FOUND: ghost.txt");
    cleanup(&ws);
}

#[tokio::test]
async fn path_escape_blocked_on_all_path_tools() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));
    for (tool, args) in [
        ("read_file", json!({"path": "../outside.txt"})),
        ("write_file", json!({"path": "/abs/path.txt", "content": "x"})),
        ("list_dir", json!({"path": "../.."})),
        ("search", json!({"pattern": "x", "path": "../sibling"})),
        (
            "replace_in_file",
            json!({"path": "../f.txt", "pattern": "a", "replacement": "b"}),
        ),
    ] {
        let r = reg.execute(tool, args).await;
        assert!(r.is_error(), "{tool} should reject path escape");
    }
    cleanup(&ws);
}

#[tokio::test]
async fn write_file_normalizes_backslashes() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));
    let r = reg
        .execute("write_file", json!({"path": "a\\b\\c.txt", "content": "x"}))
        .await;
    assert!(!r.is_error());
    assert!(ws.join("a/b/c.txt").exists());
    cleanup(&ws);
}

// ===========================================================================
// list_dir / search
// ===========================================================================

#[tokio::test]
async fn list_dir_prunes_ignored_directories_and_minified_assets() {
    let ws = test_workspace();
    std::fs::write(ws.join("included.txt"), "hello").unwrap();
    std::fs::create_dir_all(ws.join("node_modules")).unwrap();
    std::fs::write(ws.join("node_modules/ignored.txt"), "no").unwrap();
    std::fs::create_dir_all(ws.join("src")).unwrap();
    std::fs::write(ws.join("src/main.rs"), "fn main() {}").unwrap();
    std::fs::write(ws.join("src/bundle.min.js"), "!function(){}()").unwrap();
    std::fs::write(ws.join("logo.png"), [0u8, 1, 2]).unwrap();

    let reg = create_default_registry(&ctx(&ws));
    let r = reg.execute("list_dir", json!({})).await;
    let listing = r.to_content_string();
    assert!(listing.contains("included.txt"));
    assert!(listing.contains("src/main.rs"));
    assert!(!listing.contains("node_modules"));
    assert!(!listing.contains("bundle.min.js"));
    assert!(!listing.contains("logo.png"));
    cleanup(&ws);
}

#[tokio::test]
async fn search_returns_path_line_content() {
    let ws = test_workspace();
    std::fs::write(ws.join("a.py"), "x = 1\ndef target():\n    pass").unwrap();
    std::fs::write(ws.join("b.py"), "unrelated").unwrap();

    let reg = create_default_registry(&ctx(&ws));
    let r = reg.execute("search", json!({"pattern": r"def \w+"})).await;
    let out = r.to_content_string();
    assert!(out.contains("a.py:2:def target():"), "got: {out}");
    assert!(!out.contains("b.py"));
    cleanup(&ws);
}

#[tokio::test]
async fn search_skips_lockfiles_and_pruned_directories() {
    let ws = test_workspace();
    std::fs::write(ws.join("Cargo.lock"), "needle = \"1\"").unwrap();
    std::fs::create_dir_all(ws.join("node_modules")).unwrap();
    std::fs::write(ws.join("node_modules/dep.js"), "needle").unwrap();
    std::fs::write(ws.join("src.rs"), "needle in source").unwrap();

    let reg = create_default_registry(&ctx(&ws));
    let r = reg.execute("search", json!({"pattern": "needle"})).await;
    let out = r.to_content_string();
    assert!(out.contains("src.rs:1:"), "got: {out}");
    assert!(!out.contains("Cargo.lock"));
    assert!(!out.contains("node_modules"));
    cleanup(&ws);
}

#[tokio::test]
async fn search_rejects_bad_regex() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));
    let r = reg.execute("search", json!({"pattern": "[unclosed"})).await;
    assert!(r.is_error());
    cleanup(&ws);
}

// ===========================================================================
// shell
// ===========================================================================

#[tokio::test]
async fn shell_frames_output_with_exit_marker() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));
    let r = reg.execute("shell", json!({"command": "echo hello"})).await;
    let out = r.to_content_string();
    assert!(out.starts_with("$ echo hello\n[exit 0]\n"), "got: {out}");
    assert!(out.contains("hello"));
    cleanup(&ws);
}

#[tokio::test]
async fn shell_reports_nonzero_exit() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));
    let r = reg.execute("shell", json!({"command": "exit 42"})).await;
    assert!(r.to_content_string().contains("[exit 42]"));
    cleanup(&ws);
}

#[tokio::test]
async fn shell_runs_in_workspace() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));
    let r = reg.execute("shell", json!({"command": "pwd"})).await;
    let expected = ws.canonicalize().unwrap();
    assert!(
        r.to_content_string().contains(&*expected.to_string_lossy()),
        "got: {}",
        r.to_content_string()
    );
    cleanup(&ws);
}

#[tokio::test]
async fn shell_timeout_kills_child_tree() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));
    let started = std::time::Instant::now();
    let r = reg
        .execute("shell", json!({"command": "sleep 30", "timeout": 1}))
        .await;
    let elapsed = started.elapsed();
    assert!(elapsed.as_secs() <= 3, "took {elapsed:?}");
    let out = r.to_content_string();
    assert!(out.contains("[KILLED AFTER TIMEOUT]"), "got: {out}");
    assert!(!out.contains("[exit 0]"));
    cleanup(&ws);
}

#[tokio::test]
async fn shell_accepts_stdin() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));
    let r = reg
        .execute("shell", json!({"command": "cat", "stdin": "piped input"}))
        .await;
    assert!(r.to_content_string().contains("piped input"));
    cleanup(&ws);
}

// ===========================================================================
// apply_patch
// ===========================================================================

#[tokio::test]
async fn apply_patch_success_returns_done() {
    let ws = test_workspace();
    std::fs::write(ws.join("m.py"), "def f():\n    return 1").unwrap();
    let reg = create_default_registry(&ctx(&ws));
    let patch = "*** Begin Patch\n*** Update File: m.py\n def f():\n-    return 1\n+    return 2\n*** End Patch";
    let r = reg.execute("apply_patch", json!({"patch_text": patch})).await;
    assert_eq!(r.to_content_string(), "Done!");
    assert_eq!(
        std::fs::read_to_string(ws.join("m.py")).unwrap(),
        "def f():\n    return 2"
    );
    cleanup(&ws);
}

#[tokio::test]
async fn apply_patch_bad_context_reports_error_and_suggestions() {
    let ws = test_workspace();
    std::fs::write(ws.join("x.py"), "x = 1").unwrap();
    let reg = create_default_registry(&ctx(&ws));
    let patch = "*** Begin Patch\n*** Update File: x.py\n-y = 2\n+y = 3\n*** End Patch";
    let r = reg.execute("apply_patch", json!({"patch_text": patch})).await;
    let out = r.to_content_string();
    assert!(out.starts_with("ERROR: Patch format error:"), "got: {out}");
    assert!(out.contains("Invalid Context"));
    assert!(out.contains("replace_in_file"));
    // File untouched
    assert_eq!(std::fs::read_to_string(ws.join("x.py")).unwrap(), "x = 1");
    cleanup(&ws);
}

#[tokio::test]
async fn apply_patch_missing_envelope_is_rejected() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));
    let r = reg
        .execute("apply_patch", json!({"patch_text": "not a patch"}))
        .await;
    assert!(r.is_error());
    assert!(r.to_content_string().contains("*** Begin Patch"));
    cleanup(&ws);
}

#[tokio::test]
async fn apply_patch_missing_update_target_lists_siblings() {
    let ws = test_workspace();
    std::fs::write(ws.join("actual.py"), "pass").unwrap();
    let reg = create_default_registry(&ctx(&ws));
    let patch = "*** Begin Patch\n*** Update File: typo.py\n-x\n+y\n*** End Patch";
    let r = reg.execute("apply_patch", json!({"patch_text": patch})).await;
    let out = r.to_content_string();
    assert!(out.contains("File not found: typo.py"));
    assert!(out.contains("actual.py"));
    cleanup(&ws);
}

// ===========================================================================
// replace_in_file / replace_region
// ===========================================================================

#[tokio::test]
async fn replace_in_file_single_and_all() {
    let ws = test_workspace();
    std::fs::write(ws.join("r.txt"), "aaa bbb aaa").unwrap();
    let reg = create_default_registry(&ctx(&ws));

    let r = reg
        .execute(
            "replace_in_file",
            json!({"path": "r.txt", "pattern": "aaa", "replacement": "XXX"}),
        )
        .await;
    assert_eq!(r.to_content_string(), "REPLACED 1 occurrence(s) in r.txt");
    assert_eq!(std::fs::read_to_string(ws.join("r.txt")).unwrap(), "XXX bbb aaa");

    let r = reg
        .execute(
            "replace_in_file",
            json!({"path": "r.txt", "pattern": "[ax]{3}", "replacement": "0", "count": 0}),
        )
        .await;
    assert!(r.to_content_string().starts_with("REPLACED"));
    assert_eq!(std::fs::read_to_string(ws.join("r.txt")).unwrap(), "0 bbb 0");
    cleanup(&ws);
}

#[tokio::test]
async fn replace_in_file_no_matches() {
    let ws = test_workspace();
    std::fs::write(ws.join("r.txt"), "hello").unwrap();
    let reg = create_default_registry(&ctx(&ws));
    let r = reg
        .execute(
            "replace_in_file",
            json!({"path": "r.txt", "pattern": "absent", "replacement": "x"}),
        )
        .await;
    assert_eq!(r.to_content_string(), "NO_MATCHES");
    cleanup(&ws);
}

#[tokio::test]
async fn replace_region_spans_newlines() {
    let ws = test_workspace();
    std::fs::write(
        ws.join("cfg.ini"),
        "[keep]\nvalue=1\n# BEGIN\nold\ncontent\n# END\n[tail]",
    )
    .unwrap();
    let reg = create_default_registry(&ctx(&ws));
    let r = reg
        .execute(
            "replace_region",
            json!({
                "path": "cfg.ini",
                "start_pattern": "# BEGIN",
                "end_pattern": "# END",
                "replacement": "# BEGIN\nnew\n# END"
            }),
        )
        .await;
    assert_eq!(r.to_content_string(), "REPLACED REGION in cfg.ini");
    let content = std::fs::read_to_string(ws.join("cfg.ini")).unwrap();
    assert!(content.contains("new"));
    assert!(!content.contains("old\ncontent"));
    assert!(content.contains("[keep]"));
    assert!(content.contains("[tail]"));
    cleanup(&ws);
}

#[tokio::test]
async fn replace_region_missing_markers() {
    let ws = test_workspace();
    std::fs::write(ws.join("f.txt"), "no markers here").unwrap();
    let reg = create_default_registry(&ctx(&ws));
    let r = reg
        .execute(
            "replace_region",
            json!({"path": "f.txt", "start_pattern": "BEGIN", "end_pattern": "END", "replacement": "x"}),
        )
        .await;
    assert_eq!(r.to_content_string(), "NO_START_MATCH");
    cleanup(&ws);
}

// ===========================================================================
// plan tools
// ===========================================================================

#[tokio::test]
async fn plan_tools_create_mark_and_read() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));

    let r = reg.execute("plan_read", json!({})).await;
    assert_eq!(r.to_content_string(), "NO_PLAN");

    let r = reg
        .execute(
            "plan_update",
            json!({"steps": [
                {"id": "a", "description": "first"},
                {"id": "b", "description": "second"}
            ]}),
        )
        .await;
    assert_eq!(r.to_content_string(), "PLAN_CREATED with 2 steps");

    let r = reg
        .execute("plan_update", json!({"mark_in_progress": "a"}))
        .await;
    assert_eq!(r.to_content_string(), "PLAN_UPDATED 1 step(s)");

    let r = reg
        .execute("plan_update", json!({"mark_completed": ["a", "b"]}))
        .await;
    assert_eq!(r.to_content_string(), "PLAN_UPDATED 2 step(s)");

    let r = reg.execute("plan_read", json!({})).await;
    let text = r.to_content_string();
    assert!(text.contains("\"completed\""));
    assert!(!text.contains("\"pending\""));
    cleanup(&ws);
}

// ===========================================================================
// notes tools
// ===========================================================================

#[tokio::test]
async fn notes_write_then_read_with_topic_filter() {
    let ws = test_workspace();
    let reg = create_default_registry(&ctx(&ws));

    let r = reg.execute("notes_read", json!({})).await;
    assert_eq!(r.to_content_string(), "NO_NOTES");

    let r = reg
        .execute("note_write", json!({"topic": "debug", "content": "found the bug"}))
        .await;
    assert_eq!(r.to_content_string(), "NOTE_ADDED: debug");
    reg.execute("note_write", json!({"topic": "other", "content": "noise"}))
        .await;

    let r = reg
        .execute("notes_read", json!({"topic": "debug"}))
        .await;
    let out = r.to_content_string();
    assert!(out.contains("found the bug"));
    assert!(!out.contains("noise"));

    // notes.md view regenerated
    let md = std::fs::read_to_string(ws.join("artifacts/notes.md")).unwrap();
    assert!(md.contains("**debug**: found the bug"));
    cleanup(&ws);
}

// ===========================================================================
// debug_env
// ===========================================================================

#[tokio::test]
async fn debug_env_lists_contents() {
    let ws = test_workspace();
    std::fs::write(ws.join("visible.txt"), "x").unwrap();
    let reg = create_default_registry(&ctx(&ws));
    let r = reg.execute("debug_env", json!({})).await;
    let out = r.to_content_string();
    assert!(out.contains("Repository directory:"));
    assert!(out.contains("visible.txt"));
    cleanup(&ws);
}
