//! Event-stream summaries: find the last test-looking shell invocation

use devtwin_core::{parse_exit_code, LastTest};
use regex::Regex;
use serde_json::Value;
use std::path::Path;

pub fn looks_like_test_command(command: &str) -> bool {
    if command.is_empty() {
        return false;
    }
    let c = command.to_lowercase();
    if c.contains("pytest") || c.contains("npx jest") {
        return true;
    }
    let re = Regex::new(r"\b(npm|pnpm|yarn)\s+test\b|\bjest\b").expect("static regex");
    re.is_match(&c)
}

/// Pull the first failing pytest nodeid out of test output, if present.
pub fn first_failed_nodeid(text: &str) -> Option<String> {
    let re = Regex::new(r"(?m)^FAILED\s+([\w\./\\:-]+)").expect("static regex");
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Scan the event mirror backwards for the most recent shell invocation
/// that looks like a test run, and summarize it. Full output is persisted
/// to `last_test_output.txt` when an artifacts dir is given.
pub fn summarize_last_test(events: &[Value], artifacts_dir: Option<&Path>) -> Option<LastTest> {
    for event in events.iter().rev() {
        if event.get("tool").and_then(|v| v.as_str()) != Some("shell") {
            continue;
        }
        let command = event
            .pointer("/args/command")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if !looks_like_test_command(command) {
            continue;
        }
        let result_text = event.get("result").and_then(|v| v.as_str()).unwrap_or("");
        let exit_code = parse_exit_code(result_text);
        let details_path = artifacts_dir.and_then(|dir| {
            std::fs::create_dir_all(dir).ok()?;
            let path = dir.join("last_test_output.txt");
            std::fs::write(&path, result_text).ok()?;
            Some(path.to_string_lossy().into_owned())
        });
        return Some(LastTest {
            command: command.to_string(),
            exit_code,
            ok: exit_code.map(|c| c == 0),
            preview: result_text.chars().take(240).collect(),
            details_path,
            first_failed_nodeid: first_failed_nodeid(result_text),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_detection() {
        assert!(looks_like_test_command("npm test"));
        assert!(looks_like_test_command("python -m pytest -q tests/"));
        assert!(looks_like_test_command("npx jest --ci"));
        assert!(looks_like_test_command("yarn test --watch=false"));
        assert!(!looks_like_test_command("npm install"));
        assert!(!looks_like_test_command("ls -la"));
    }

    #[test]
    fn summarize_finds_most_recent_test_event() {
        let events = vec![
            json!({"tool": "shell", "args": {"command": "pytest -q"}, "result": "$ pytest -q\n[exit 1]\nFAILED tests/test_a.py::test_x\n1 failed"}),
            json!({"tool": "read_file", "args": {"path": "a.py"}, "result": "..."}),
            json!({"tool": "shell", "args": {"command": "npm test"}, "result": "$ npm test\n[exit 0]\nall green"}),
        ];
        let last = summarize_last_test(&events, None).unwrap();
        assert_eq!(last.command, "npm test");
        assert_eq!(last.exit_code, Some(0));
        assert_eq!(last.ok, Some(true));
        assert!(last.first_failed_nodeid.is_none());
    }

    #[test]
    fn failed_nodeid_extraction() {
        let output = "$ pytest\n[exit 1]\nFAILED tests/test_calc.py::test_add - assert 2 == 3\n";
        assert_eq!(
            first_failed_nodeid(output),
            Some("tests/test_calc.py::test_add".to_string())
        );
    }

    #[test]
    fn no_test_events_yields_none() {
        let events = vec![json!({"tool": "shell", "args": {"command": "ls"}, "result": "[exit 0]"})];
        assert!(summarize_last_test(&events, None).is_none());
    }
}
