//! Repetition guards for tool invocations
//!
//! Models stuck in a loop tend to rerun the same test command with small
//! variations. Test-runner invocations are normalized into one group and
//! suppressed from the third issuance; exact repeats of any shell command
//! are suppressed the same way, and near-repeats get an advisory hint
//! appended to the result.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

pub const TEST_RUNNER_GROUP: &str = "TEST_RUNNER";

pub struct RepeatGuard {
    enabled: bool,
    exact: HashMap<(String, String), u32>,
    groups: HashMap<&'static str, u32>,
    test_runner: Regex,
}

impl RepeatGuard {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            exact: HashMap::new(),
            groups: HashMap::new(),
            test_runner: Regex::new(r"\b(npm|pnpm|yarn)\s+test\b|\bnpx\s+jest\b|\bjest\b|\bpytest\b")
                .expect("static regex"),
        }
    }

    fn key(tool: &str, args: &Value) -> (String, String) {
        (tool.to_string(), args.to_string())
    }

    /// Record an invocation. Returns Some(text) when the call should be
    /// suppressed instead of executed.
    pub fn check(&mut self, tool: &str, args: &Value) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let key = Self::key(tool, args);
        let exact = {
            let count = self.exact.entry(key).or_insert(0);
            *count += 1;
            *count
        };
        if tool != "shell" {
            return None;
        }
        let command = args.get("command").and_then(|v| v.as_str()).unwrap_or("");
        if self.test_runner.is_match(command) {
            let count = self.groups.entry(TEST_RUNNER_GROUP).or_insert(0);
            *count += 1;
            if *count >= 3 {
                return Some(format!(
                    "SKIPPED_REPEAT_GROUP: {TEST_RUNNER_GROUP} invoked {count} times with \
                     variations. Suppressed to avoid loops."
                ));
            }
        }
        if exact >= 3 {
            return Some(format!(
                "SKIPPED_REPEAT: shell command repeated {exact} times. Adjust your approach."
            ));
        }
        None
    }

    /// Append an advisory hint for near-repeats of reads and shell calls.
    pub fn annotate(&self, tool: &str, args: &Value, result: &mut String) {
        if !self.enabled {
            return;
        }
        let count = self
            .exact
            .get(&Self::key(tool, args))
            .copied()
            .unwrap_or(0);
        if tool == "read_file" && count >= 3 {
            result.push_str(
                "\n\nREPEAT_GUARD: read_file called multiple times for the same path. \
                 Consider search/list_dir or write_file instead.",
            );
        }
        if tool == "shell" && count >= 2 {
            result.push_str(
                "\n\nREPEAT_GUARD: shell invoked with the same command multiple times. \
                 If the command fails, adjust strategy before retrying.",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_runner_group_suppresses_from_third_call() {
        let mut guard = RepeatGuard::new(true);
        assert!(guard.check("shell", &json!({"command": "npm test"})).is_none());
        assert!(guard.check("shell", &json!({"command": "npm test -s"})).is_none());
        let third = guard.check("shell", &json!({"command": "npx jest"})).unwrap();
        assert!(third.starts_with("SKIPPED_REPEAT_GROUP: TEST_RUNNER"));
    }

    #[test]
    fn exact_shell_repeat_suppressed() {
        let mut guard = RepeatGuard::new(true);
        let args = json!({"command": "make build"});
        assert!(guard.check("shell", &args).is_none());
        assert!(guard.check("shell", &args).is_none());
        let third = guard.check("shell", &args).unwrap();
        assert!(third.starts_with("SKIPPED_REPEAT:"));
    }

    #[test]
    fn read_file_gets_hint_not_suppression() {
        let mut guard = RepeatGuard::new(true);
        let args = json!({"path": "src/main.rs"});
        for _ in 0..3 {
            assert!(guard.check("read_file", &args).is_none());
        }
        let mut result = String::from("file contents");
        guard.annotate("read_file", &args, &mut result);
        assert!(result.contains("REPEAT_GUARD"));
    }

    #[test]
    fn disabled_guard_is_inert() {
        let mut guard = RepeatGuard::new(false);
        let args = json!({"command": "pytest"});
        for _ in 0..5 {
            assert!(guard.check("shell", &args).is_none());
        }
        let mut result = String::new();
        guard.annotate("shell", &args, &mut result);
        assert!(result.is_empty());
    }
}
