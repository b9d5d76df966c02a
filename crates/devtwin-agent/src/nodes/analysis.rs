//! Analysis node — static stack detection refined by a short read-only loop

use crate::jsonx::extract_first_json_object;
use crate::state::RunState;
use crate::tool_loop::{run_tool_loop, LoopHooks, LoopOptions};
use devtwin_core::{Analysis, Result};
use devtwin_llm::LlmProvider;
use devtwin_tools::create_readonly_registry;
use serde_json::Value;
use std::path::Path;
use tracing::info;

const ANALYSIS_PROMPT: &str = "\
You are an expert project archeologist. Tools available: list_dir, read_file, search.
Infer project type and environment details. Use tools as needed to inspect missing files.
Return strict JSON with keys: project_type, build_commands, test_commands, run_commands, \
package_manager, dockerfile_suggested.

Consider common ecosystems: Node.js (npm/yarn/pnpm), Python (pip/poetry/uv), Go, \
Java/Gradle/Maven, Rust/Cargo, .NET, etc.
Propose a Dockerfile (string) that installs ripgrep (rg) and required runtimes.";

const MANIFESTS: &[&str] = &[
    "package.json",
    "pyproject.toml",
    "requirements.txt",
    "go.mod",
    "Cargo.toml",
    "pom.xml",
    "build.gradle",
    "Dockerfile",
    "Makefile",
    "README.md",
    "README.rst",
];

fn gather_repo_snapshot(repo_dir: &Path) -> String {
    let mut tops: Vec<String> = std::fs::read_dir(repo_dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    tops.sort();

    let mut snippets = Vec::new();
    for name in MANIFESTS {
        let path = repo_dir.join(name);
        if let Ok(content) = std::fs::read_to_string(&path) {
            let head: String = content.chars().take(5000).collect();
            snippets.push(format!("## {name}\n{head}"));
        }
    }
    format!(
        "# Top-level entries:\n{}\n\n{}",
        tops.join("\n"),
        snippets.join("\n\n")
    )
}

struct StackGuess {
    package_manager: Option<String>,
    project_type: String,
    build_commands: Vec<String>,
    test_commands: Vec<String>,
    run_commands: Vec<String>,
}

/// Heuristic fallback used when the model returns nothing or partial JSON.
fn detect_stack(repo_dir: &Path) -> StackGuess {
    let pkg_json = repo_dir.join("package.json");
    let pm = if repo_dir.join("pnpm-lock.yaml").exists() {
        Some("pnpm")
    } else if repo_dir.join("yarn.lock").exists() {
        Some("yarn")
    } else if pkg_json.exists() {
        Some("npm")
    } else {
        None
    };

    if let Some(pm) = pm {
        let scripts: Value = std::fs::read_to_string(&pkg_json)
            .ok()
            .and_then(|t| serde_json::from_str::<Value>(&t).ok())
            .and_then(|v| v.get("scripts").cloned())
            .unwrap_or_default();
        let mut build = vec![format!("{pm} install")];
        if scripts.get("build").is_some() {
            build.push(format!("{pm} run build"));
        }
        let run = if scripts.get("dev").is_some() {
            vec![format!("{pm} run dev")]
        } else {
            Vec::new()
        };
        return StackGuess {
            package_manager: Some(pm.to_string()),
            project_type: "node".into(),
            build_commands: build,
            test_commands: vec![format!("{pm} test")],
            run_commands: run,
        };
    }
    if repo_dir.join("pyproject.toml").exists() || repo_dir.join("requirements.txt").exists() {
        return StackGuess {
            package_manager: Some("pip".into()),
            project_type: "python".into(),
            build_commands: vec!["python -m pip install -r requirements.txt".into()],
            test_commands: vec!["python -m pytest -q".into()],
            run_commands: Vec::new(),
        };
    }
    if repo_dir.join("Cargo.toml").exists() {
        return StackGuess {
            package_manager: Some("cargo".into()),
            project_type: "rust".into(),
            build_commands: vec!["cargo build".into()],
            test_commands: vec!["cargo test".into()],
            run_commands: Vec::new(),
        };
    }
    if repo_dir.join("go.mod").exists() {
        return StackGuess {
            package_manager: Some("go".into()),
            project_type: "go".into(),
            build_commands: vec!["go build ./...".into()],
            test_commands: vec!["go test ./...".into()],
            run_commands: Vec::new(),
        };
    }
    StackGuess {
        package_manager: None,
        project_type: "unknown".into(),
        build_commands: Vec::new(),
        test_commands: Vec::new(),
        run_commands: Vec::new(),
    }
}

fn dockerfile_template(project_type: &str, pm: Option<&str>) -> String {
    match project_type {
        "node" => {
            let pm = pm.unwrap_or("npm");
            format!(
                "FROM node:20-alpine\n\
                 RUN apk add --no-cache bash git ca-certificates ripgrep\n\
                 WORKDIR /workspace\n\
                 COPY package*.json ./\n\
                 RUN {pm} install\n\
                 COPY . .\n\
                 CMD [\"sh\", \"-lc\", \"echo Ready; sleep infinity\"]\n"
            )
        }
        "python" => "FROM python:3.12-slim\n\
             RUN apt-get update && apt-get install -y --no-install-recommends git ripgrep && rm -rf /var/lib/apt/lists/*\n\
             WORKDIR /workspace\n\
             COPY . .\n\
             RUN pip install -r requirements.txt || true\n\
             CMD [\"sh\", \"-lc\", \"echo Ready; sleep infinity\"]\n"
            .to_string(),
        "rust" => "FROM rust:1-slim\n\
             RUN apt-get update && apt-get install -y --no-install-recommends git ripgrep && rm -rf /var/lib/apt/lists/*\n\
             WORKDIR /workspace\n\
             COPY . .\n\
             CMD [\"sh\", \"-lc\", \"echo Ready; sleep infinity\"]\n"
            .to_string(),
        _ => "FROM debian:bookworm-slim\n\
             RUN apt-get update && apt-get install -y --no-install-recommends git ripgrep && rm -rf /var/lib/apt/lists/*\n\
             WORKDIR /workspace\n\
             COPY . .\n\
             CMD [\"sh\", \"-lc\", \"echo Ready; sleep infinity\"]\n"
            .to_string(),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Idempotent: skipped when the state already carries an analysis.
pub async fn run(state: &mut RunState, provider: &dyn LlmProvider) -> Result<()> {
    if state.analysis.is_some() {
        return Ok(());
    }
    let snapshot = gather_repo_snapshot(&state.repo_dir);
    let registry = create_readonly_registry(&state.tool_context());
    let agent_config = state.config.agent("analysis");
    let history = state.config.history("analysis");

    let mut options = LoopOptions::new(&state.settings.default_model);
    options.max_steps = agent_config.max_steps;
    options.check_plan_completion = false;
    options.note_tag = Some("analysis".into());
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
        ANALYSIS_PROMPT,
        &snapshot,
        options,
        &LoopHooks::default(),
    )
    .await;

    let data = extract_first_json_object(&outcome.last_content);
    let guess = detect_stack(&state.repo_dir);

    let package_manager = data
        .get("package_manager")
        .and_then(|v| v.as_str())
        .map(String::from)
        .or(guess.package_manager);
    let project_type = data
        .get("project_type")
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or(guess.project_type);

    let mut build_commands = string_list(data.get("build_commands"));
    if build_commands.is_empty() {
        build_commands = guess.build_commands;
    }
    let mut test_commands = string_list(data.get("test_commands"));
    if test_commands.is_empty() {
        test_commands = guess.test_commands;
    }
    let mut run_commands = string_list(data.get("run_commands"));
    if run_commands.is_empty() {
        run_commands = guess.run_commands;
    }

    // Use the model's Dockerfile only when it is substantial
    let dockerfile = data
        .get("dockerfile_suggested")
        .and_then(|v| v.as_str())
        .filter(|d| d.trim().len() > 40)
        .map(String::from)
        .unwrap_or_else(|| dockerfile_template(&project_type, package_manager.as_deref()));

    let analysis = Analysis {
        project_type,
        build_commands,
        test_commands,
        run_commands,
        package_manager,
        dockerfile_suggested: Some(dockerfile),
        relevant_files: string_list(data.get("relevant_files")),
        lint_commands: string_list(data.get("lint_commands")),
        test_strategy: None,
        env: Default::default(),
    };

    let path = state.artifacts_dir.join("analysis.json");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(&analysis)?)?;
    info!("analysis: {} project", analysis.project_type);

    state.analysis = Some(analysis);
    Ok(())
}
