//! lint — run a given command or the discovered lint commands

use crate::registry::{Tool, ToolResult};
use crate::tools::shell::run_shell;
use devtwin_core::{Analysis, DevtwinConfig, DockerTarget};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub struct LintTool {
    repo_dir: PathBuf,
    docker: Option<DockerTarget>,
    analysis: Option<Analysis>,
    config: DevtwinConfig,
}

impl LintTool {
    pub fn new(
        repo_dir: impl AsRef<Path>,
        docker: Option<DockerTarget>,
        analysis: Option<Analysis>,
        config: DevtwinConfig,
    ) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
            docker,
            analysis,
            config,
        }
    }
}

#[async_trait::async_trait]
impl Tool for LintTool {
    fn name(&self) -> &str {
        "lint"
    }

    fn description(&self) -> &str {
        "Run linter(s) for the project. With a command argument runs exactly \
         that; otherwise runs the discovered lint commands sequentially and \
         returns the framed outputs."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Exact lint command to run (optional)"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds per command"
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let timeout = args["timeout"]
            .as_u64()
            .unwrap_or(self.config.timeouts.default_shell_timeout)
            .clamp(1, self.config.timeouts.max_shell_timeout);

        let commands: Vec<String> = match args["command"].as_str().filter(|c| !c.is_empty()) {
            Some(c) => vec![c.to_string()],
            None => self
                .analysis
                .as_ref()
                .map(|a| a.lint_commands.clone())
                .unwrap_or_default(),
        };
        if commands.is_empty() {
            return ToolResult::text("NO_LINT_COMMANDS");
        }

        let mut outputs = Vec::new();
        for command in commands {
            let exec_cmd = match &self.docker {
                Some(docker) => {
                    let workdir = docker
                        .workdir
                        .clone()
                        .unwrap_or_else(|| self.config.docker.workspace_dir.clone());
                    format!(
                        "docker exec -w {} {} sh -lc \"{}\"",
                        workdir,
                        docker.container_id,
                        command.replace('"', "\\\"")
                    )
                }
                None => command.clone(),
            };
            let (code, out, err) = run_shell(&exec_cmd, &self.repo_dir, timeout, None).await;
            let body = if out.trim().is_empty() { err } else { out };
            outputs.push(format!("$ {command}\n[exit {code}]\n{body}"));
        }
        ToolResult::text(outputs.join("\n\n"))
    }
}
