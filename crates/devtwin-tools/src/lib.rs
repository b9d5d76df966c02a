//! Devtwin tools — capability-bounded operations exposed to the LLM
//!
//! Each tool is a self-contained file in src/tools/. Registries are built
//! per agent role from the configured allowlist, so an agent only ever sees
//! the tools enabled for it.

pub mod path;
pub mod registry;
pub mod tools;
pub mod walk;

pub use registry::{Tool, ToolRegistry, ToolResult};

use devtwin_core::{Analysis, ArtifactsJournal, DevtwinConfig, DockerTarget, PlanStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a tool constructor might need, threaded from the run state.
#[derive(Clone)]
pub struct ToolContext {
    pub repo_dir: PathBuf,
    pub artifacts_dir: Option<PathBuf>,
    pub docker: Option<DockerTarget>,
    pub analysis: Option<Analysis>,
    pub config: DevtwinConfig,
    pub journal: Option<Arc<ArtifactsJournal>>,
}

impl ToolContext {
    pub fn new(repo_dir: impl AsRef<Path>, config: DevtwinConfig) -> Self {
        Self {
            repo_dir: repo_dir.as_ref().to_path_buf(),
            artifacts_dir: None,
            docker: None,
            analysis: None,
            config,
            journal: None,
        }
    }

    pub fn with_artifacts(mut self, dir: impl AsRef<Path>) -> Self {
        self.artifacts_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn with_journal(mut self, journal: Arc<ArtifactsJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_docker(mut self, docker: Option<DockerTarget>) -> Self {
        self.docker = docker;
        self
    }

    pub fn with_analysis(mut self, analysis: Option<Analysis>) -> Self {
        self.analysis = analysis;
        self
    }

    fn plan_store(&self) -> Option<PlanStore> {
        self.artifacts_dir.as_ref().map(PlanStore::new)
    }
}

/// Build a registry restricted to `allowed` tool names. Unknown names are
/// ignored with a warning so config typos do not abort a run.
pub fn create_registry(ctx: &ToolContext, allowed: &[String]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for name in allowed {
        match name.as_str() {
            "read_file" => registry.register(tools::read::ReadFileTool::new(&ctx.repo_dir)),
            "write_file" => registry.register(tools::write::WriteFileTool::new(&ctx.repo_dir)),
            "list_dir" => registry.register(tools::list_dir::ListDirTool::new(&ctx.repo_dir)),
            "search" => registry.register(tools::search::SearchTool::new(&ctx.repo_dir)),
            "shell" => registry.register(tools::shell::ShellTool::new(
                &ctx.repo_dir,
                ctx.docker.clone(),
                ctx.config.clone(),
            )),
            "apply_patch" => registry.register(tools::patch::ApplyPatchTool::new(&ctx.repo_dir)),
            "replace_in_file" => {
                registry.register(tools::replace::ReplaceInFileTool::new(&ctx.repo_dir))
            }
            "replace_region" => {
                registry.register(tools::replace::ReplaceRegionTool::new(&ctx.repo_dir))
            }
            "lint" => registry.register(tools::lint::LintTool::new(
                &ctx.repo_dir,
                ctx.docker.clone(),
                ctx.analysis.clone(),
                ctx.config.clone(),
            )),
            "plan_read" => registry.register(tools::plan::PlanReadTool::new(ctx.plan_store())),
            "plan_update" => registry.register(tools::plan::PlanUpdateTool::new(ctx.plan_store())),
            "notes_read" => registry.register(tools::notes::NotesReadTool::new(ctx.journal.clone())),
            "note_write" => registry.register(tools::notes::NoteWriteTool::new(ctx.journal.clone())),
            "finalize" => registry.register(tools::finalize::FinalizeTool::new()),
            "debug_env" => registry.register(tools::debug::DebugEnvTool::new(&ctx.repo_dir)),
            other => tracing::warn!("unknown tool in config: {}", other),
        }
    }
    registry
}

/// All builtin tools, used when no per-agent allowlist applies.
pub fn create_default_registry(ctx: &ToolContext) -> ToolRegistry {
    let all = [
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
    ];
    create_registry(ctx, &all.map(String::from))
}

/// The read-only subset handed to analysis and planner roles.
pub fn create_readonly_registry(ctx: &ToolContext) -> ToolRegistry {
    let names = ["read_file", "list_dir", "search", "notes_read", "finalize"];
    create_registry(ctx, &names.map(String::from))
}
