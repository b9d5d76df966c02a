//! Run state threaded between agent nodes

use devtwin_core::{
    Analysis, ArtifactsJournal, DevtwinConfig, DockerTarget, Issue, Iteration, LastTest, Plan,
    PlanStore, Settings, TranscriptEntry,
};
use devtwin_llm::ChatMessage;
use std::path::PathBuf;
use std::sync::Arc;

/// Benchmark scoping: restrict the test run to the case's test files.
#[derive(Clone, Debug, Default)]
pub struct BenchScope {
    pub test_files: Vec<String>,
    pub test_timeout: Option<u64>,
}

/// Everything a run carries between nodes. `settings` and `config` are
/// read-only after init; the rest is owned by whichever node runs.
pub struct RunState {
    pub settings: Settings,
    pub config: DevtwinConfig,
    pub issue: Issue,
    pub repo_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub journal: Arc<ArtifactsJournal>,
    pub analysis: Option<Analysis>,
    pub plan: Option<Plan>,
    pub transcript: Vec<TranscriptEntry>,
    pub last_test: Option<LastTest>,
    pub iteration: Option<Iteration>,
    pub coder_messages: Option<Vec<ChatMessage>>,
    pub docker: Option<DockerTarget>,
    pub bench: Option<BenchScope>,
}

impl RunState {
    pub fn new(
        settings: Settings,
        config: DevtwinConfig,
        issue: Issue,
        repo_dir: impl Into<PathBuf>,
        artifacts_dir: impl Into<PathBuf>,
    ) -> Self {
        let artifacts_dir = artifacts_dir.into();
        Self {
            settings,
            config,
            issue,
            repo_dir: repo_dir.into(),
            journal: Arc::new(ArtifactsJournal::new(&artifacts_dir)),
            artifacts_dir,
            analysis: None,
            plan: None,
            transcript: Vec::new(),
            last_test: None,
            iteration: None,
            coder_messages: None,
            docker: None,
            bench: None,
        }
    }

    pub fn plan_store(&self) -> PlanStore {
        PlanStore::new(&self.artifacts_dir)
    }

    /// Reload the plan from disk; nodes call this after a loop may have
    /// mutated plan.json through tools.
    pub fn reload_plan(&mut self) {
        let store = self.plan_store();
        if store.exists() {
            self.plan = Some(store.load());
        }
    }

    /// Tool context snapshot for registry construction.
    pub fn tool_context(&self) -> devtwin_tools::ToolContext {
        devtwin_tools::ToolContext::new(&self.repo_dir, self.config.clone())
            .with_artifacts(&self.artifacts_dir)
            .with_journal(self.journal.clone())
            .with_docker(self.docker.clone())
            .with_analysis(self.analysis.clone())
    }
}
