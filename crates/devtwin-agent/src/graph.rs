//! Workflow graph — explicit state machine over the agent nodes
//!
//! analysis -> setup -> planner -> (coder -> test_lint)* with a hard
//! ceiling on coder iterations. No framework: a loop and a transition
//! function are all the control flow this needs.

use crate::nodes;
use crate::state::RunState;
use devtwin_core::{Iteration, Result};
use devtwin_llm::LlmProvider;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Continue,
    End,
}

/// Success gate applied after test_lint: stop only when tests pass (or no
/// tests were detected) AND every plan step is completed.
pub fn after_test_lint(state: &RunState) -> Decision {
    let tests_ok = match &state.last_test {
        Some(last) => last.ok == Some(true),
        None => true,
    };
    let plan_complete = state
        .plan
        .as_ref()
        .map(|p| p.all_completed())
        .unwrap_or(true);
    if tests_ok && plan_complete {
        Decision::End
    } else {
        Decision::Continue
    }
}

pub struct Workflow {
    pub max_loops: usize,
}

impl Default for Workflow {
    fn default() -> Self {
        Self { max_loops: 10 }
    }
}

impl Workflow {
    pub fn new(max_loops: usize) -> Self {
        Self { max_loops }
    }

    /// Force a partial finalize when the coder-iteration ceiling is hit.
    fn finalize_partial(&self, state: &mut RunState) -> Result<()> {
        state.iteration = Some(Iteration {
            commit_message: "dev-twin partial".into(),
            done: true,
        });
        std::fs::create_dir_all(&state.artifacts_dir)?;
        std::fs::write(
            state.artifacts_dir.join("end_marker.txt"),
            "Max loops reached; partial finalize",
        )?;
        info!("workflow: max loops reached, partial finalize");
        Ok(())
    }

    /// The multi-node path.
    pub async fn run_multi(
        &self,
        state: &mut RunState,
        provider: &dyn LlmProvider,
    ) -> Result<()> {
        nodes::analysis::run(state, provider).await?;
        nodes::setup::run(state, provider).await?;
        nodes::planner::run(state, provider).await?;

        loop {
            if state.transcript.len() >= self.max_loops {
                return self.finalize_partial(state);
            }
            nodes::coder::run(state, provider).await?;
            nodes::test_lint::run(state).await?;
            if after_test_lint(state) == Decision::End {
                return Ok(());
            }
            info!(
                "workflow: iterating ({}/{} coder loops)",
                state.transcript.len(),
                self.max_loops
            );
        }
    }

    /// The single-agent path: one extended unified loop.
    pub async fn run_unified(
        &self,
        state: &mut RunState,
        provider: &dyn LlmProvider,
    ) -> Result<()> {
        nodes::unified::run(state, provider).await
    }
}
