//! Devtwin core — shared types, configuration, and run artifacts
//!
//! Everything here is persistence- and protocol-level: no LLM calls, no tool
//! execution. The journal and plan store own the artifacts directory layout
//! that every other crate writes through.

pub mod config;
pub mod error;
pub mod journal;
pub mod plan;
pub mod settings;
pub mod types;

pub use config::DevtwinConfig;
pub use error::{Error, Result};
pub use journal::{parse_exit_code, ArtifactsJournal};
pub use plan::{PlanStore, StepUpdate};
pub use settings::{Provider, Settings};
pub use types::{
    Analysis, DockerTarget, Issue, Iteration, LastTest, Plan, Step, StepStatus, Summary,
    TranscriptEntry,
};
