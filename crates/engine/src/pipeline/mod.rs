pub mod plan;
pub mod runner;
pub mod stages;

pub use plan::{split_list, AnalysisRequest, PlannedTask, TaskPlan};
pub use runner::{
    Pipeline, PipelineResult, StageEvent, StageObserver, StageOutput, Termination,
};
pub use stages::{roster, OutputContract, StageDescriptor};

use verifai_common::VerifaiError;

use crate::llm::LlmError;

/// Errors that stop a run before a report can be produced.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Stage '{stage}' failed: {error}")]
    Stage { stage: String, error: LlmError },

    #[error("LLM circuit open before stage '{stage}'")]
    CircuitOpen { stage: String },

    #[error("Pipeline exceeded its {seconds}s budget after {completed_stages} stages")]
    Timeout { seconds: u64, completed_stages: usize },
}

impl From<PipelineError> for VerifaiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::InvalidRequest(msg) => VerifaiError::Validation(msg),
            PipelineError::Stage { .. } => VerifaiError::LlmApi(e.to_string()),
            PipelineError::CircuitOpen { .. } => VerifaiError::CircuitOpen("llm_api".into()),
            PipelineError::Timeout { .. } => VerifaiError::Timeout(e.to_string()),
        }
    }
}
