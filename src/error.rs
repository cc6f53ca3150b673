// src/error.rs
use thiserror::Error;

use crate::model::TimeWindow;

/// Failure kinds of the analysis pipeline.
///
/// `NoImageryFound` and `InvalidInput` are caller-correctable; the upstream
/// variants mean "try again later"; `Internal` signals a pipeline bug and is
/// always fatal for the run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "no imagery found for {window} with cloud cover below {max_cloud_pct}%; \
         widen the date range or raise cloud_filter_max_pct"
    )]
    NoImageryFound {
        window: TimeWindow,
        max_cloud_pct: f64,
    },

    #[error("imagery source timed out after {waited_secs}s querying {window}")]
    UpstreamTimeout { window: TimeWindow, waited_secs: u64 },

    #[error("imagery source unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal computation error: {detail}")]
    Internal { detail: String },
}

impl AnalysisError {
    pub fn internal(detail: impl Into<String>) -> Self {
        AnalysisError::Internal {
            detail: detail.into(),
        }
    }

    /// True when resubmitting with adjusted parameters can help.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            AnalysisError::InvalidInput(_) | AnalysisError::NoImageryFound { .. }
        )
    }
}

/// Pipeline stages, also the states of the run state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Pending,
    AcquiringBefore,
    AcquiringAfter,
    Computing,
    Done,
    Failed,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStage::Pending => "pending",
            RunStage::AcquiringBefore => "acquiring_before",
            RunStage::AcquiringAfter => "acquiring_after",
            RunStage::Computing => "computing",
            RunStage::Done => "done",
            RunStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// An [`AnalysisError`] tagged with the stage that raised it.
#[derive(Debug, Error)]
#[error("run failed during {stage}: {error}")]
pub struct RunFailure {
    pub stage: RunStage,
    #[source]
    pub error: AnalysisError,
}

impl RunFailure {
    pub fn new(stage: RunStage, error: AnalysisError) -> Self {
        Self { stage, error }
    }
}
