//! Single-pass run: analyze, research, evaluate.
//!
//! A run is an explicit state machine. Each non-terminal state has one
//! transition, no state is entered twice, and any failure jumps straight to
//! `Failed` without touching the remaining stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::analyzer::{validate_requirement, RequirementAnalyzer};
use crate::backend::LanguageBackend;
use crate::candidate::CandidateRecord;
use crate::config::ScoutConfig;
use crate::criteria::RequirementCriteria;
use crate::error::{PipelineError, ScoutError};
use crate::evaluator::CandidateEvaluator;
use crate::gateway::{RetryPolicy, SearchGateway};
use crate::report::Report;
use crate::researcher::CandidateResearcher;
use crate::search::SearchSurface;

/// Stage names used in failures and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Idle,
    Analyzing,
    Researching,
    Evaluating,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => write!(f, "idle"),
            Stage::Analyzing => write!(f, "analyzing"),
            Stage::Researching => write!(f, "researching"),
            Stage::Evaluating => write!(f, "evaluating"),
        }
    }
}

/// Where a run currently is, carrying the validated output of the previous stage.
#[derive(Debug)]
pub enum RunState {
    Idle {
        requirement: String,
    },
    Analyzing {
        requirement: String,
    },
    Researching {
        criteria: RequirementCriteria,
    },
    Evaluating {
        criteria: RequirementCriteria,
        candidates: Vec<CandidateRecord>,
    },
    Done(Report),
    Failed(PipelineError),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done(_) | RunState::Failed(_))
    }

    /// The stage a non-terminal state is in; `None` once finished.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RunState::Idle { .. } => Some(Stage::Idle),
            RunState::Analyzing { .. } => Some(Stage::Analyzing),
            RunState::Researching { .. } => Some(Stage::Researching),
            RunState::Evaluating { .. } => Some(Stage::Evaluating),
            RunState::Done(_) | RunState::Failed(_) => None,
        }
    }

    fn failed(stage: Stage, cause: ScoutError) -> Self {
        RunState::Failed(PipelineError::new(stage, cause))
    }
}

pub struct PipelineOrchestrator {
    analyzer: RequirementAnalyzer,
    researcher: CandidateResearcher,
    evaluator: CandidateEvaluator,
}

impl PipelineOrchestrator {
    pub fn new(
        analyzer: RequirementAnalyzer,
        researcher: CandidateResearcher,
        evaluator: CandidateEvaluator,
    ) -> Self {
        Self {
            analyzer,
            researcher,
            evaluator,
        }
    }

    /// Wire the three stages from config and the two external capabilities.
    pub fn from_config(
        config: &ScoutConfig,
        backend: Arc<dyn LanguageBackend>,
        surface: Arc<dyn SearchSurface>,
    ) -> Self {
        let gateway = Arc::new(SearchGateway::new(
            surface,
            RetryPolicy::from(&config.search),
        ));
        Self::new(
            RequirementAnalyzer::new(backend, config.prompts.clone()),
            CandidateResearcher::new(gateway, &config.search),
            CandidateEvaluator::new(config.scoring.clone()),
        )
    }

    /// Run the whole pipeline for one requirement.
    pub async fn run(&self, requirement_text: &str) -> Result<Report, PipelineError> {
        self.run_until_cancelled(requirement_text, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but gives up as soon as `cancel` fires.
    /// In-flight searches are dropped and no partial report is returned.
    pub async fn run_until_cancelled(
        &self,
        requirement_text: &str,
        cancel: CancellationToken,
    ) -> Result<Report, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline_run", %run_id);

        async move {
            let started = Instant::now();
            let mut state = RunState::Idle {
                requirement: requirement_text.to_string(),
            };

            while let Some(stage) = state.stage() {
                info!(%stage, "entering stage");
                state = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        warn!(%stage, "run cancelled");
                        RunState::failed(stage, ScoutError::Cancelled)
                    }
                    next = self.step(state) => next,
                };
            }

            match state {
                RunState::Done(report) => {
                    info!(
                        candidates = report.ranked_candidates.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "run complete"
                    );
                    Ok(report)
                }
                RunState::Failed(error) => {
                    warn!(stage = %error.stage, error = %error.cause, "run failed");
                    Err(error)
                }
                _ => unreachable!("loop only exits on a terminal state"),
            }
        }
        .instrument(span)
        .await
    }

    /// Advance one state. Terminal states are returned untouched.
    pub async fn step(&self, state: RunState) -> RunState {
        match state {
            RunState::Idle { requirement } => self.validate(requirement),
            RunState::Analyzing { requirement } => self.analyze(&requirement).await,
            RunState::Researching { criteria } => self.research(criteria).await,
            RunState::Evaluating {
                criteria,
                candidates,
            } => self.evaluate(criteria, candidates),
            terminal => terminal,
        }
    }

    fn validate(&self, requirement: String) -> RunState {
        match validate_requirement(&requirement) {
            Ok(trimmed) => RunState::Analyzing {
                requirement: trimmed.to_string(),
            },
            Err(cause) => RunState::failed(Stage::Idle, cause),
        }
    }

    async fn analyze(&self, requirement: &str) -> RunState {
        match self.analyzer.analyze(requirement).await {
            Ok(criteria) => RunState::Researching { criteria },
            Err(cause) => RunState::failed(Stage::Analyzing, cause),
        }
    }

    async fn research(&self, criteria: RequirementCriteria) -> RunState {
        match self.researcher.research(&criteria).await {
            Ok(candidates) => RunState::Evaluating {
                criteria,
                candidates,
            },
            Err(cause) => RunState::failed(Stage::Researching, cause),
        }
    }

    fn evaluate(&self, criteria: RequirementCriteria, candidates: Vec<CandidateRecord>) -> RunState {
        RunState::Done(self.evaluator.evaluate(&candidates, &criteria))
    }
}
