//! Analysis state machine
//!
//! One session per `analyze` call: IDLE → ANALYZING → {COMPLETE, ERROR}.
//! Nothing here is shared between invocations.

use crate::types::{AnalysisResult, AnalysisStage, StageProgress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Analysis lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnalysisState {
    /// Created, not started
    Idle,
    /// Stages running
    Analyzing,
    /// All stages finished (fallbacks included)
    Complete,
    /// Failure outside every stage's fallback
    Error,
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub analysis_id: Uuid,
    pub old_state: AnalysisState,
    pub new_state: AnalysisState,
    pub transitioned_at: DateTime<Utc>,
}

/// In-memory analysis session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSession {
    pub analysis_id: Uuid,
    pub state: AnalysisState,
    /// Per-stage completion flags
    pub progress: StageProgress,
    /// Stages whose value came from a fallback tier, in completion order
    pub fallback_stages: Vec<AnalysisStage>,
    /// Present once COMPLETE
    pub result: Option<AnalysisResult>,
    /// User-facing message, present once ERROR
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self {
            analysis_id: Uuid::new_v4(),
            state: AnalysisState::Idle,
            progress: StageProgress::default(),
            fallback_stages: Vec::new(),
            result: None,
            error: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to new state
    pub fn transition_to(&mut self, new_state: AnalysisState) -> StateTransition {
        let transition = StateTransition {
            analysis_id: self.analysis_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        match new_state {
            AnalysisState::Analyzing => {
                self.progress = StageProgress::default();
                self.fallback_stages.clear();
                self.result = None;
                self.error = None;
                self.started_at = transition.transitioned_at;
                self.ended_at = None;
            }
            AnalysisState::Complete | AnalysisState::Error => {
                self.ended_at = Some(transition.transitioned_at);
            }
            AnalysisState::Idle => {}
        }

        transition
    }

    /// Record a finished stage
    pub fn complete_stage(&mut self, stage: AnalysisStage, fell_back: bool) {
        self.progress.mark(stage);
        if fell_back && !self.fallback_stages.contains(&stage) {
            self.fallback_stages.push(stage);
        }
    }

    pub fn finish(&mut self, result: AnalysisResult) -> StateTransition {
        self.result = Some(result);
        self.transition_to(AnalysisState::Complete)
    }

    pub fn fail(&mut self, message: impl Into<String>) -> StateTransition {
        let transition = self.transition_to(AnalysisState::Error);
        self.error = Some(message.into());
        transition
    }

    /// Check if session is terminal (finished)
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, AnalysisState::Complete | AnalysisState::Error)
    }
}

impl Default for AnalysisSession {
    fn default() -> Self {
        Self::new()
    }
}
