//! Progress event broadcasting
//!
//! The orchestrator emits one event per lifecycle step onto a
//! `tokio::sync::broadcast` channel. Subscribers that fall behind lose old
//! events; nobody listening is not an error.

use crate::types::{AnalysisStage, StageProgress};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Default channel capacity
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    Started {
        analysis_id: Uuid,
    },
    StageCompleted {
        analysis_id: Uuid,
        stage: AnalysisStage,
        fell_back: bool,
        progress: StageProgress,
    },
    Completed {
        analysis_id: Uuid,
        elapsed_ms: u64,
        stages_fallen_back: usize,
    },
    Failed {
        analysis_id: Uuid,
        message: String,
    },
}

impl ProgressEvent {
    pub fn analysis_id(&self) -> Uuid {
        match self {
            Self::Started { analysis_id }
            | Self::StageCompleted { analysis_id, .. }
            | Self::Completed { analysis_id, .. }
            | Self::Failed { analysis_id, .. } => *analysis_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Returns true if at least one subscriber received the event
    pub fn emit(&self, event: ProgressEvent) -> bool {
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(receivers, "Progress event broadcast");
                true
            }
            Err(broadcast::error::SendError(event)) => {
                debug!(analysis_id = %event.analysis_id(), "No progress subscribers");
                false
            }
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
