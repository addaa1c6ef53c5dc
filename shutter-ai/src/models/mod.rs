//! Per-invocation state models

pub mod analysis_session;

pub use analysis_session::{AnalysisSession, AnalysisState, StateTransition};
