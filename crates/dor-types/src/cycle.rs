//! Cycle records reported to logs and persistence.

use crate::observation::RateObservation;
use crate::rate::{DryRunReport, PushOutcome};
use crate::validation::ValidationReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How a cycle ends once the rate is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleMode {
	/// Collect, aggregate and push on-chain.
	Run,
	/// Collect, aggregate and project the push without submitting.
	DryRun,
}

/// Pipeline stage at which a cycle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
	Validation,
	Aggregation,
	Push,
	BreakerOpen,
}

impl fmt::Display for FailureStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			FailureStage::Validation => "validation",
			FailureStage::Aggregation => "aggregation",
			FailureStage::Push => "push",
			FailureStage::BreakerOpen => "breaker_open",
		};
		f.write_str(name)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
	Pushed(PushOutcome),
	DryRun(DryRunReport),
	Failed { stage: FailureStage, message: String },
}

/// Everything that happened during one oracle cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
	pub id: Uuid,
	pub mode: CycleMode,
	pub started_at: DateTime<Utc>,
	pub finished_at: DateTime<Utc>,
	pub observations: Vec<RateObservation>,
	pub validation: ValidationReport,
	pub dor_bps: Option<i64>,
	pub outcome: CycleOutcome,
}

impl CycleRecord {
	pub fn is_success(&self) -> bool {
		!matches!(self.outcome, CycleOutcome::Failed { .. })
	}

	pub fn failure(&self) -> Option<(FailureStage, &str)> {
		match &self.outcome {
			CycleOutcome::Failed { stage, message } => Some((*stage, message.as_str())),
			_ => None,
		}
	}
}
