//! Observation-set validation results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
	InsufficientSources,
	NegativeRate,
	DuplicateSource,
	ImplausibleRate,
	StaleObservation,
	ExcessiveFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
	pub kind: IssueKind,
	pub message: String,
}

impl ValidationIssue {
	pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
		}
	}
}

impl fmt::Display for ValidationIssue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.message)
	}
}

/// Outcome of validating an observation set.
///
/// Errors make the set unusable for a push. Warnings are informational.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
	pub valid: bool,
	pub warnings: Vec<ValidationIssue>,
	pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
	pub fn has_warning(&self, kind: IssueKind) -> bool {
		self.warnings.iter().any(|w| w.kind == kind)
	}

	pub fn has_error(&self, kind: IssueKind) -> bool {
		self.errors.iter().any(|e| e.kind == kind)
	}

	/// Joins all error messages, for failure reports.
	pub fn error_summary(&self) -> String {
		self.errors
			.iter()
			.map(|e| e.message.as_str())
			.collect::<Vec<_>>()
			.join("; ")
	}
}
