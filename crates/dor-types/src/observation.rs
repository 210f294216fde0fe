//! Per-source rate readings.

use crate::source::SourceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origin marker for observations that use the static fallback rate.
pub const FALLBACK_ORIGIN: &str = "fallback";

/// One source's reading for a collection cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateObservation {
	pub source_id: SourceId,
	/// Rate in basis points. Signed so that validation can reject bad readings.
	pub rate_bps: i64,
	pub observed_at: DateTime<Utc>,
	/// Host of the endpoint that produced the value, or [`FALLBACK_ORIGIN`].
	pub origin: String,
	pub is_live: bool,
}

impl RateObservation {
	/// Creates an observation from a live endpoint reading given in percent.
	pub fn live(source_id: SourceId, percent: f64, origin: impl Into<String>) -> Self {
		Self {
			source_id,
			rate_bps: percent_to_bps(percent),
			observed_at: Utc::now(),
			origin: origin.into(),
			is_live: true,
		}
	}

	/// Creates a fallback observation with the given static rate.
	pub fn fallback(source_id: SourceId, rate_bps: i64) -> Self {
		Self {
			source_id,
			rate_bps,
			observed_at: Utc::now(),
			origin: FALLBACK_ORIGIN.to_string(),
			is_live: false,
		}
	}

	pub fn with_observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
		self.observed_at = observed_at;
		self
	}
}

/// Converts a percentage (4.25 meaning 4.25%) to whole basis points.
pub fn percent_to_bps(percent: f64) -> i64 {
	(percent * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_percent_to_bps_rounds() {
		assert_eq!(percent_to_bps(4.25), 425);
		assert_eq!(percent_to_bps(3.456), 346);
		assert_eq!(percent_to_bps(0.004), 0);
		assert_eq!(percent_to_bps(12.0), 1200);
	}

	#[test]
	fn test_fallback_marker() {
		let obs = RateObservation::fallback(SourceId::Sofr, 430);
		assert!(!obs.is_live);
		assert_eq!(obs.origin, FALLBACK_ORIGIN);
		assert_eq!(obs.rate_bps, 430);
	}
}
