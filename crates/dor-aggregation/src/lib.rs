//! Weighted aggregation and validation of rate observations.
//!
//! Both functions are pure: the same observation set always produces the
//! same rate and the same report, and inputs are never modified.

use chrono::{DateTime, Duration, Utc};
use dor_types::{
	IssueKind, RateObservation, ReferenceRate, SourceId, ValidationIssue, ValidationReport,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Minimum number of distinct sources for a usable set.
pub const MIN_SOURCES: usize = 3;
/// Rates above this (50%) are flagged as implausible.
pub const IMPLAUSIBLE_RATE_BPS: i64 = 5_000;
/// Fallback observations beyond this count are flagged.
pub const MAX_FALLBACK_SOURCES: usize = 2;
/// Observations older than this are flagged as stale.
pub const STALE_AFTER_HOURS: i64 = 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregationError {
	#[error("No observations to aggregate")]
	Empty,
}

/// Weighted mean of `(rate, weight)` pairs, rounded half away from zero.
///
/// Returns `None` when the total weight is not positive.
pub fn weighted_mean(pairs: &[(i64, i64)]) -> Option<i64> {
	let total_weight: i128 = pairs.iter().map(|(_, w)| *w as i128).sum();
	if total_weight <= 0 {
		return None;
	}

	let numerator: i128 = pairs
		.iter()
		.map(|(rate, weight)| *rate as i128 * *weight as i128)
		.sum();

	let half = total_weight / 2;
	let rounded = if numerator >= 0 {
		(numerator + half) / total_weight
	} else {
		-((-numerator + half) / total_weight)
	};

	Some(rounded as i64)
}

/// Keeps the first observation of each source, ordered by on-chain index.
fn by_source(observations: &[RateObservation]) -> BTreeMap<SourceId, &RateObservation> {
	let mut map = BTreeMap::new();
	for obs in observations {
		map.entry(obs.source_id).or_insert(obs);
	}
	map
}

/// Computes the reference rate from a set of observations.
///
/// Each source contributes with its fixed weight. A source missing from the
/// set is left out of the denominator, so the remaining weights renormalize.
pub fn aggregate(observations: &[RateObservation]) -> Result<ReferenceRate, AggregationError> {
	let present = by_source(observations);
	if present.is_empty() {
		return Err(AggregationError::Empty);
	}

	let pairs: Vec<(i64, i64)> = present
		.values()
		.map(|obs| (obs.rate_bps, obs.source_id.weight_bps()))
		.collect();
	let total_weight_bps: i64 = pairs.iter().map(|(_, w)| w).sum();
	let dor_bps = weighted_mean(&pairs).ok_or(AggregationError::Empty)?;

	let observations: Vec<RateObservation> = present.into_values().cloned().collect();
	let live_count = observations.iter().filter(|o| o.is_live).count();

	debug!(
		dor_bps,
		total_weight_bps,
		sources = observations.len(),
		"Aggregated reference rate"
	);

	Ok(ReferenceRate {
		dor_bps,
		fallback_count: observations.len() - live_count,
		live_count,
		observations,
		total_weight_bps,
	})
}

/// Checks an observation set against the pipeline's acceptance rules.
///
/// Errors: fewer than [`MIN_SOURCES`] distinct sources, a negative rate, or a
/// source reported twice. Warnings: a rate above [`IMPLAUSIBLE_RATE_BPS`], an
/// observation older than [`STALE_AFTER_HOURS`] relative to `now`, or more
/// than [`MAX_FALLBACK_SOURCES`] fallback observations.
pub fn validate(observations: &[RateObservation], now: DateTime<Utc>) -> ValidationReport {
	let mut errors = Vec::new();
	let mut warnings = Vec::new();

	let mut seen: BTreeMap<SourceId, usize> = BTreeMap::new();
	for obs in observations {
		*seen.entry(obs.source_id).or_default() += 1;
	}

	if seen.len() < MIN_SOURCES {
		errors.push(ValidationIssue::new(
			IssueKind::InsufficientSources,
			format!(
				"Only {} of {} sources present, need at least {}",
				seen.len(),
				SourceId::ALL.len(),
				MIN_SOURCES
			),
		));
	}

	for (source, count) in &seen {
		if *count > 1 {
			errors.push(ValidationIssue::new(
				IssueKind::DuplicateSource,
				format!("{} reported {} times", source, count),
			));
		}
	}

	let stale_after = Duration::hours(STALE_AFTER_HOURS);
	for obs in observations {
		if obs.rate_bps < 0 {
			errors.push(ValidationIssue::new(
				IssueKind::NegativeRate,
				format!("{} has negative rate {} bps", obs.source_id, obs.rate_bps),
			));
		}

		if obs.rate_bps > IMPLAUSIBLE_RATE_BPS {
			warnings.push(ValidationIssue::new(
				IssueKind::ImplausibleRate,
				format!(
					"{} rate {} bps exceeds {} bps",
					obs.source_id, obs.rate_bps, IMPLAUSIBLE_RATE_BPS
				),
			));
		}

		if now.signed_duration_since(obs.observed_at) > stale_after {
			warnings.push(ValidationIssue::new(
				IssueKind::StaleObservation,
				format!(
					"{} observation from {} is older than {}h",
					obs.source_id, obs.observed_at, STALE_AFTER_HOURS
				),
			));
		}
	}

	let fallback_count = observations.iter().filter(|o| !o.is_live).count();
	if fallback_count > MAX_FALLBACK_SOURCES {
		warnings.push(ValidationIssue::new(
			IssueKind::ExcessiveFallback,
			format!(
				"{} of {} sources are using fallback values",
				fallback_count,
				observations.len()
			),
		));
	}

	ValidationReport {
		valid: errors.is_empty(),
		warnings,
		errors,
	}
}

/// [`validate`] against the current wall clock.
pub fn validate_now(observations: &[RateObservation]) -> ValidationReport {
	validate(observations, Utc::now())
}
