//! Aggregation results and on-chain push reports.

use crate::observation::RateObservation;
use crate::source::SourceId;
use serde::{Deserialize, Serialize};

/// The aggregated reference rate for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceRate {
	pub dor_bps: i64,
	/// Observations that contributed, ordered by on-chain index.
	pub observations: Vec<RateObservation>,
	pub live_count: usize,
	pub fallback_count: usize,
	/// Sum of the weights of the sources present in `observations`.
	pub total_weight_bps: i64,
}

impl ReferenceRate {
	/// Percentage representation, for display only.
	pub fn dor_percent(&self) -> f64 {
		self.dor_bps as f64 / 100.0
	}
}

/// Result of a confirmed push to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushOutcome {
	pub tx_id: String,
	pub block_number: u64,
	pub gas_used: u64,
	pub prior_dor_bps: i64,
	pub new_dor_bps: i64,
	pub locally_computed_dor_bps: i64,
}

/// Projected change for a single source in a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceProjection {
	pub source_id: SourceId,
	pub onchain_rate_bps: Option<i64>,
	pub new_rate_bps: i64,
	pub is_live: bool,
}

/// Projected state transition computed without submitting anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DryRunReport {
	pub prior_dor_bps: i64,
	pub projected_dor_bps: i64,
	pub delta_bps: i64,
	pub estimated_gas: u64,
	/// False when estimation failed and the default gas limit was used.
	pub gas_estimated: bool,
	#[serde(with = "wei_amount")]
	pub gas_price_wei: u128,
	#[serde(with = "wei_amount")]
	pub estimated_cost_wei: u128,
	pub authorized: bool,
	pub sources: Vec<SourceProjection>,
}

/// Wei amounts as decimal strings.
///
/// serde_json cannot read a `u128` back through the buffered content of an
/// internally tagged enum such as `CycleOutcome`.
mod wei_amount {
	use serde::{de::Error, Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(value)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
		let raw = String::deserialize(deserializer)?;
		raw.parse().map_err(D::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_wei_amounts_are_decimal_strings() {
		let report = DryRunReport {
			prior_dor_bps: 440,
			projected_dor_bps: 453,
			delta_bps: 13,
			estimated_gas: 500_000,
			gas_estimated: false,
			gas_price_wei: 1_000_000_000,
			estimated_cost_wei: u128::MAX,
			authorized: true,
			sources: Vec::new(),
		};

		let json = serde_json::to_value(&report).unwrap();
		assert_eq!(json["gas_price_wei"], "1000000000");
		assert_eq!(json["estimated_cost_wei"], u128::MAX.to_string());

		let back: DryRunReport = serde_json::from_value(json).unwrap();
		assert_eq!(back, report);
	}
}
