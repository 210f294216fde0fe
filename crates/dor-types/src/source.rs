//! The closed set of rate sources that feed the DOR.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sum of all source weights, in basis points.
pub const TOTAL_WEIGHT_BPS: i64 = 10_000;

/// Identifier of an upstream rate source.
///
/// The set is fixed: each source carries a display name, an aggregation
/// weight, the `uint8` index used by the registry contract and a conservative
/// rate used when no live endpoint answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceId {
	Tesr,
	Meth,
	Sofr,
	AaveUsdt,
	OndoUsdy,
}

impl SourceId {
	/// All sources, ordered by on-chain index.
	pub const ALL: [SourceId; 5] = [
		SourceId::Tesr,
		SourceId::Meth,
		SourceId::Sofr,
		SourceId::AaveUsdt,
		SourceId::OndoUsdy,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			SourceId::Tesr => "TESR",
			SourceId::Meth => "METH",
			SourceId::Sofr => "SOFR",
			SourceId::AaveUsdt => "AAVE_USDT",
			SourceId::OndoUsdy => "ONDO_USDY",
		}
	}

	pub fn display_name(&self) -> &'static str {
		match self {
			SourceId::Tesr => "Treehouse Ethereum Staking Rate",
			SourceId::Meth => "Mantle Staked ETH",
			SourceId::Sofr => "Secured Overnight Financing Rate",
			SourceId::AaveUsdt => "Aave V3 USDT Supply",
			SourceId::OndoUsdy => "Ondo USDY",
		}
	}

	/// Aggregation weight in basis points of [`TOTAL_WEIGHT_BPS`].
	pub fn weight_bps(&self) -> i64 {
		match self {
			SourceId::Tesr => 2000,
			SourceId::Meth => 3000,
			SourceId::Sofr => 2500,
			SourceId::AaveUsdt => 1500,
			SourceId::OndoUsdy => 1000,
		}
	}

	/// Source identifier used by the registry contract.
	pub fn index(&self) -> u8 {
		match self {
			SourceId::Tesr => 0,
			SourceId::Meth => 1,
			SourceId::Sofr => 2,
			SourceId::AaveUsdt => 3,
			SourceId::OndoUsdy => 4,
		}
	}

	pub fn from_index(index: u8) -> Option<Self> {
		Self::ALL.get(index as usize).copied()
	}

	/// Static rate substituted when every live endpoint fails.
	pub fn fallback_bps(&self) -> i64 {
		match self {
			SourceId::Tesr => 300,
			SourceId::Meth => 350,
			SourceId::Sofr => 430,
			SourceId::AaveUsdt => 400,
			SourceId::OndoUsdy => 450,
		}
	}
}

impl fmt::Display for SourceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Error)]
#[error("Unknown rate source: {0}")]
pub struct UnknownSource(pub String);

impl FromStr for SourceId {
	type Err = UnknownSource;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
		Self::ALL
			.iter()
			.copied()
			.find(|id| id.as_str() == normalized)
			.ok_or_else(|| UnknownSource(s.to_string()))
	}
}
