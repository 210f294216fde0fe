//! Built-in endpoint chains.
//!
//! Yield aggregators come before protocol APIs because they tend to keep a
//! stable schema across protocol upgrades.

use dor_types::{EndpointConfig, RateParser, RateScale, SourceId};
use std::collections::BTreeMap;

const DEFILLAMA_POOLS: &str = "https://yields.llama.fi/pools";

fn field(url: &str, pointers: &[&str], scale: RateScale) -> EndpointConfig {
	EndpointConfig {
		url: url.to_string(),
		parser: RateParser::Field {
			pointers: pointers.iter().map(|p| p.to_string()).collect(),
			scale,
		},
	}
}

fn llama_pool(filter: &[(&str, &str)]) -> EndpointConfig {
	EndpointConfig {
		url: DEFILLAMA_POOLS.to_string(),
		parser: RateParser::PoolLookup {
			array: "/data".to_string(),
			filter: filter
				.iter()
				.map(|(k, v)| (k.to_string(), v.to_string()))
				.collect::<BTreeMap<_, _>>(),
			pointers: vec!["/apy".to_string(), "/apyBase".to_string()],
			scale: RateScale::Percent,
		},
	}
}

/// Ordered endpoints for `source`, primary first.
pub fn default_endpoints(source: SourceId) -> Vec<EndpointConfig> {
	match source {
		SourceId::Tesr => vec![
			field(
				"https://api.treehouse.finance/v1/tesr",
				&["/rate", "/tesr", "/data/rate"],
				RateScale::Percent,
			),
			field(
				"https://api.treehouse.finance/v1/teth/apr",
				&["/apr", "/data/apr"],
				RateScale::Fraction,
			),
		],
		SourceId::Meth => vec![
			llama_pool(&[("project", "meth-protocol"), ("symbol", "METH")]),
			field(
				"https://meth.mantle.xyz/api/stat/apy",
				&["/apy", "/data/apy", "/value"],
				RateScale::Percent,
			),
		],
		SourceId::Sofr => vec![
			EndpointConfig {
				url: "https://markets.newyorkfed.org/api/rates/secured/sofr/last/1.json"
					.to_string(),
				parser: RateParser::SeriesLatest {
					array: "/refRates".to_string(),
					pointers: vec!["/percentRate".to_string()],
					scale: RateScale::Percent,
				},
			},
		],
		SourceId::AaveUsdt => vec![llama_pool(&[
			("project", "aave-v3"),
			("chain", "Ethereum"),
			("symbol", "USDT"),
		])],
		SourceId::OndoUsdy => vec![
			llama_pool(&[("project", "ondo-finance"), ("symbol", "USDY")]),
			field(
				"https://api.ondo.finance/v1/usdy/apy",
				&["/apy", "/data/apy", "/rate"],
				RateScale::Percent,
			),
		],
	}
}
