//! HTTP JSON collector.

use crate::parsers::extract_percent;
use crate::{RateSourceInterface, SourceError};
use async_trait::async_trait;
use dor_resilience::RetryPolicy;
use dor_types::{EndpointConfig, RateObservation, RateParser, SourceId};
use reqwest::{Client, Url};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct Endpoint {
	url: Url,
	host: String,
	parser: RateParser,
}

/// Collector for one source backed by an ordered list of HTTP endpoints.
pub struct HttpSourceCollector {
	source_id: SourceId,
	endpoints: Vec<Endpoint>,
	fallback_bps: i64,
	retry: RetryPolicy,
	client: Client,
}

impl HttpSourceCollector {
	pub fn new(
		source_id: SourceId,
		endpoints: &[EndpointConfig],
		fallback_bps: i64,
		retry: RetryPolicy,
		client: Client,
	) -> Result<Self, SourceError> {
		let endpoints = endpoints
			.iter()
			.map(|config| {
				let url = Url::parse(&config.url)
					.map_err(|e| SourceError::InvalidUrl(format!("{}: {}", config.url, e)))?;
				let host = url
					.host_str()
					.ok_or_else(|| SourceError::InvalidUrl(format!("{}: no host", config.url)))?
					.to_string();
				Ok(Endpoint {
					url,
					host,
					parser: config.parser.clone(),
				})
			})
			.collect::<Result<Vec<_>, SourceError>>()?;

		Ok(Self {
			source_id,
			endpoints,
			fallback_bps,
			retry,
			client,
		})
	}

	async fn fetch(&self, endpoint: &Endpoint) -> Result<f64, SourceError> {
		let response = self.client.get(endpoint.url.clone()).send().await?;

		let status = response.status();
		if !status.is_success() {
			return Err(SourceError::Status(status.as_u16()));
		}

		let body: serde_json::Value = response.json().await?;
		extract_percent(&endpoint.parser, &body)
	}
}

#[async_trait]
impl RateSourceInterface for HttpSourceCollector {
	fn source_id(&self) -> SourceId {
		self.source_id
	}

	async fn collect(&self) -> RateObservation {
		for endpoint in &self.endpoints {
			debug!(source = %self.source_id, host = %endpoint.host, "Fetching rate");

			match self.retry.with_retry(|| self.fetch(endpoint)).await {
				Ok(percent) => {
					let observation =
						RateObservation::live(self.source_id, percent, endpoint.host.clone());
					info!(
						source = %self.source_id,
						host = %endpoint.host,
						rate_bps = observation.rate_bps,
						"Collected live rate"
					);
					return observation;
				}
				Err(e) => {
					warn!(
						source = %self.source_id,
						host = %endpoint.host,
						error = %e,
						"Endpoint exhausted, trying next"
					);
				}
			}
		}

		warn!(
			source = %self.source_id,
			fallback_bps = self.fallback_bps,
			"All endpoints failed, using fallback rate"
		);
		RateObservation::fallback(self.source_id, self.fallback_bps)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use dor_types::RateScale;
	use serde_json::json;
	use std::time::Duration;
	use wiremock::matchers::{method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	fn quick_retry() -> RetryPolicy {
		RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2), 2.0)
	}

	fn endpoint(server: &MockServer, route: &str, pointer: &str) -> EndpointConfig {
		EndpointConfig {
			url: format!("{}{}", server.uri(), route),
			parser: RateParser::Field {
				pointers: vec![pointer.to_string()],
				scale: RateScale::Percent,
			},
		}
	}

	fn collector(endpoints: &[EndpointConfig]) -> HttpSourceCollector {
		HttpSourceCollector::new(
			SourceId::Tesr,
			endpoints,
			300,
			quick_retry(),
			Client::builder()
				.timeout(Duration::from_secs(2))
				.build()
				.unwrap(),
		)
		.unwrap()
	}

	#[tokio::test]
	async fn test_primary_success_is_live() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/tesr"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rate": 3.456 })))
			.expect(1)
			.mount(&server)
			.await;

		let obs = collector(&[endpoint(&server, "/tesr", "/rate")])
			.collect()
			.await;

		assert!(obs.is_live);
		assert_eq!(obs.rate_bps, 346);
		assert_eq!(obs.origin, "127.0.0.1");
	}

	#[tokio::test]
	async fn test_failing_primary_falls_through_to_secondary() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/primary"))
			.respond_with(ResponseTemplate::new(500))
			.expect(3)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path("/secondary"))
			.respond_with(
				ResponseTemplate::new(200).set_body_json(json!({ "data": { "apy": "4.10" } })),
			)
			.expect(1)
			.mount(&server)
			.await;

		let obs = collector(&[
			endpoint(&server, "/primary", "/rate"),
			endpoint(&server, "/secondary", "/data/apy"),
		])
		.collect()
		.await;

		assert!(obs.is_live);
		assert_eq!(obs.rate_bps, 410);
	}

	#[tokio::test]
	async fn test_unparseable_body_is_retried_then_falls_back() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path("/tesr"))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rate": null })))
			.expect(3)
			.mount(&server)
			.await;

		let obs = collector(&[endpoint(&server, "/tesr", "/rate")])
			.collect()
			.await;

		assert!(!obs.is_live);
		assert_eq!(obs.rate_bps, 300);
		assert_eq!(obs.origin, dor_types::FALLBACK_ORIGIN);
	}

	#[tokio::test]
	async fn test_all_endpoints_failing_yields_fallback() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(503))
			.expect(6)
			.mount(&server)
			.await;

		let obs = collector(&[
			endpoint(&server, "/a", "/rate"),
			endpoint(&server, "/b", "/rate"),
		])
		.collect()
		.await;

		assert!(!obs.is_live);
		assert_eq!(obs.source_id, SourceId::Tesr);
	}

	#[test]
	fn test_url_without_host_is_rejected() {
		let result = HttpSourceCollector::new(
			SourceId::Sofr,
			&[EndpointConfig {
				url: "file:///tmp/rates.json".to_string(),
				parser: RateParser::Field {
					pointers: vec!["/rate".to_string()],
					scale: RateScale::Percent,
				},
			}],
			430,
			quick_retry(),
			Client::new(),
		);
		assert!(matches!(result, Err(SourceError::InvalidUrl(_))));
	}
}
