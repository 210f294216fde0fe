//! Guarded on-chain push of a validated observation set.

use crate::{OracleContext, PushError};
use dor_aggregation::aggregate;
use dor_registry::RateUpdate;
use dor_resilience::{BreakerError, RetryPolicy};
use dor_types::{DryRunReport, PushOutcome, RateObservation, SourceProjection};
use std::time::Duration;
use tracing::{info, warn};

pub struct RatePusher {
	context: OracleContext,
	retry: RetryPolicy,
}

impl RatePusher {
	pub fn new(context: OracleContext) -> Self {
		let retry = RetryPolicy::from_config(&context.config.registry.retry);
		Self { context, retry }
	}

	/// Pushes the per-source rates behind the circuit breaker.
	///
	/// Transient registry failures are retried inside a single breaker call,
	/// so one exhausted push counts as one breaker failure. Authorization and
	/// cost-cap rejections return immediately.
	pub async fn push(&self, observations: &[RateObservation]) -> Result<PushOutcome, PushError> {
		self.context
			.breaker
			.execute(|| {
				self.retry
					.with_retry_if(|| self.submit_once(observations), PushError::is_retryable)
			})
			.await
			.map_err(|e| match e {
				BreakerError::Open { retry_in } => {
					warn!("Push skipped, circuit breaker open for another {:?}", retry_in);
					PushError::BreakerOpen { retry_in }
				}
				BreakerError::Inner(e) => e,
			})
	}

	async fn submit_once(&self, observations: &[RateObservation]) -> Result<PushOutcome, PushError> {
		let registry = &self.context.registry;
		let registry_config = &self.context.config.registry;

		let prior_dor_bps = registry.current_rate().await?;
		let local_dor_bps = aggregate(observations)?.dor_bps;

		if !registry.is_authorized().await? {
			return Err(PushError::Unauthorized);
		}

		self.check_large_change(prior_dor_bps, local_dor_bps);

		let update = RateUpdate::from_observations(observations);
		let (gas, _) = self.estimate_gas(&update).await;
		let gas_price = registry.gas_price().await?;
		let estimated = u128::from(gas).saturating_mul(gas_price);
		if estimated > registry_config.max_tx_cost_wei {
			return Err(PushError::CostCapExceeded {
				estimated,
				max: registry_config.max_tx_cost_wei,
			});
		}

		let tx = registry.submit_update(&update).await?;
		let receipt = registry
			.wait_for_confirmation(
				&tx,
				Duration::from_secs(registry_config.confirmation_timeout_secs),
			)
			.await?;
		if !receipt.success {
			return Err(PushError::Reverted { tx });
		}

		let new_dor_bps = registry.current_rate().await?;
		let tolerance = self.context.config.oracle.mismatch_tolerance_bps;
		if (new_dor_bps - local_dor_bps).abs() > tolerance {
			warn!(
				onchain_bps = new_dor_bps,
				local_bps = local_dor_bps,
				tolerance_bps = tolerance,
				"On-chain rate differs from the locally computed rate"
			);
		}

		info!(
			tx_hash = %receipt.tx_hash,
			block = receipt.block_number,
			gas_used = receipt.gas_used,
			prior_bps = prior_dor_bps,
			new_bps = new_dor_bps,
			"Rate update confirmed"
		);

		Ok(PushOutcome {
			tx_id: receipt.tx_hash,
			block_number: receipt.block_number,
			gas_used: receipt.gas_used,
			prior_dor_bps,
			new_dor_bps,
			locally_computed_dor_bps: local_dor_bps,
		})
	}

	/// Projects the push without submitting anything.
	///
	/// An unauthorized signer or a cost above the cap is reported, not raised.
	pub async fn dry_run(&self, observations: &[RateObservation]) -> Result<DryRunReport, PushError> {
		let registry = &self.context.registry;
		let registry_config = &self.context.config.registry;

		let prior_dor_bps = registry.current_rate().await?;
		let rate = aggregate(observations)?;

		let authorized = registry.is_authorized().await?;
		if !authorized {
			warn!("Signer is not an authorized updater, a real push would be rejected");
		}

		self.check_large_change(prior_dor_bps, rate.dor_bps);

		let table = match registry.source_table().await {
			Ok(table) => table,
			Err(e) => {
				warn!(error = %e, "Could not read on-chain source table");
				Vec::new()
			}
		};

		let update = RateUpdate::from_observations(observations);
		let (estimated_gas, gas_estimated) = self.estimate_gas(&update).await;
		let gas_price_wei = registry.gas_price().await?;
		let estimated_cost_wei = u128::from(estimated_gas).saturating_mul(gas_price_wei);
		if estimated_cost_wei > registry_config.max_tx_cost_wei {
			warn!(
				estimated_cost_wei,
				max_tx_cost_wei = registry_config.max_tx_cost_wei,
				"Projected cost exceeds the cap, a real push would be rejected"
			);
		}

		let sources = rate
			.observations
			.iter()
			.map(|obs| SourceProjection {
				source_id: obs.source_id,
				onchain_rate_bps: table
					.iter()
					.find(|info| info.source_id == obs.source_id)
					.map(|info| info.rate_bps),
				new_rate_bps: obs.rate_bps,
				is_live: obs.is_live,
			})
			.collect();

		let report = DryRunReport {
			prior_dor_bps,
			projected_dor_bps: rate.dor_bps,
			delta_bps: rate.dor_bps - prior_dor_bps,
			estimated_gas,
			gas_estimated,
			gas_price_wei,
			estimated_cost_wei,
			authorized,
			sources,
		};

		info!(
			prior_bps = report.prior_dor_bps,
			projected_bps = report.projected_dor_bps,
			delta_bps = report.delta_bps,
			estimated_gas = report.estimated_gas,
			"Dry run: projected rate transition"
		);

		Ok(report)
	}

	fn check_large_change(&self, prior_bps: i64, local_bps: i64) {
		let threshold = self.context.config.oracle.large_change_bps;
		if (local_bps - prior_bps).abs() > threshold {
			warn!(
				prior_bps,
				local_bps,
				threshold_bps = threshold,
				"Large rate change"
			);
		}
	}

	/// Gas for the update and whether it came from estimation.
	async fn estimate_gas(&self, update: &RateUpdate) -> (u64, bool) {
		match self.context.registry.estimate_update_gas(update).await {
			Ok(gas) => (gas, true),
			Err(e) => {
				let fallback = self.context.config.registry.default_gas_limit;
				warn!(error = %e, gas_limit = fallback, "Gas estimation failed, using default limit");
				(fallback, false)
			}
		}
	}
}
