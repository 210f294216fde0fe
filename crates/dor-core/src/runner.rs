//! Cycle orchestration and scheduling.

use crate::{OracleContext, PushError, RatePusher};
use chrono::Utc;
use dor_aggregation::{aggregate, validate};
use dor_sources::RateSourceInterface;
use dor_storage::StorageService;
use dor_types::{CycleMode, CycleOutcome, CycleRecord, FailureStage, RateObservation};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Runs oracle cycles against a fixed set of sources.
pub struct OracleRunner {
	sources: Vec<Arc<dyn RateSourceInterface>>,
	pusher: RatePusher,
	storage: Option<Arc<StorageService>>,
}

impl OracleRunner {
	pub fn new(context: OracleContext, sources: Vec<Arc<dyn RateSourceInterface>>) -> Self {
		Self {
			sources,
			pusher: RatePusher::new(context),
			storage: None,
		}
	}

	/// Records every finished cycle in `storage`.
	pub fn with_storage(mut self, storage: Arc<StorageService>) -> Self {
		self.storage = Some(storage);
		self
	}

	/// Collects from every source concurrently and waits for all of them.
	///
	/// A collector task that panics contributes no observation. The result is
	/// ordered by on-chain source index.
	pub async fn collect(&self) -> Vec<RateObservation> {
		let mut tasks = JoinSet::new();
		for source in &self.sources {
			let source = Arc::clone(source);
			tasks.spawn(async move { source.collect().await });
		}

		let mut observations = Vec::with_capacity(self.sources.len());
		while let Some(joined) = tasks.join_next().await {
			match joined {
				Ok(observation) => observations.push(observation),
				Err(e) => error!(error = %e, "Collector task failed, source will be missing"),
			}
		}

		observations.sort_by_key(|obs| obs.source_id.index());
		observations
	}

	/// Runs one full cycle. Failures are reported in the record, never raised.
	pub async fn run_cycle(&self, mode: CycleMode) -> CycleRecord {
		let id = Uuid::new_v4();
		let started_at = Utc::now();
		info!(cycle_id = %id, ?mode, "Starting cycle");

		let observations = self.collect().await;
		let validation = validate(&observations, Utc::now());
		for warning in &validation.warnings {
			warn!(cycle_id = %id, kind = ?warning.kind, "{}", warning);
		}

		let (dor_bps, outcome) = if !validation.valid {
			(
				None,
				CycleOutcome::Failed {
					stage: FailureStage::Validation,
					message: validation.error_summary(),
				},
			)
		} else {
			match aggregate(&observations) {
				Err(e) => (
					None,
					CycleOutcome::Failed {
						stage: FailureStage::Aggregation,
						message: e.to_string(),
					},
				),
				Ok(rate) => {
					info!(
						cycle_id = %id,
						dor_bps = rate.dor_bps,
						live = rate.live_count,
						fallback = rate.fallback_count,
						"Computed reference rate"
					);
					let outcome = match mode {
						CycleMode::DryRun => match self.pusher.dry_run(&observations).await {
							Ok(report) => CycleOutcome::DryRun(report),
							Err(e) => push_failure(e),
						},
						CycleMode::Run => match self.pusher.push(&observations).await {
							Ok(pushed) => CycleOutcome::Pushed(pushed),
							Err(e) => push_failure(e),
						},
					};
					(Some(rate.dor_bps), outcome)
				}
			}
		};

		let record = CycleRecord {
			id,
			mode,
			started_at,
			finished_at: Utc::now(),
			observations,
			validation,
			dor_bps,
			outcome,
		};

		match record.failure() {
			Some((stage, message)) => {
				error!(cycle_id = %id, %stage, "Cycle failed: {}", message)
			}
			None => info!(cycle_id = %id, dor_bps = ?record.dor_bps, "Cycle completed"),
		}

		self.persist(&record).await;
		record
	}

	async fn persist(&self, record: &CycleRecord) {
		if let Some(storage) = &self.storage {
			if let Err(e) = storage.record_cycle(record).await {
				warn!(cycle_id = %record.id, error = %e, "Failed to persist cycle record");
			}
		}
	}

	/// Runs a push cycle every `interval` until `shutdown` resolves.
	///
	/// Cycles never overlap and missed ticks are skipped. A shutdown that
	/// arrives mid-cycle takes effect once that cycle has finished. Returns
	/// the number of cycles run.
	pub async fn run_scheduled<S>(&self, interval: Duration, shutdown: S) -> u64
	where
		S: Future<Output = ()>,
	{
		let mut ticker = tokio::time::interval(interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
		tokio::pin!(shutdown);

		info!("Scheduler started, interval {:?}", interval);
		let mut cycles = 0;
		loop {
			tokio::select! {
				biased;
				_ = &mut shutdown => {
					info!(cycles, "Shutdown requested, scheduler stopping");
					break;
				}
				_ = ticker.tick() => {
					self.run_cycle(CycleMode::Run).await;
					cycles += 1;
				}
			}
		}
		cycles
	}
}

fn push_failure(e: PushError) -> CycleOutcome {
	let stage = match e {
		PushError::BreakerOpen { .. } => FailureStage::BreakerOpen,
		_ => FailureStage::Push,
	};
	CycleOutcome::Failed {
		stage,
		message: e.to_string(),
	}
}
