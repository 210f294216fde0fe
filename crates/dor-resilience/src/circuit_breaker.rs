//! Generic circuit breaker for async operations.

use dor_types::BreakerConfig;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
	Closed,
	Open,
	HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
	pub failure_threshold: u32,
	pub reset_timeout: Duration,
	pub half_open_max_attempts: u32,
}

impl Default for CircuitBreakerConfig {
	fn default() -> Self {
		Self::from(&BreakerConfig::default())
	}
}

impl From<&BreakerConfig> for CircuitBreakerConfig {
	fn from(config: &BreakerConfig) -> Self {
		Self {
			failure_threshold: config.failure_threshold.max(1),
			reset_timeout: Duration::from_secs(config.reset_timeout_secs),
			half_open_max_attempts: config.half_open_max_attempts.max(1),
		}
	}
}

#[derive(Debug, Error)]
pub enum BreakerError<E> {
	/// The call was rejected without running the operation.
	#[error("Circuit breaker is open, retry in {retry_in:?}")]
	Open { retry_in: Duration },
	/// The operation ran and failed.
	#[error("{0}")]
	Inner(E),
}

impl<E> BreakerError<E> {
	pub fn is_open(&self) -> bool {
		matches!(self, BreakerError::Open { .. })
	}

	pub fn into_inner(self) -> Option<E> {
		match self {
			BreakerError::Inner(e) => Some(e),
			BreakerError::Open { .. } => None,
		}
	}
}

#[derive(Debug)]
struct BreakerState {
	state: CircuitState,
	failure_count: u32,
	last_failure: Option<Instant>,
	half_open_attempts: u32,
}

/// Closed → Open after `failure_threshold` failures; Open → HalfOpen once
/// `reset_timeout` has passed since the last failure; HalfOpen → Closed on
/// the first success, back to Open on a failure or when more than
/// `half_open_max_attempts` trial calls are made.
///
/// The lock is never held across an await point.
#[derive(Debug)]
pub struct CircuitBreaker {
	name: String,
	config: CircuitBreakerConfig,
	inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
	pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
		Self {
			name: name.into(),
			config,
			inner: Mutex::new(BreakerState {
				state: CircuitState::Closed,
				failure_count: 0,
				last_failure: None,
				half_open_attempts: 0,
			}),
		}
	}

	/// Current state, applying the Open → HalfOpen timeout lazily.
	pub fn state(&self) -> CircuitState {
		let inner = self.lock();
		if inner.state == CircuitState::Open && self.cooldown_remaining(&inner).is_zero() {
			CircuitState::HalfOpen
		} else {
			inner.state
		}
	}

	pub fn failure_count(&self) -> u32 {
		self.lock().failure_count
	}

	/// Forces the breaker back to Closed.
	pub fn reset(&self) {
		let mut inner = self.lock();
		inner.state = CircuitState::Closed;
		inner.failure_count = 0;
		inner.last_failure = None;
		inner.half_open_attempts = 0;
		info!(breaker = %self.name, "Circuit breaker reset");
	}

	/// Runs `operation` if the breaker admits it and records the result.
	pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		if let Err(retry_in) = self.acquire() {
			return Err(BreakerError::Open { retry_in });
		}

		match operation().await {
			Ok(value) => {
				self.on_success();
				Ok(value)
			}
			Err(e) => {
				self.on_failure();
				Err(BreakerError::Inner(e))
			}
		}
	}

	fn lock(&self) -> MutexGuard<'_, BreakerState> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn cooldown_remaining(&self, inner: &BreakerState) -> Duration {
		match inner.last_failure {
			Some(at) => self.config.reset_timeout.saturating_sub(at.elapsed()),
			None => Duration::ZERO,
		}
	}

	fn acquire(&self) -> Result<(), Duration> {
		let mut inner = self.lock();

		match inner.state {
			CircuitState::Closed => Ok(()),
			CircuitState::Open => {
				let remaining = self.cooldown_remaining(&inner);
				if !remaining.is_zero() {
					return Err(remaining);
				}
				info!(breaker = %self.name, "Circuit breaker half-open, allowing trial call");
				inner.state = CircuitState::HalfOpen;
				inner.half_open_attempts = 1;
				Ok(())
			}
			CircuitState::HalfOpen => {
				if inner.half_open_attempts >= self.config.half_open_max_attempts {
					warn!(breaker = %self.name, "Half-open attempt cap exceeded, reopening");
					self.trip(&mut inner);
					return Err(self.config.reset_timeout);
				}
				inner.half_open_attempts += 1;
				Ok(())
			}
		}
	}

	fn on_success(&self) {
		let mut inner = self.lock();
		if inner.state != CircuitState::Closed {
			info!(breaker = %self.name, "Circuit breaker closed");
		}
		inner.state = CircuitState::Closed;
		inner.failure_count = 0;
		inner.half_open_attempts = 0;
	}

	fn on_failure(&self) {
		let mut inner = self.lock();
		inner.failure_count += 1;
		inner.last_failure = Some(Instant::now());

		match inner.state {
			CircuitState::HalfOpen => {
				warn!(breaker = %self.name, "Trial call failed, reopening circuit breaker");
				self.trip(&mut inner);
			}
			CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
				warn!(
					breaker = %self.name,
					failures = inner.failure_count,
					"Failure threshold reached, opening circuit breaker"
				);
				self.trip(&mut inner);
			}
			_ => {}
		}
	}

	fn trip(&self, inner: &mut BreakerState) {
		inner.state = CircuitState::Open;
		inner.last_failure = Some(Instant::now());
		inner.half_open_attempts = 0;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	fn breaker() -> CircuitBreaker {
		CircuitBreaker::new("test", CircuitBreakerConfig::default())
	}

	async fn fail(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<(), BreakerError<String>> {
		breaker
			.execute(|| async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Err::<(), _>("boom".to_string())
			})
			.await
	}

	async fn succeed(breaker: &CircuitBreaker, calls: &AtomicU32) -> Result<u32, BreakerError<String>> {
		breaker
			.execute(|| async move {
				calls.fetch_add(1, Ordering::SeqCst);
				Ok::<_, String>(7)
			})
			.await
	}

	#[tokio::test(start_paused = true)]
	async fn test_opens_after_threshold_and_rejects_without_calling() {
		let breaker = breaker();
		let calls = AtomicU32::new(0);

		for _ in 0..3 {
			assert!(matches!(fail(&breaker, &calls).await, Err(BreakerError::Inner(_))));
		}
		assert_eq!(breaker.state(), CircuitState::Open);

		let rejected = succeed(&breaker, &calls).await;
		assert!(rejected.unwrap_err().is_open());
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_half_open_success_closes() {
		let breaker = breaker();
		let calls = AtomicU32::new(0);

		for _ in 0..3 {
			let _ = fail(&breaker, &calls).await;
		}
		tokio::time::advance(Duration::from_secs(299)).await;
		assert!(succeed(&breaker, &calls).await.unwrap_err().is_open());

		tokio::time::advance(Duration::from_secs(1)).await;
		assert_eq!(breaker.state(), CircuitState::HalfOpen);

		assert_eq!(succeed(&breaker, &calls).await.unwrap(), 7);
		assert_eq!(breaker.state(), CircuitState::Closed);
		assert_eq!(breaker.failure_count(), 0);
		assert_eq!(calls.load(Ordering::SeqCst), 4);
	}

	#[tokio::test(start_paused = true)]
	async fn test_half_open_failure_reopens_and_restarts_timer() {
		let breaker = breaker();
		let calls = AtomicU32::new(0);

		for _ in 0..3 {
			let _ = fail(&breaker, &calls).await;
		}
		tokio::time::advance(Duration::from_secs(300)).await;

		assert!(matches!(fail(&breaker, &calls).await, Err(BreakerError::Inner(_))));
		assert_eq!(breaker.state(), CircuitState::Open);

		tokio::time::advance(Duration::from_secs(150)).await;
		assert!(succeed(&breaker, &calls).await.unwrap_err().is_open());
		assert_eq!(calls.load(Ordering::SeqCst), 4);
	}

	#[tokio::test(start_paused = true)]
	async fn test_half_open_attempt_cap() {
		let breaker = CircuitBreaker::new(
			"cap",
			CircuitBreakerConfig {
				failure_threshold: 1,
				reset_timeout: Duration::from_secs(10),
				half_open_max_attempts: 2,
			},
		);
		let calls = AtomicU32::new(0);

		let _ = fail(&breaker, &calls).await;
		tokio::time::advance(Duration::from_secs(10)).await;

		// Two trial calls are admitted while both are still in flight.
		assert!(breaker.acquire().is_ok());
		assert!(breaker.acquire().is_ok());
		// The third exceeds the cap and reopens the breaker.
		assert!(breaker.acquire().is_err());
		assert_eq!(breaker.state(), CircuitState::Open);
	}

	#[tokio::test(start_paused = true)]
	async fn test_success_in_closed_resets_count() {
		let breaker = breaker();
		let calls = AtomicU32::new(0);

		let _ = fail(&breaker, &calls).await;
		let _ = fail(&breaker, &calls).await;
		assert_eq!(breaker.failure_count(), 2);

		succeed(&breaker, &calls).await.unwrap();
		assert_eq!(breaker.failure_count(), 0);

		let _ = fail(&breaker, &calls).await;
		assert_eq!(breaker.state(), CircuitState::Closed);
	}

	#[tokio::test(start_paused = true)]
	async fn test_manual_reset() {
		let breaker = breaker();
		let calls = AtomicU32::new(0);
		for _ in 0..3 {
			let _ = fail(&breaker, &calls).await;
		}
		breaker.reset();
		assert_eq!(breaker.state(), CircuitState::Closed);
		assert!(succeed(&breaker, &calls).await.is_ok());
	}
}
