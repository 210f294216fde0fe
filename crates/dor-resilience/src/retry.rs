//! Exponential-backoff retry.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use dor_types::RetryConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry parameters for a fallible async operation.
///
/// The wait before attempt `n + 1` is `min(base_delay * multiplier^(n-1), max_delay)`.
/// Waiting uses `tokio::time::sleep`, so only the calling task is suspended.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	max_attempts: u32,
	base_delay: Duration,
	max_delay: Duration,
	multiplier: f64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self::from_config(&RetryConfig::default())
	}
}

impl RetryPolicy {
	pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
		Self {
			max_attempts: max_attempts.max(1),
			base_delay,
			max_delay,
			multiplier,
		}
	}

	pub fn from_config(config: &RetryConfig) -> Self {
		Self::new(
			config.max_attempts,
			Duration::from_millis(config.base_delay_ms),
			Duration::from_millis(config.max_delay_ms),
			config.multiplier,
		)
	}

	pub fn max_attempts(&self) -> u32 {
		self.max_attempts
	}

	fn backoff(&self) -> ExponentialBackoff {
		ExponentialBackoffBuilder::new()
			.with_initial_interval(self.base_delay)
			.with_multiplier(self.multiplier)
			.with_max_interval(self.max_delay)
			.with_randomization_factor(0.0)
			.with_max_elapsed_time(None)
			.build()
	}

	/// The waits between consecutive attempts, `max_attempts - 1` entries.
	pub fn delays(&self) -> Vec<Duration> {
		let mut backoff = self.backoff();
		(1..self.max_attempts)
			.map(|_| self.next_delay(&mut backoff))
			.collect()
	}

	fn next_delay(&self, backoff: &mut ExponentialBackoff) -> Duration {
		backoff
			.next_backoff()
			.unwrap_or(self.max_delay)
			.min(self.max_delay)
	}

	/// Runs `operation` until it succeeds or the attempts are exhausted.
	pub async fn with_retry<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: Display,
	{
		self.with_retry_if(operation, |_| true).await
	}

	/// Like [`with_retry`](Self::with_retry), but returns immediately on
	/// errors for which `should_retry` is false.
	pub async fn with_retry_if<F, Fut, T, E, P>(&self, mut operation: F, should_retry: P) -> Result<T, E>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
		E: Display,
		P: Fn(&E) -> bool,
	{
		let mut backoff = self.backoff();
		let mut attempt = 1;

		loop {
			match operation().await {
				Ok(value) => return Ok(value),
				Err(e) if !should_retry(&e) => return Err(e),
				Err(e) if attempt >= self.max_attempts => {
					warn!(
						"Operation failed after {} attempts, giving up: {}",
						self.max_attempts, e
					);
					return Err(e);
				}
				Err(e) => {
					let delay = self.next_delay(&mut backoff);
					warn!(
						"Operation failed, attempt {}/{}, retrying in {:?}: {}",
						attempt, self.max_attempts, delay, e
					);
					tokio::time::sleep(delay).await;
					attempt += 1;
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};
	use std::sync::Arc;

	fn policy(max_attempts: u32) -> RetryPolicy {
		RetryPolicy::new(
			max_attempts,
			Duration::from_secs(1),
			Duration::from_secs(10),
			2.0,
		)
	}

	#[test]
	fn test_delay_schedule_doubles_and_caps() {
		let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(3), 2.0);
		assert_eq!(
			policy.delays(),
			vec![
				Duration::from_secs(1),
				Duration::from_secs(2),
				Duration::from_secs(3),
				Duration::from_secs(3),
			]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_succeeds_on_third_attempt() {
		let calls = Arc::new(AtomicU32::new(0));
		let start = tokio::time::Instant::now();

		let counter = calls.clone();
		let result: Result<&str, String> = policy(3)
			.with_retry(|| {
				let counter = counter.clone();
				async move {
					let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
					if n < 3 {
						Err(format!("failure {}", n))
					} else {
						Ok("done")
					}
				}
			})
			.await;

		assert_eq!(result.unwrap(), "done");
		assert_eq!(calls.load(Ordering::SeqCst), 3);
		// 1s + 2s of backoff on the paused clock
		let elapsed = start.elapsed();
		assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
	}

	#[tokio::test(start_paused = true)]
	async fn test_last_error_propagates() {
		let calls = Arc::new(AtomicU32::new(0));

		let counter = calls.clone();
		let result: Result<(), String> = policy(3)
			.with_retry(|| {
				let counter = counter.clone();
				async move {
					let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
					Err(format!("failure {}", n))
				}
			})
			.await;

		assert_eq!(result.unwrap_err(), "failure 3");
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test(start_paused = true)]
	async fn test_non_retryable_error_stops_immediately() {
		let calls = Arc::new(AtomicU32::new(0));

		let counter = calls.clone();
		let result: Result<(), String> = policy(3)
			.with_retry_if(
				|| {
					let counter = counter.clone();
					async move {
						counter.fetch_add(1, Ordering::SeqCst);
						Err("not authorized".to_string())
					}
				},
				|e| !e.contains("not authorized"),
			)
			.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn test_zero_attempts_still_runs_once() {
		assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, 2.0).max_attempts(), 1);
	}
}
