use dor_aggregation::AggregationError;
use dor_registry::RegistryError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
	#[error("Signer is not authorized to update the registry")]
	Unauthorized,
	#[error("Estimated cost {estimated} wei exceeds cap of {max} wei")]
	CostCapExceeded { estimated: u128, max: u128 },
	#[error("Registry error: {0}")]
	Registry(String),
	#[error("Transaction {tx} reverted")]
	Reverted { tx: String },
	#[error("No confirmation within {0:?}")]
	ConfirmationTimeout(Duration),
	#[error("Circuit breaker open, retry in {retry_in:?}")]
	BreakerOpen { retry_in: Duration },
	#[error("Aggregation failed: {0}")]
	Aggregation(#[from] AggregationError),
}

impl PushError {
	/// Transient failures worth another attempt within the same cycle.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			PushError::Registry(_) | PushError::Reverted { .. } | PushError::ConfirmationTimeout(_)
		)
	}
}

impl From<RegistryError> for PushError {
	fn from(e: RegistryError) -> Self {
		match e {
			RegistryError::Timeout(waited) => PushError::ConfirmationTimeout(waited),
			other => PushError::Registry(other.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_policy_rejections_are_not_retryable() {
		assert!(!PushError::Unauthorized.is_retryable());
		assert!(!PushError::CostCapExceeded {
			estimated: 2,
			max: 1
		}
		.is_retryable());
		assert!(!PushError::BreakerOpen {
			retry_in: Duration::from_secs(1)
		}
		.is_retryable());
	}

	#[test]
	fn test_registry_timeout_maps_to_confirmation_timeout() {
		let err = PushError::from(RegistryError::Timeout(Duration::from_secs(180)));
		assert!(matches!(err, PushError::ConfirmationTimeout(_)));
		assert!(err.is_retryable());

		let err = PushError::from(RegistryError::Network("connection refused".into()));
		assert!(matches!(err, PushError::Registry(_)));
	}
}
