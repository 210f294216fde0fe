//! Failure-handling primitives shared by collection and push.
//!
//! [`RetryPolicy`] retries an operation with exponential backoff, and
//! [`CircuitBreaker`] stops calling an operation that keeps failing until a
//! cooldown has passed. Neither knows what it wraps.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::RetryPolicy;
