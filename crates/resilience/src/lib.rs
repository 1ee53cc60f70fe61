//! Request protection backed by the shared store
//!
//! - [`RateLimiter`]: fixed-window request counter per caller
//! - [`CircuitBreaker`]: closed/open/half-open gate per upstream service
//!
//! Both keep all state in the shared store so every server instance sees the
//! same counters, and both fail open: a store outage never blocks a request.

pub mod circuit_breaker;
pub mod rate_limit;

pub use circuit_breaker::{BreakerDecision, BreakerState, CircuitBreaker, Phase, PhaseKind};
pub use rate_limit::{RateLimitDecision, RateLimitPolicy, RateLimiter};
