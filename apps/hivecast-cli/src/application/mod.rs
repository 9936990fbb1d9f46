//! Application layer - Services orchestrating domain logic across ports.
//!
//! - [`limiter`]: client-side rate limiting and usage accounting
//! - [`publisher`]: rate-limited publish orchestration
//! - [`session`]: subscribe session runner and shutdown coordination
//! - [`ports`]: contracts implemented by the infrastructure layer

/// Client-side rate limiter service.
pub mod limiter;

/// Port interfaces between application and infrastructure.
pub mod ports;

/// Publish orchestration.
pub mod publisher;

/// Subscribe session runner.
pub mod session;
