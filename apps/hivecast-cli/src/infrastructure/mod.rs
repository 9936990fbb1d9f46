//! Infrastructure layer - Adapters binding the application ports to the
//! outside world: wire transports, delivery sinks, local state, and process
//! concerns.

/// Delivery fan-out hub.
pub mod broadcast;

/// Clock adapters.
pub mod clock;

/// Configuration loading.
pub mod config;

/// Delivery sink adapters.
pub mod sinks;

/// Tracing setup.
pub mod telemetry;

/// Wire transports and relay protocol types.
pub mod transport;

/// Usage document persistence.
pub mod usage;
