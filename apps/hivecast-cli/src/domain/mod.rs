//! Domain layer - Core pub/sub client types with no external integrations.

/// Credential claims and the derived rate-limit policy.
pub mod claims;

/// Subscription message value types and the relay wire envelope.
pub mod message;

/// Usage accounting, window math, and limit errors.
pub mod quota;

/// Session lifecycle state machine.
pub mod session;
