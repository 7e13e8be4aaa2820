//! Error types for Tradewire
//!
//! This module defines all error types used throughout the messaging core.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.
//!
//! Every operational failure is returned as a `WireError`, never panicked:
//! callers distinguish failure causes by variant (or by the rendered message),
//! matching the fail-soft contract of the bus and router.

use thiserror::Error;

/// The primary error type for Tradewire operations.
#[derive(Error, Debug)]
pub enum WireError {
    /// A required message field is missing or empty. Synchronous, terminal,
    /// never retried; the message is neither queued nor dispatched.
    #[error("Invalid message: {0}")]
    Validation(String),

    /// No subscription matched the recipient and message type. The message
    /// is placed on the recipient's backlog queue for observability.
    #[error("No subscribers found for agent type: {0}")]
    NoSubscribers(String),

    /// The subscriber callback failed on the initial attempt. Redelivery
    /// continues in the background; this error covers only the first try.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// A delivery attempt exceeded the configured message timeout.
    #[error("Delivery timed out after {0}ms")]
    Timeout(u64),

    /// The message matched a filter rule and was dropped by the router.
    #[error("Message filtered by routing rules")]
    Filtered,

    /// The message exceeded the configured hop ceiling.
    #[error("Maximum routing hops exceeded")]
    HopLimit,

    /// The recipient's circuit breaker is open; the bus was not contacted.
    #[error("Circuit breaker is open for agent type: {0}")]
    CircuitOpen(String),

    /// Configuration-related errors (invalid bounds, malformed config file).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors (config file loading)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WireError {
    /// Returns `true` for validation failures: terminal, synchronous,
    /// never queued or retried.
    pub fn is_validation(&self) -> bool {
        matches!(self, WireError::Validation(_))
    }

    /// Returns `true` for failures produced by router policy alone
    /// (filter rule, hop ceiling, open circuit breaker). These never
    /// reach the bus.
    pub fn is_routing_policy(&self) -> bool {
        matches!(
            self,
            WireError::Filtered | WireError::HopLimit | WireError::CircuitOpen(_)
        )
    }

    /// Returns `true` if this failure is followed by background redelivery
    /// attempts at the bus layer.
    pub fn is_retryable_delivery(&self) -> bool {
        matches!(self, WireError::Delivery(_) | WireError::Timeout(_))
    }
}

/// A specialized `Result` type for Tradewire operations.
pub type Result<T> = std::result::Result<T, WireError>;
