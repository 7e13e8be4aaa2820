//! Configuration type definitions for Tradewire
//!
//! This module defines the configuration structs for the message bus and the
//! message router. All types implement serde traits for JSON serialization
//! and have sensible defaults; every field can be omitted from a config file.

use serde::{Deserialize, Serialize};

use crate::router::LoadBalancingStrategy;

/// Main configuration struct for Tradewire
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Message bus configuration (retry, timeout, backlog bounds)
    pub bus: BusConfig,
    /// Message router configuration (rules, circuit breaker, load balancing)
    pub router: RouterConfig,
}

// ============================================================================
// Bus Configuration
// ============================================================================

/// Message bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Background redelivery attempts after a failed initial delivery.
    pub max_retries: u32,
    /// Fixed delay between redelivery attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Upper bound on a single delivery attempt, in milliseconds. A timed-out
    /// attempt counts as a failed attempt.
    pub message_timeout_ms: u64,
    /// Per-recipient backlog capacity; the oldest entry is evicted when full.
    pub max_queue_size: usize,
    /// Accepted for forward compatibility; the in-memory bus never persists
    /// the message log.
    pub enable_persistence: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            message_timeout_ms: 30_000,
            max_queue_size: 100,
            enable_persistence: false,
        }
    }
}

// ============================================================================
// Router Configuration
// ============================================================================

/// Message router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Whether to resolve deliveries across multiple registered instances of
    /// the same logical agent.
    pub enable_load_balancing: bool,
    /// Instance selection strategy when load balancing is enabled.
    pub load_balancing_strategy: LoadBalancingStrategy,
    /// Whether to fail fast on recipients with a run of consecutive failures.
    pub enable_circuit_breaker: bool,
    /// Consecutive failures that open a recipient's circuit.
    pub circuit_breaker_threshold: u32,
    /// Whether transform rules are applied during rule evaluation.
    pub enable_message_transformation: bool,
    /// Hop ceiling; a message routed this many times is rejected.
    pub max_routing_hops: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enable_load_balancing: true,
            load_balancing_strategy: LoadBalancingStrategy::LeastBusy,
            enable_circuit_breaker: true,
            circuit_breaker_threshold: 5,
            enable_message_transformation: true,
            max_routing_hops: 10,
        }
    }
}
