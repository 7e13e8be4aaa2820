//! Configuration validation with unknown field detection.

use serde_json::Value;

use super::types::{BusConfig, RouterConfig};
use crate::error::{Result, WireError};

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &["bus", "router"];

/// Known fields for each section.
const KNOWN_BUS: &[&str] = &[
    "max_retries",
    "retry_delay_ms",
    "message_timeout_ms",
    "max_queue_size",
    "enable_persistence",
];

const KNOWN_ROUTER: &[&str] = &[
    "enable_load_balancing",
    "load_balancing_strategy",
    "enable_circuit_breaker",
    "circuit_breaker_threshold",
    "enable_message_transformation",
    "max_routing_hops",
];

/// A validation diagnostic for a field that will be silently ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Dotted path of the unknown field (e.g. `bus.max_retrys`).
    pub path: String,
}

/// Scan a raw config document for fields no known section declares.
///
/// Unknown fields are not errors (serde ignores them) but they usually
/// mean a typo, so loaders surface them as warnings.
pub fn unknown_fields(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let Some(top) = raw.as_object() else {
        return diagnostics;
    };

    for (key, value) in top {
        if !KNOWN_TOP_LEVEL.contains(&key.as_str()) {
            diagnostics.push(Diagnostic { path: key.clone() });
            continue;
        }
        let known = match key.as_str() {
            "bus" => KNOWN_BUS,
            "router" => KNOWN_ROUTER,
            _ => continue,
        };
        if let Some(section) = value.as_object() {
            for field in section.keys() {
                if !known.contains(&field.as_str()) {
                    diagnostics.push(Diagnostic {
                        path: format!("{}.{}", key, field),
                    });
                }
            }
        }
    }

    diagnostics
}

impl BusConfig {
    /// Validate numeric bounds. Called by bus constructors; invalid
    /// construction arguments fail fast rather than misbehave later.
    pub fn validate(&self) -> Result<()> {
        if self.retry_delay_ms == 0 {
            return Err(WireError::Config(
                "retry_delay_ms must be greater than zero".to_string(),
            ));
        }
        if self.message_timeout_ms == 0 {
            return Err(WireError::Config(
                "message_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_queue_size == 0 {
            return Err(WireError::Config(
                "max_queue_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl RouterConfig {
    /// Validate numeric bounds. Called by router constructors.
    pub fn validate(&self) -> Result<()> {
        if self.circuit_breaker_threshold == 0 {
            return Err(WireError::Config(
                "circuit_breaker_threshold must be greater than zero".to_string(),
            ));
        }
        if self.max_routing_hops == 0 {
            return Err(WireError::Config(
                "max_routing_hops must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
