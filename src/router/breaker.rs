//! Per-recipient circuit breaking for the message router.
//!
//! Tracks consecutive delivery failures per agent type. A recipient whose
//! run of failures reaches the configured threshold has its circuit opened
//! and further routes fail fast without contacting the bus. There is no
//! automatic recovery path: the circuit closes only when a delivery to that
//! recipient succeeds again through some other path (which cannot happen
//! while the gate is enforced) or the router is rebuilt. Callers that want
//! probing semantics layer it above.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::info;

/// Thread-safe per-recipient consecutive-failure tracker.
#[derive(Clone)]
pub(crate) struct BreakerPanel {
    threshold: u32,
    failures: Arc<RwLock<HashMap<String, u32>>>,
}

impl BreakerPanel {
    pub(crate) fn new(threshold: u32) -> Self {
        Self {
            threshold,
            failures: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns `true` if the recipient's circuit is open.
    pub(crate) fn is_open(&self, agent_type: &str) -> bool {
        let failures = self.failures.read().unwrap();
        failures
            .get(agent_type)
            .is_some_and(|count| *count >= self.threshold)
    }

    /// Record a failed delivery attempt for the recipient.
    pub(crate) fn record_failure(&self, agent_type: &str) {
        let mut failures = self.failures.write().unwrap();
        let count = failures.entry(agent_type.to_string()).or_insert(0);
        *count += 1;
        if *count == self.threshold {
            info!(
                agent_type,
                threshold = self.threshold,
                "Circuit breaker opened: recipient marked unhealthy"
            );
        }
    }

    /// Record a successful delivery — resets the recipient's failure run.
    pub(crate) fn record_success(&self, agent_type: &str) {
        let mut failures = self.failures.write().unwrap();
        if let Some(count) = failures.get_mut(agent_type) {
            if *count >= self.threshold {
                info!(agent_type, "Circuit breaker closed: recipient recovered");
            }
            *count = 0;
        }
    }

    /// Open/closed state per tracked recipient.
    pub(crate) fn states(&self) -> HashMap<String, bool> {
        let failures = self.failures.read().unwrap();
        failures
            .iter()
            .map(|(agent, count)| (agent.clone(), *count >= self.threshold))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_initially() {
        let panel = BreakerPanel::new(3);
        assert!(!panel.is_open("research"));
    }

    #[test]
    fn test_opens_at_threshold() {
        let panel = BreakerPanel::new(3);
        panel.record_failure("research");
        panel.record_failure("research");
        assert!(!panel.is_open("research"));
        panel.record_failure("research");
        assert!(panel.is_open("research"));
    }

    #[test]
    fn test_stays_open_past_threshold() {
        let panel = BreakerPanel::new(2);
        for _ in 0..5 {
            panel.record_failure("research");
        }
        assert!(panel.is_open("research"));
    }

    #[test]
    fn test_success_resets_run() {
        let panel = BreakerPanel::new(3);
        panel.record_failure("research");
        panel.record_failure("research");
        panel.record_success("research");
        panel.record_failure("research");
        panel.record_failure("research");
        assert!(!panel.is_open("research"));
    }

    #[test]
    fn test_recipients_tracked_independently() {
        let panel = BreakerPanel::new(2);
        panel.record_failure("research");
        panel.record_failure("research");
        assert!(panel.is_open("research"));
        assert!(!panel.is_open("analysis"));
    }

    #[test]
    fn test_states_snapshot() {
        let panel = BreakerPanel::new(2);
        panel.record_failure("research");
        panel.record_failure("research");
        panel.record_failure("analysis");

        let states = panel.states();
        assert_eq!(states["research"], true);
        assert_eq!(states["analysis"], false);
        assert!(!states.contains_key("compliance"));
    }
}
