//! Load-balanced target resolution across agent instances.
//!
//! Agents report their status to the router via `update_agent_status`; the
//! router uses those reports only to score delivery candidates. Instances of
//! a logical agent register either under the bare type (`research`) or under
//! an instance id derived from it (`research-1`, `research-2`). When two or
//! more candidates are known for a recipient, the configured strategy picks
//! one; otherwise resolution is a no-op.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse activity state reported by an agent instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    #[default]
    Idle,
    Busy,
    Offline,
}

/// Static capabilities reported by an agent instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentCapabilities {
    /// Task kinds the instance can execute.
    pub supported_tasks: Vec<String>,
    /// Concurrency ceiling the instance advertises.
    pub max_concurrent_tasks: usize,
    /// Mean time to complete a task, in milliseconds.
    pub average_processing_time_ms: f64,
    /// Self-reported fraction of tasks completed successfully, 0.0 to 1.0.
    pub reliability: f64,
    /// Free-form specialization tags (e.g. "equities", "fixed-income").
    pub specializations: Vec<String>,
}

/// Most recent status report for one agent instance, keyed by `agent_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Instance identifier: a bare role (`research`) or a derived instance
    /// id (`research-2`).
    pub agent_type: String,
    /// Coarse activity state.
    pub status: AgentState,
    /// Identifiers of tasks the instance is currently working.
    pub current_tasks: Vec<String>,
    /// When the instance last reported activity.
    pub last_activity: DateTime<Utc>,
    /// Advertised capabilities.
    pub capabilities: AgentCapabilities,
}

impl AgentStatus {
    /// A fresh idle status for an instance.
    pub fn idle(agent_type: &str) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            status: AgentState::Idle,
            current_tasks: Vec::new(),
            last_activity: Utc::now(),
            capabilities: AgentCapabilities::default(),
        }
    }

    /// Sets the current task list (builder pattern).
    pub fn with_tasks(mut self, tasks: &[&str]) -> Self {
        self.current_tasks = tasks.iter().map(|t| t.to_string()).collect();
        if !self.current_tasks.is_empty() {
            self.status = AgentState::Busy;
        }
        self
    }

    /// Sets the advertised mean processing time (builder pattern).
    pub fn with_average_processing_time(mut self, ms: f64) -> Self {
        self.capabilities.average_processing_time_ms = ms;
        self
    }

    /// Sets the last-activity timestamp (builder pattern).
    pub fn with_last_activity(mut self, at: DateTime<Utc>) -> Self {
        self.last_activity = at;
        self
    }
}

/// Instance selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancingStrategy {
    /// Fewest current tasks; ties broken by lower average processing time,
    /// then by most recent activity.
    #[default]
    LeastBusy,
    /// Stable rotation across instances, one per call.
    RoundRobin,
}

/// Returns the registered statuses that are delivery candidates for
/// `recipient`: the bare type itself plus `recipient-<suffix>` instance ids.
pub(crate) fn candidates_for<'a>(
    recipient: &str,
    statuses: &'a HashMap<String, AgentStatus>,
) -> Vec<&'a AgentStatus> {
    let instance_prefix = format!("{}-", recipient);
    let mut candidates: Vec<&AgentStatus> = statuses
        .values()
        .filter(|s| s.agent_type == recipient || s.agent_type.starts_with(&instance_prefix))
        .collect();
    // Stable order regardless of map iteration.
    candidates.sort_by(|a, b| a.agent_type.cmp(&b.agent_type));
    candidates
}

/// Picks a concrete instance among candidates for a logical recipient.
#[derive(Clone)]
pub(crate) struct LoadBalancer {
    strategy: LoadBalancingStrategy,
    /// Round-robin cursor per logical recipient.
    cursors: Arc<RwLock<HashMap<String, usize>>>,
}

impl LoadBalancer {
    pub(crate) fn new(strategy: LoadBalancingStrategy) -> Self {
        Self {
            strategy,
            cursors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Selects an instance id for `recipient`. Returns `None` when fewer
    /// than two candidates are known (resolution is then a no-op).
    pub(crate) fn select(
        &self,
        recipient: &str,
        candidates: &[&AgentStatus],
    ) -> Option<String> {
        if candidates.len() < 2 {
            return None;
        }
        let chosen = match self.strategy {
            LoadBalancingStrategy::LeastBusy => Self::least_busy(candidates),
            LoadBalancingStrategy::RoundRobin => {
                let mut cursors = self.cursors.write().unwrap();
                let cursor = cursors.entry(recipient.to_string()).or_insert(0);
                let index = *cursor % candidates.len();
                *cursor = cursor.wrapping_add(1);
                candidates[index]
            }
        };
        Some(chosen.agent_type.clone())
    }

    fn least_busy<'a>(candidates: &[&'a AgentStatus]) -> &'a AgentStatus {
        candidates
            .iter()
            .copied()
            .reduce(|best, next| {
                let by_tasks = next.current_tasks.len().cmp(&best.current_tasks.len());
                let by_speed = next
                    .capabilities
                    .average_processing_time_ms
                    .partial_cmp(&best.capabilities.average_processing_time_ms)
                    .unwrap_or(std::cmp::Ordering::Equal);
                // Most recent activity wins the final tie.
                let by_recency = best.last_activity.cmp(&next.last_activity);
                if by_tasks.then(by_speed).then(by_recency).is_lt() {
                    next
                } else {
                    best
                }
            })
            .expect("candidates is non-empty")
    }
}
