//! Message Router Module
//!
//! A policy layer in front of the message bus. The router intercepts every
//! message before delivery, applies an ordered set of routing rules
//! (route/filter/transform), enforces a hop ceiling against routing loops,
//! fails fast on recipients with a run of consecutive failures, and resolves
//! the delivery target among registered instances of a logical agent.
//!
//! The router depends on the bus only through the [`MessageSender`] trait
//! and never touches bus-owned state (subscriptions, queues, history);
//! conversely the rule list, breaker counters, and agent-status cache are
//! owned here and invisible to the bus.
//!
//! ```text
//! route_message
//!   │ hop check ──────────────────► Err("Maximum routing hops exceeded")
//!   │ rule evaluation ────────────► Err("filtered by routing rules")
//!   │ circuit-breaker check ──────► Err("Circuit breaker is open")
//!   │ load-balancer resolution
//!   ▼
//! MessageSender::send_message ────► receipt / bus error
//! ```

mod balance;
mod breaker;
mod rules;

pub use balance::{AgentCapabilities, AgentState, AgentStatus, LoadBalancingStrategy};
pub use rules::{MessageTransformer, RoutingRule, RuleAction, RuleCondition};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::debug;

use crate::bus::{AgentMessage, DeliveryReceipt, MessagePriority, MessageSender};
use crate::config::RouterConfig;
use crate::error::{Result, WireError};
use crate::roles;
use balance::{candidates_for, LoadBalancer};
use breaker::BreakerPanel;

/// Snapshot of router policy state, for observability.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingStats {
    /// Number of registered routing rules.
    pub total_rules: usize,
    /// Open (`true`) / closed (`false`) circuit state per tracked recipient.
    pub circuit_breaker_states: HashMap<String, bool>,
    /// Most recent status report per agent instance.
    pub agent_statuses: HashMap<String, AgentStatus>,
}

/// Rule-driven policy router over a [`MessageSender`].
pub struct MessageRouter {
    config: RouterConfig,
    sender: Arc<dyn MessageSender>,
    /// Rules in insertion order; evaluation sorts by priority (stable, so
    /// insertion order breaks ties).
    rules: RwLock<Vec<RoutingRule>>,
    /// Latest status report per agent instance.
    statuses: RwLock<HashMap<String, AgentStatus>>,
    breaker: BreakerPanel,
    balancer: LoadBalancer,
}

impl MessageRouter {
    /// Creates a router with default configuration over the given sender.
    pub fn new(sender: Arc<dyn MessageSender>) -> Self {
        Self::build(sender, RouterConfig::default())
    }

    /// Creates a router with the given configuration.
    ///
    /// # Errors
    /// Returns [`WireError::Config`] if a numeric bound is invalid (zero
    /// breaker threshold or hop ceiling).
    pub fn with_config(sender: Arc<dyn MessageSender>, config: RouterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(sender, config))
    }

    fn build(sender: Arc<dyn MessageSender>, config: RouterConfig) -> Self {
        let breaker = BreakerPanel::new(config.circuit_breaker_threshold);
        let balancer = LoadBalancer::new(config.load_balancing_strategy);
        Self {
            config,
            sender,
            rules: RwLock::new(Vec::new()),
            statuses: RwLock::new(HashMap::new()),
            breaker,
            balancer,
        }
    }

    // ------------------------------------------------------------------
    // Rule and status management
    // ------------------------------------------------------------------

    /// Registers a routing rule. A rule with an already-registered id
    /// replaces the previous one in place.
    pub fn add_routing_rule(&self, rule: RoutingRule) {
        let mut rules = self.rules.write().unwrap();
        if let Some(existing) = rules.iter_mut().find(|r| r.id == rule.id) {
            debug!(rule_id = %rule.id, "Routing rule replaced");
            *existing = rule;
        } else {
            debug!(rule_id = %rule.id, priority = rule.priority, "Routing rule added");
            rules.push(rule);
        }
    }

    /// Removes the rule with the given id. Returns `true` if it existed.
    pub fn remove_routing_rule(&self, id: &str) -> bool {
        let mut rules = self.rules.write().unwrap();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        rules.len() != before
    }

    /// Upserts the latest status report for an agent instance. Status is
    /// consumed only when scoring load-balancing candidates.
    pub fn update_agent_status(&self, status: AgentStatus) {
        self.statuses
            .write()
            .unwrap()
            .insert(status.agent_type.clone(), status);
    }

    /// Snapshot of rules, breaker states, and agent statuses.
    pub fn routing_stats(&self) -> RoutingStats {
        RoutingStats {
            total_rules: self.rules.read().unwrap().len(),
            circuit_breaker_states: self.breaker.states(),
            agent_statuses: self.statuses.read().unwrap().clone(),
        }
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    /// Routes a message through policy and hands it to the sender.
    ///
    /// Policy failures (hop ceiling, filter rule, open circuit) short-circuit
    /// before the sender is contacted; otherwise the sender's immediate
    /// result is bubbled back and drives the recipient's breaker counter.
    /// The router never observes the bus's background retries.
    pub async fn route_message(&self, message: AgentMessage) -> Result<DeliveryReceipt> {
        if message.metadata.routing_hops >= self.config.max_routing_hops {
            debug!(
                hops = message.metadata.routing_hops,
                ceiling = self.config.max_routing_hops,
                "Message rejected at hop ceiling"
            );
            return Err(WireError::HopLimit);
        }
        let mut working = message;
        working.metadata.routing_hops += 1;

        working = self.apply_rules(working)?;

        // The breaker is keyed on the logical recipient after rule
        // evaluation, not on a load-balanced instance id, so one agent's
        // failure run is never split across instance keys.
        let logical_recipient = working.recipient.clone();

        if self.config.enable_circuit_breaker && self.breaker.is_open(&logical_recipient) {
            debug!(recipient = %logical_recipient, "Route rejected: circuit open");
            return Err(WireError::CircuitOpen(logical_recipient));
        }

        if self.config.enable_load_balancing {
            let statuses = self.statuses.read().unwrap();
            let candidates = candidates_for(&logical_recipient, &statuses);
            if let Some(instance) = self.balancer.select(&logical_recipient, &candidates) {
                debug!(recipient = %logical_recipient, instance = %instance, "Load-balanced to instance");
                working.recipient = instance;
            }
        }

        match self.sender.send_message(working).await {
            Ok(receipt) => {
                self.breaker.record_success(&logical_recipient);
                Ok(receipt)
            }
            Err(err) => {
                self.breaker.record_failure(&logical_recipient);
                Err(err)
            }
        }
    }

    /// Evaluates rules in descending priority order (insertion order breaks
    /// ties), then applies the built-in default: high-priority traffic that
    /// no rule redirected escalates to the supervisor.
    fn apply_rules(&self, mut working: AgentMessage) -> Result<AgentMessage> {
        let rules: Vec<RoutingRule> = {
            let guard = self.rules.read().unwrap();
            let mut sorted = guard.clone();
            sorted.sort_by(|a, b| b.priority.cmp(&a.priority));
            sorted
        };

        let mut redirected = false;
        for rule in &rules {
            if !rule.matches(&working) {
                continue;
            }
            match &rule.action {
                RuleAction::Filter => {
                    debug!(rule_id = %rule.id, "Message filtered by routing rules");
                    return Err(WireError::Filtered);
                }
                RuleAction::Transform { transformer } => {
                    if self.config.enable_message_transformation {
                        debug!(rule_id = %rule.id, "Transform rule applied");
                        working = transformer(working);
                    }
                }
                RuleAction::Route { target } => {
                    debug!(rule_id = %rule.id, target = %target, "Route rule applied");
                    working.recipient = target.clone();
                    redirected = true;
                }
            }
        }

        if !redirected
            && working.metadata.priority == MessagePriority::High
            && working.recipient != roles::SUPERVISOR
        {
            debug!(original = %working.recipient, "High-priority message escalated to supervisor");
            working.recipient = roles::SUPERVISOR.to_string();
        }

        Ok(working)
    }
}
