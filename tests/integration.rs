//! Integration tests for Tradewire
//!
//! These tests verify that the bus and router work together correctly,
//! exercising the full delivery path: routing rules, circuit breaking, and
//! load balancing in front of real subscriptions and backlog queues.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tradewire::{
    AgentMessage, AgentStatus, BusConfig, MessageBus, MessageHandler, MessagePriority,
    MessageRouter, MessageSubscription, Result, RouterConfig, RoutingRule, WireError,
};

/// Enable log output for a test run with `RUST_LOG=debug cargo test`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

// ============================================================================
// Shared test handlers
// ============================================================================

/// Records every message it receives.
struct RecordingHandler {
    received: Mutex<Vec<AgentMessage>>,
}

impl RecordingHandler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
        })
    }

    fn received(&self) -> Vec<AgentMessage> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, msg: AgentMessage) -> Result<()> {
        self.received.lock().unwrap().push(msg);
        Ok(())
    }
}

/// Fails a configurable number of times before succeeding.
struct FlakyHandler {
    calls: AtomicU32,
    target_failures: u32,
}

impl FlakyHandler {
    fn new(target_failures: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            target_failures,
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for FlakyHandler {
    async fn handle(&self, _msg: AgentMessage) -> Result<()> {
        let count = self.calls.fetch_add(1, Ordering::SeqCst);
        if count < self.target_failures {
            Err(WireError::Delivery("transient handler failure".to_string()))
        } else {
            Ok(())
        }
    }
}

fn request(recipient: &str) -> AgentMessage {
    AgentMessage::new("planning", recipient, "request", json!({"ticker": "ACME"}))
}

// ============================================================================
// Router over a real bus
// ============================================================================

#[tokio::test]
async fn test_routed_delivery_reaches_subscriber() {
    init_tracing();
    let bus = Arc::new(MessageBus::new());
    let research = RecordingHandler::new();
    bus.subscribe(MessageSubscription::new(
        "research",
        &["request"],
        research.clone(),
    ));

    let router = MessageRouter::new(bus.clone());
    router.route_message(request("research")).await.unwrap();

    let received = research.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].metadata.routing_hops, 1);
}

#[tokio::test]
async fn test_default_rule_escalates_to_supervisor_subscriber() {
    let bus = Arc::new(MessageBus::new());
    let research = RecordingHandler::new();
    let supervisor = RecordingHandler::new();
    bus.subscribe(MessageSubscription::new(
        "research",
        &["request"],
        research.clone(),
    ));
    bus.subscribe(MessageSubscription::new(
        "supervisor",
        &["request"],
        supervisor.clone(),
    ));

    let router = MessageRouter::new(bus.clone());
    let msg = request("research").with_priority(MessagePriority::High);
    router.route_message(msg).await.unwrap();

    // The supervisor observed the message, not the addressed recipient.
    assert!(research.received().is_empty());
    assert_eq!(supervisor.received().len(), 1);
}

#[tokio::test]
async fn test_transform_output_visible_to_subscriber() {
    let bus = Arc::new(MessageBus::new());
    let analysis = RecordingHandler::new();
    bus.subscribe(MessageSubscription::new(
        "analysis",
        &["request"],
        analysis.clone(),
    ));

    let router = MessageRouter::new(bus.clone());
    router.add_routing_rule(RoutingRule::transform(
        "stamp-processed",
        10,
        |m| m.recipient == "analysis",
        |mut m| {
            m.content["processed_at"] = json!("2026-08-06T00:00:00Z");
            m
        },
    ));

    router.route_message(request("analysis")).await.unwrap();
    let received = analysis.received();
    assert_eq!(received[0].content["processed_at"], "2026-08-06T00:00:00Z");
}

#[tokio::test]
async fn test_filter_rule_blocks_subscriber() {
    let bus = Arc::new(MessageBus::new());
    let research = RecordingHandler::new();
    bus.subscribe(MessageSubscription::new(
        "research",
        &["request"],
        research.clone(),
    ));

    let router = MessageRouter::new(bus.clone());
    router.add_routing_rule(RoutingRule::filter("embargo", 10, |m| {
        m.content["ticker"] == "ACME"
    }));

    let err = router.route_message(request("research")).await.unwrap_err();
    assert!(err.to_string().contains("filtered by routing rules"));
    assert!(research.received().is_empty());
}

#[tokio::test]
async fn test_circuit_breaker_over_unsubscribed_recipient() {
    let bus = Arc::new(MessageBus::new());
    let router = MessageRouter::with_config(
        bus.clone(),
        RouterConfig {
            circuit_breaker_threshold: 3,
            ..RouterConfig::default()
        },
    )
    .unwrap();

    for _ in 0..3 {
        let err = router.route_message(request("research")).await.unwrap_err();
        assert!(err.to_string().contains("No subscribers found"));
    }
    assert_eq!(
        router.routing_stats().circuit_breaker_states["research"],
        true
    );

    // Fails immediately, and the backlog stops growing because the bus is
    // never contacted.
    let before = bus.queue_status().messages_by_agent["research"];
    let err = router.route_message(request("research")).await.unwrap_err();
    assert!(err.to_string().contains("Circuit breaker is open"));
    assert_eq!(bus.queue_status().messages_by_agent["research"], before);
}

#[tokio::test]
async fn test_load_balanced_instances_over_real_bus() {
    let bus = Arc::new(MessageBus::new());
    let one = RecordingHandler::new();
    let two = RecordingHandler::new();
    bus.subscribe(MessageSubscription::new(
        "research-1",
        &["request"],
        one.clone(),
    ));
    bus.subscribe(MessageSubscription::new(
        "research-2",
        &["request"],
        two.clone(),
    ));

    let router = MessageRouter::new(bus.clone());
    router.update_agent_status(AgentStatus::idle("research-1").with_tasks(&["t1", "t2"]));
    router.update_agent_status(AgentStatus::idle("research-2"));

    router.route_message(request("research")).await.unwrap();
    assert!(one.received().is_empty());
    assert_eq!(two.received().len(), 1);
}

#[tokio::test]
async fn test_router_observes_initial_failure_not_retries() {
    // Handler fails once; the bus recovers in the background, but the
    // router's breaker still counts the initial failure.
    let bus = Arc::new(
        MessageBus::with_config(BusConfig {
            max_retries: 3,
            retry_delay_ms: 10,
            message_timeout_ms: 500,
            max_queue_size: 8,
            enable_persistence: false,
        })
        .unwrap(),
    );
    let flaky = FlakyHandler::new(1);
    bus.subscribe(MessageSubscription::new(
        "research",
        &["request"],
        flaky.clone(),
    ));

    let router = MessageRouter::with_config(
        bus.clone(),
        RouterConfig {
            circuit_breaker_threshold: 5,
            ..RouterConfig::default()
        },
    )
    .unwrap();

    let err = router.route_message(request("research")).await.unwrap_err();
    assert!(matches!(err, WireError::Delivery(_)));

    tokio::time::sleep(Duration::from_millis(150)).await;
    // Background redelivery succeeded without the router's involvement.
    assert_eq!(flaky.calls(), 2);
    assert_eq!(
        router.routing_stats().circuit_breaker_states["research"],
        false
    );
}

// ============================================================================
// Bus-level contracts across components
// ============================================================================

#[tokio::test]
async fn test_queue_bound_under_router_traffic() {
    let bus = Arc::new(
        MessageBus::with_config(BusConfig {
            max_queue_size: 5,
            ..BusConfig::default()
        })
        .unwrap(),
    );
    let router = MessageRouter::with_config(
        bus.clone(),
        RouterConfig {
            enable_circuit_breaker: false,
            ..RouterConfig::default()
        },
    )
    .unwrap();

    for _ in 0..10 {
        let _ = router.route_message(request("synthesis")).await;
    }
    assert!(bus.queue_status().messages_by_agent["synthesis"] <= 5);
}

#[tokio::test]
async fn test_conversation_history_through_router() {
    let bus = Arc::new(MessageBus::new());
    let research = RecordingHandler::new();
    bus.subscribe(MessageSubscription::new(
        "research",
        &["request"],
        research,
    ));

    let router = MessageRouter::new(bus.clone());
    let msg = request("research").with_conversation("pipeline-42");
    router.route_message(msg).await.unwrap();

    let history = bus.conversation_history("pipeline-42");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].recipient, "research");

    bus.clear_conversation("pipeline-42");
    assert!(bus.conversation_history("pipeline-42").is_empty());
}

#[tokio::test]
async fn test_broadcast_bypasses_router_policy() {
    // Broadcast goes straight through the bus; every matching subscriber
    // sees it regardless of routing rules targeting named recipients.
    let bus = Arc::new(MessageBus::new());
    let research = RecordingHandler::new();
    let analysis = RecordingHandler::new();
    bus.subscribe(MessageSubscription::new(
        "research",
        &["update"],
        research.clone(),
    ));
    bus.subscribe(MessageSubscription::new(
        "analysis",
        &["update"],
        analysis.clone(),
    ));

    let msg = AgentMessage::new("supervisor", "broadcast", "update", json!({"note": "eod"}));
    bus.send_message(msg).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(research.received().len(), 1);
    assert_eq!(analysis.received().len(), 1);
    // Each subscriber saw the identical payload.
    assert_eq!(research.received()[0].content, analysis.received()[0].content);
}

#[tokio::test]
async fn test_retry_exhaustion_event_through_shared_bus() {
    let bus = Arc::new(
        MessageBus::with_config(BusConfig {
            max_retries: 2,
            retry_delay_ms: 10,
            message_timeout_ms: 500,
            max_queue_size: 8,
            enable_persistence: false,
        })
        .unwrap(),
    );
    let flaky = FlakyHandler::new(10);
    bus.subscribe(MessageSubscription::new(
        "compliance",
        &["request"],
        flaky,
    ));

    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = Arc::clone(&events);
    bus.on_retry_failed(move |event| {
        events_clone.lock().unwrap().push(event.clone());
    });

    let router = MessageRouter::new(bus.clone());
    let _ = router.route_message(request("compliance")).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].retry_count, 2);
    assert_eq!(events[0].message.recipient, "compliance");
}

#[tokio::test]
async fn test_validation_error_from_router_path() {
    let bus = Arc::new(MessageBus::new());
    let router = MessageRouter::new(bus.clone());

    let msg = AgentMessage::new("planning", "research", "request", serde_json::Value::Null);
    let err = router.route_message(msg).await.unwrap_err();
    assert!(err.to_string().contains("content is required"));
    assert_eq!(bus.queue_status().total_messages, 0);
}

#[tokio::test]
async fn test_cleanup_stops_background_work() {
    let bus = Arc::new(
        MessageBus::with_config(BusConfig {
            max_retries: 5,
            retry_delay_ms: 20,
            message_timeout_ms: 500,
            max_queue_size: 8,
            enable_persistence: false,
        })
        .unwrap(),
    );
    let flaky = FlakyHandler::new(10);
    bus.subscribe(MessageSubscription::new(
        "research",
        &["request"],
        flaky.clone(),
    ));

    let _ = bus.send_message(request("research")).await;
    bus.cleanup();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(flaky.calls(), 1);
    assert_eq!(bus.queue_status().retry_queue_size, 0);
}
