//! Delivery scenarios with in-process callbacks
//!
//! The transmission gateway hands tokens straight to the callback registry
//! instead of going through HTTP, so these tests exercise park/resume, the
//! scanner and the state machine together without sockets.

use async_trait::async_trait;
use datarouting::executor::{ActivityCompleter, CallbackScanner, CompletionHub};
use datarouting::services::{CallbackRegistry, SimulatedRouteService, TokenSubmitter};
use datarouting::{
    CallbackResolutionError, DeliveryOptions, DeliveryRequest, DeliveryStateMachine, Packet,
    PacketStatus, ResumeToken, Supervisor, TransmissionGateway, TransmitError, TransmitOutcome,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Registers every token with the callback registry.
struct RegistrySubmitter {
    registry: Arc<CallbackRegistry>,
}

#[async_trait]
impl TokenSubmitter for RegistrySubmitter {
    async fn submit(&self, token: &ResumeToken) -> Result<(), TransmitError> {
        self.registry.register(token.clone()).await;
        Ok(())
    }
}

/// Accepts tokens but never calls back; remembers them.
#[derive(Default)]
struct BlackHole {
    tokens: Mutex<Vec<ResumeToken>>,
}

#[async_trait]
impl TokenSubmitter for BlackHole {
    async fn submit(&self, token: &ResumeToken) -> Result<(), TransmitError> {
        self.tokens.lock().unwrap().push(token.clone());
        Ok(())
    }
}

fn providers(names: &[&str]) -> Vec<String> {
    names.iter().map(|p| p.to_string()).collect()
}

fn packet(id: &str) -> Packet {
    Packet::new(id, "+017771110000", "+016660002222", "Hello")
}

fn options(transmit_timeout: Duration) -> DeliveryOptions {
    DeliveryOptions {
        transmit_timeout,
        ..DeliveryOptions::default()
    }
}

#[tokio::test]
async fn test_late_callback_after_timeout_is_rejected() {
    let hub = CompletionHub::new();
    let black_hole = Arc::new(BlackHole::default());
    let machine = DeliveryStateMachine::new(
        Arc::new(SimulatedRouteService::new(providers(&["RouteA"]), 0)),
        Arc::new(TransmissionGateway::new(hub.clone(), black_hole.clone())),
        options(Duration::from_millis(50)),
    );

    let result = machine
        .run(DeliveryRequest::new(packet("p-late"), 3, 4))
        .await
        .unwrap();

    assert_eq!(result.status(), PacketStatus::NoRoute);
    assert_eq!(result.failed_providers(), ["RouteA".to_string()]);
    assert_eq!(hub.parked_count(), 0);

    // The callback shows up after the delivery moved on
    let token = black_hole.tokens.lock().unwrap()[0].clone();
    let late = hub.complete(&token, TransmitOutcome::DELIVERED).await;
    assert_eq!(late, Err(CallbackResolutionError::UnknownToken(token)));
}

#[tokio::test]
async fn test_registry_callbacks_resume_delivery() {
    let hub = CompletionHub::new();
    let registry = Arc::new(CallbackRegistry::new(
        Arc::new(hub.clone()),
        100,
        Duration::from_secs(1),
    ));
    let machine = DeliveryStateMachine::new(
        Arc::new(SimulatedRouteService::new(providers(&["RouteA", "RouteB"]), 0)),
        Arc::new(TransmissionGateway::new(
            hub.clone(),
            RegistrySubmitter {
                registry: registry.clone(),
            },
        )),
        options(Duration::from_secs(5)),
    );
    let supervisor = Supervisor::new()
        .with_component(
            CallbackScanner::new(registry.clone()).with_scan_interval(Duration::from_millis(10)),
        )
        .start();

    let result = machine
        .run(DeliveryRequest::new(packet("p-1"), 3, 4))
        .await
        .unwrap();

    assert_eq!(result.status(), PacketStatus::Delivered);
    assert_eq!(result.current_provider(), "RouteA");
    assert_eq!(registry.pending_count().await, 0);

    assert!(supervisor.shutdown().await.is_clean());
}

#[tokio::test]
async fn test_invariants_hold_under_random_failures() {
    let hub = CompletionHub::new();
    let registry = Arc::new(CallbackRegistry::new(
        Arc::new(hub.clone()),
        50,
        Duration::from_secs(1),
    ));
    let machine = DeliveryStateMachine::new(
        Arc::new(SimulatedRouteService::new(
            providers(&["RouteA", "RouteB", "RouteC", "RouteD", "RouteE"]),
            30,
        )),
        Arc::new(TransmissionGateway::new(
            hub.clone(),
            RegistrySubmitter {
                registry: registry.clone(),
            },
        )),
        options(Duration::from_millis(100)),
    );
    let supervisor = Supervisor::new()
        .with_component(
            CallbackScanner::new(registry.clone()).with_scan_interval(Duration::from_millis(10)),
        )
        .start();

    let transmit_max_attempts = 3;
    let runs = (0..20).map(|i| {
        let machine = machine.clone();
        tokio::spawn(async move {
            machine
                .run(DeliveryRequest::new(
                    packet(&format!("p-{i}")),
                    3,
                    transmit_max_attempts,
                ))
                .await
        })
    });

    for run in runs.collect::<Vec<_>>() {
        let packet = match run.await.unwrap() {
            Ok(packet) => packet,
            // Route lookup gave up; the partial packet must still be consistent
            Err(failure) => failure.packet,
        };

        let failed = packet.failed_providers();
        assert!(failed.len() <= transmit_max_attempts);

        let mut unique = failed.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), failed.len(), "duplicate provider in {failed:?}");

        if !packet.current_provider().is_empty() {
            assert_eq!(packet.status(), PacketStatus::Delivered);
            assert!(!failed.contains(&packet.current_provider().to_string()));
        }
        if packet.status() == PacketStatus::Delivered {
            assert!(!packet.current_provider().is_empty());
        }
    }

    assert_eq!(hub.parked_count(), 0);
    supervisor.shutdown().await;
}
