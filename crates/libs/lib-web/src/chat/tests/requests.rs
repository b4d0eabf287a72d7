use super::*;
use chrono::TimeDelta;

// ========== Broker ==========

#[tokio::test]
async fn test_request_expires_exactly_at_ttl() {
    // Arrange
    let h = harness().await;
    let alice = h.connect("alice").await;
    let _bob = h.connect("bob").await;
    h.send(&alice, ClientEvent::ChatRequest { target_username: "bob".into() }).await;
    let broker = h.service.broker();
    let clock: Arc<dyn Clock> = h.clock.clone();

    // Act / Assert
    h.clock.advance(TimeDelta::seconds(299));
    assert_eq!(sweep_once(broker, clock.as_ref()).await, 0);
    assert_eq!(broker.pending_for("bob").await.len(), 1);

    h.clock.advance(TimeDelta::seconds(1));
    assert_eq!(sweep_once(broker, clock.as_ref()).await, 1);
    assert!(broker.pending_for("bob").await.is_empty());
}

#[tokio::test]
async fn test_expired_request_cannot_be_accepted() {
    let h = harness().await;
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    h.send(&alice, ClientEvent::ChatRequest { target_username: "bob".into() }).await;
    let request_id = find(&bob.events(), |e| match e {
        ServerEvent::ChatRequestReceived { request_id, .. } => Some(request_id.clone()),
        _ => None,
    })
    .unwrap();
    alice.events();

    h.clock.advance(TimeDelta::seconds(301));
    h.service.broker().sweep(h.clock.now()).await;
    h.send(&bob, ClientEvent::ChatRequestResponse { request_id, accepted: true }).await;

    // Silent expiry: nobody hears anything and no chat appears.
    assert!(alice.events().is_empty());
    assert!(bob.events().is_empty());
    assert!(!h.service.sessions().is_occupied("bob").await);
}

#[tokio::test]
async fn test_sender_may_have_several_outgoing_requests() {
    let h = harness().await;
    let alice = h.connect("alice").await;
    let _bob = h.connect("bob").await;
    let _carol = h.connect("carol").await;

    h.send(&alice, ClientEvent::ChatRequest { target_username: "bob".into() }).await;
    h.send(&alice, ClientEvent::ChatRequest { target_username: "carol".into() }).await;
    h.send(&alice, ClientEvent::ChatRequest { target_username: "bob".into() }).await;

    let broker = h.service.broker();
    assert_eq!(broker.pending_count().await, 3);
    assert_eq!(broker.pending_for("bob").await.len(), 2);
}

#[tokio::test]
async fn test_self_request_is_invalid_input() {
    let h = harness().await;
    let service = &h.service;
    let _alice = h.connect("alice").await;

    let err = service
        .broker()
        .create("alice", "alice", service.presence(), service.sessions())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(service.broker().pending_count().await, 0);
}

#[tokio::test]
async fn test_resolve_unknown_request_is_ignored() {
    let h = harness().await;
    let resolution = h.service.broker().resolve("no-such-id", "bob", true).await;
    assert_eq!(resolution, Resolution::Ignored);
}

// ========== Sweeper ==========

#[tokio::test]
async fn test_sweeper_task_expires_requests() {
    // Arrange
    let h = harness().await;
    let alice = h.connect("alice").await;
    let _bob = h.connect("bob").await;
    h.send(&alice, ClientEvent::ChatRequest { target_username: "bob".into() }).await;
    h.clock.advance(TimeDelta::seconds(600));

    // Act
    let clock: Arc<dyn Clock> = h.clock.clone();
    let sweeper = spawn_sweeper(h.service.broker().clone(), clock, Duration::from_millis(10));
    tokio::time::sleep(Duration::from_millis(100)).await;
    sweeper.abort();

    // Assert
    assert_eq!(h.service.broker().pending_count().await, 0);
    assert_eq!(h.service.presence().len().await, 2);
}
