use super::*;
use lib_core::dto::ChatIdField;

async fn chatting(h: &Harness) -> (Client, Client, i64) {
    let mut alice = h.connect("alice").await;
    let mut bob = h.connect("bob").await;
    let chat_id = h.pair(&mut alice, &mut bob).await;
    (alice, bob, chat_id)
}

fn say(chat_id: i64, text: &str) -> ClientEvent {
    ClientEvent::SendMessage {
        other_user: None,
        chat_id: Some(ChatIdField::Number(chat_id)),
        message: text.to_string(),
    }
}

fn received(events: &[ServerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::NewMessage { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_flagged_message_is_replaced_not_blocked() {
    // Arrange
    let h = harness_with_moderator(Arc::new(KeywordModerator("casino"))).await;
    let (alice, mut bob, chat_id) = chatting(&h).await;

    // Act
    h.send(&alice, say(chat_id, "free casino chips")).await;
    h.send(&alice, say(chat_id, "see you at noon")).await;

    // Assert
    assert_eq!(received(&bob.events()), vec!["[removed]", "see you at noon"]);
    let history: Vec<String> = h
        .service
        .sessions()
        .history_of(chat_id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(history, vec!["[removed]", "see you at noon"]);
}

#[tokio::test]
async fn test_moderator_timeout_delivers_original() {
    // Flags everything, but far too slowly for the 100ms deadline.
    let h = harness_with_moderator(Arc::new(SlowModerator(Duration::from_secs(5)))).await;
    let (alice, mut bob, chat_id) = chatting(&h).await;

    let started = std::time::Instant::now();
    h.send(&alice, say(chat_id, "hello")).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(received(&bob.events()), vec!["hello"]);
}

#[tokio::test]
async fn test_moderator_failure_delivers_original() {
    let h = harness_with_moderator(Arc::new(BrokenModerator)).await;
    let (mut alice, mut bob, chat_id) = chatting(&h).await;

    h.send(&alice, say(chat_id, "still works")).await;

    assert_eq!(received(&bob.events()), vec!["still works"]);
    assert!(error_messages(&alice.events()).is_empty());
}

#[tokio::test]
async fn test_store_failure_reports_to_sender_only() {
    // Arrange
    let h = harness().await;
    let (mut alice, mut bob, chat_id) = chatting(&h).await;
    h.store.fail_append.store(true, Ordering::SeqCst);

    // Act
    h.send(&alice, say(chat_id, "will not be saved")).await;

    // Assert
    let alice_events = alice.events();
    assert!(received(&alice_events).is_empty());
    assert_eq!(error_messages(&alice_events).len(), 1);
    assert!(bob.events().is_empty());
    assert!(h.service.sessions().session_of("alice").await.is_some());
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let h = harness().await;
    let (mut alice, mut bob, chat_id) = chatting(&h).await;

    h.send(&alice, say(chat_id, "   ")).await;

    assert_eq!(
        error_messages(&alice.events()),
        vec!["Message cannot be empty".to_string()]
    );
    assert!(bob.events().is_empty());
}

#[tokio::test]
async fn test_wrong_chat_id_is_rejected() {
    let h = harness().await;
    let (mut alice, _bob, chat_id) = chatting(&h).await;

    h.send(&alice, say(chat_id + 1, "misaddressed")).await;

    assert_eq!(error_messages(&alice.events()), vec!["Chat room not found".to_string()]);
    assert!(h.db.read_messages(chat_id).await.unwrap().is_empty());
}
