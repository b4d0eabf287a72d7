//! Orchestrator tests: full event flows through [`ChatService`] against an
//! in-memory SQLite store, with scripted failures where needed.

mod relay;
mod requests;

use super::*;
use async_trait::async_trait;
use lib_auth::MessageCipher;
use lib_core::dto::{ClientEvent, ServerEvent};
use lib_core::model::store::{memory_pool, ChatStore, SqliteStore, StoredMessage};
use lib_core::{AppError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Notify;

pub(super) const TEST_KEY: [u8; 32] = [42; 32];

// region: --- Test doubles

/// Chat store that delegates to SQLite but can be told to fail or to pause
/// inside `find_chat` or `drop_chat`.
pub(super) struct ScriptedStore {
    inner: SqliteStore,
    pub fail_find: AtomicBool,
    pub fail_append: AtomicBool,
    pub fail_drop: AtomicBool,
    gate_find: AtomicBool,
    gate_drop: AtomicBool,
    /// Notified when a gated call is entered.
    pub entered: Notify,
    /// Lets a gated call continue.
    pub release: Notify,
}

impl ScriptedStore {
    fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            fail_find: AtomicBool::new(false),
            fail_append: AtomicBool::new(false),
            fail_drop: AtomicBool::new(false),
            gate_find: AtomicBool::new(false),
            gate_drop: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Pause the next `find_chat` until [`Self::release`] is notified.
    pub fn gate_next_find(&self) {
        self.gate_find.store(true, Ordering::SeqCst);
    }

    /// Pause the next `drop_chat` until [`Self::release`] is notified.
    pub fn gate_next_drop(&self) {
        self.gate_drop.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatStore for ScriptedStore {
    async fn allocate_chat(&self, user_a: &str, user_b: &str) -> Result<i64> {
        self.inner.allocate_chat(user_a, user_b).await
    }

    async fn find_chat(&self, user_a: &str, user_b: &str) -> Result<Option<i64>> {
        if self.gate_find.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if self.fail_find.load(Ordering::SeqCst) {
            return Err(AppError::Store("database is locked".to_string()));
        }
        self.inner.find_chat(user_a, user_b).await
    }

    async fn append_message(&self, chat_id: i64, sender: &str, ciphertext: &str, sent_at: &str) -> Result<()> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(AppError::Store("disk I/O error".to_string()));
        }
        self.inner.append_message(chat_id, sender, ciphertext, sent_at).await
    }

    async fn read_messages(&self, chat_id: i64) -> Result<Vec<StoredMessage>> {
        self.inner.read_messages(chat_id).await
    }

    async fn drop_chat(&self, chat_id: i64) -> Result<()> {
        if self.gate_drop.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        if self.fail_drop.load(Ordering::SeqCst) {
            return Err(AppError::Store("disk I/O error".to_string()));
        }
        self.inner.drop_chat(chat_id).await
    }
}

/// Flags any message containing `needle`.
pub(super) struct KeywordModerator(pub &'static str);

#[async_trait]
impl MessageModerator for KeywordModerator {
    async fn evaluate(&self, text: &str) -> Result<Verdict> {
        Ok(Verdict {
            flagged: text.contains(self.0),
        })
    }
}

/// Flags everything, but only after `delay`.
pub(super) struct SlowModerator(pub Duration);

#[async_trait]
impl MessageModerator for SlowModerator {
    async fn evaluate(&self, _text: &str) -> Result<Verdict> {
        tokio::time::sleep(self.0).await;
        Ok(Verdict { flagged: true })
    }
}

pub(super) struct BrokenModerator;

#[async_trait]
impl MessageModerator for BrokenModerator {
    async fn evaluate(&self, _text: &str) -> Result<Verdict> {
        Err(AppError::Moderator("connection refused".to_string()))
    }
}

// endregion: --- Test doubles

// region: --- Harness

pub(super) struct Harness {
    pub service: Arc<ChatService>,
    pub clock: Arc<ManualClock>,
    /// Direct access to the database behind the service.
    pub db: SqliteStore,
    pub store: Arc<ScriptedStore>,
}

pub(super) async fn harness() -> Harness {
    build(Arc::new(NoopModerator), ChatSettings::default()).await
}

pub(super) async fn harness_with_moderator(moderator: Arc<dyn MessageModerator>) -> Harness {
    let settings = ChatSettings {
        moderator_timeout: Duration::from_millis(100),
        moderation_placeholder: "[removed]".to_string(),
        ..ChatSettings::default()
    };
    build(moderator, settings).await
}

async fn build(moderator: Arc<dyn MessageModerator>, settings: ChatSettings) -> Harness {
    let pool = memory_pool().await.expect("Failed to create test database");
    let db = SqliteStore::new(pool);
    let store = Arc::new(ScriptedStore::new(db.clone()));
    let clock = Arc::new(ManualClock::default());
    let cipher = MessageCipher::new(&TEST_KEY).expect("valid test key");

    let service = Arc::new(ChatService::new(
        settings,
        store.clone(),
        Arc::new(db.clone()),
        moderator,
        cipher,
        clock.clone(),
    ));

    Harness {
        service,
        clock,
        db,
        store,
    }
}

/// A connected test client and its mailbox.
pub(super) struct Client {
    pub name: String,
    pub handle: ConnectionHandle,
    rx: UnboundedReceiver<Outbound>,
}

impl Client {
    /// Everything queued so far.
    pub fn outbound(&mut self) -> Vec<Outbound> {
        let mut items = Vec::new();
        while let Ok(item) = self.rx.try_recv() {
            items.push(item);
        }
        items
    }

    /// Queued events, ignoring close requests.
    pub fn events(&mut self) -> Vec<ServerEvent> {
        self.outbound()
            .into_iter()
            .filter_map(|item| match item {
                Outbound::Event(event) => Some(event),
                Outbound::Close(_) => None,
            })
            .collect()
    }
}

impl Harness {
    pub async fn connect(&self, name: &str) -> Client {
        let (handle, rx) = ConnectionHandle::new();
        self.service.connect(name, handle.clone()).await;
        Client {
            name: name.to_string(),
            handle,
            rx,
        }
    }

    pub async fn send(&self, client: &Client, event: ClientEvent) {
        self.service.dispatch(&client.name, &client.handle, event).await;
    }

    pub async fn disconnect(&self, client: &Client) {
        self.service.disconnect(&client.name, client.handle.id()).await;
    }

    /// Run the request/accept flow and return the chat id. Clears both mailboxes.
    pub async fn pair(&self, sender: &mut Client, target: &mut Client) -> i64 {
        self.send(
            sender,
            ClientEvent::ChatRequest {
                target_username: target.name.clone(),
            },
        )
        .await;
        let request_id = find(&target.events(), |e| match e {
            ServerEvent::ChatRequestReceived { request_id, .. } => Some(request_id.clone()),
            _ => None,
        })
        .expect("target should receive the request");

        self.send(
            target,
            ClientEvent::ChatRequestResponse {
                request_id,
                accepted: true,
            },
        )
        .await;

        let chat_id = find(&sender.events(), |e| match e {
            ServerEvent::ChatRequestResponse {
                accepted: true,
                chat_id: Some(id),
                ..
            } => Some(*id),
            _ => None,
        })
        .expect("sender should be told the request was accepted");
        target.events();
        chat_id
    }
}

/// First event for which `f` returns something.
pub(super) fn find<T>(events: &[ServerEvent], f: impl Fn(&ServerEvent) -> Option<T>) -> Option<T> {
    events.iter().find_map(f)
}

pub(super) fn error_messages(events: &[ServerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ServerEvent::Error { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

// endregion: --- Harness
