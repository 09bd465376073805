//! Event routing from the protocol engine into the store.
//!
//! Single consumer: per-chat ordering is whatever the engine delivered.
//! Per-event errors are logged and counted, never fatal to the loop;
//! sustained store failures escalate to a reconnect so idempotent replay
//! can repair the gap.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use wabridge_proto::{ClientEvent, HistorySync, MessageEvent};
use wabridge_store::{MessageStore, StoreError, StoredMessage};

use crate::health::HealthState;
use crate::qr::{self, QrState};

/// Consecutive store failures within the window that force a reconnect.
const DB_FAILURE_BUDGET: u32 = 5;
const DB_FAILURE_WINDOW: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct EventContext {
    pub store: Arc<MessageStore>,
    pub health: Arc<HealthState>,
    pub qr: Arc<QrState>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LoopOutcome {
    Shutdown,
    Disconnected { was_connected: bool },
}

pub async fn run_event_loop(
    mut events: mpsc::Receiver<ClientEvent>,
    ctx: &EventContext,
    shutdown: &mut watch::Receiver<bool>,
) -> LoopOutcome {
    let mut was_connected = false;
    let mut failures = FailureWindow::default();

    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => return LoopOutcome::Shutdown,
            event = events.recv() => match event {
                Some(event) => event,
                // Engine dropped its sender: treat as a disconnect.
                None => return LoopOutcome::Disconnected { was_connected },
            },
        };

        match event {
            ClientEvent::Qr { code } => {
                info!("pairing QR code refreshed, scan it with the phone");
                qr::print_terminal(&code);
                ctx.qr.set(code).await;
            }

            ClientEvent::PairSuccess { jid } => {
                info!(%jid, "device paired");
                ctx.qr.clear().await;
                ctx.health.set_authenticated(true);
            }

            ClientEvent::Connected => {
                info!("connected to WhatsApp");
                ctx.health.set_connected(true);
                was_connected = true;
            }

            ClientEvent::Disconnected { reason } => {
                warn!(%reason, "disconnected");
                ctx.health.set_connected(false);
                return LoopOutcome::Disconnected { was_connected };
            }

            ClientEvent::LoggedOut => {
                warn!("device was logged out remotely, pairing required");
                ctx.health.set_authenticated(false);
                ctx.qr.clear().await;
            }

            ClientEvent::Message(message) => {
                debug!(id = %message.id, chat = %message.chat, from_me = message.from_me, "message event");
                match ingest_message(ctx, &message).await {
                    Ok(()) => failures.clear(),
                    Err(err) => {
                        error!(error = %err, id = %message.id, chat = %message.chat, "failed to persist message");
                        ctx.health.record_error(err.to_string()).await;
                        if failures.note() {
                            warn!("store failure budget exhausted, forcing reconnect");
                            ctx.health.set_connected(false);
                            return LoopOutcome::Disconnected { was_connected };
                        }
                    }
                }
            }

            ClientEvent::HistorySync(batch) => {
                let stats = ingest_history(ctx, batch).await;
                info!(
                    chats = stats.chats,
                    messages = stats.messages,
                    errors = stats.errors,
                    "history sync batch ingested"
                );
                ctx.health.record_sync().await;
            }

            ClientEvent::ChatRenamed { jid, name } => {
                debug!(%jid, %name, "chat renamed");
                if let Err(err) = ctx.store.rename_chat(&jid.to_string(), &name).await {
                    error!(error = %err, %jid, "failed to persist chat rename");
                    ctx.health.record_error(err.to_string()).await;
                }
            }
        }
    }
}

async fn ingest_message(ctx: &EventContext, event: &MessageEvent) -> Result<(), StoreError> {
    let chat_jid = event.chat.to_string();
    // Chat row first so the message's foreign key always resolves; the
    // upsert also bumps last_message_time to the new maximum.
    ctx.store
        .upsert_chat(&chat_jid, None, event.timestamp)
        .await?;
    ctx.store.upsert_message(&to_row(event, chat_jid)).await
}

#[derive(Debug, Default)]
pub struct HistoryStats {
    pub chats: usize,
    pub messages: usize,
    pub errors: usize,
}

async fn ingest_history(ctx: &EventContext, batch: HistorySync) -> HistoryStats {
    let mut stats = HistoryStats::default();

    for conversation in batch.conversations {
        let chat_jid = conversation.jid.to_string();

        let mut messages = conversation.messages;
        // Batch order is unspecified; resolve ties by (timestamp, id).
        messages.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));

        // Empty conversation pushes still create the chat row; the epoch
        // timestamp never outranks a real message.
        let batch_max: DateTime<Utc> = messages
            .iter()
            .map(|m| m.timestamp)
            .max()
            .unwrap_or(DateTime::UNIX_EPOCH);

        if let Err(err) = ctx
            .store
            .upsert_chat(&chat_jid, conversation.name.as_deref(), batch_max)
            .await
        {
            error!(error = %err, chat = %chat_jid, "failed to upsert chat from history sync");
            ctx.health.record_error(err.to_string()).await;
            stats.errors += 1;
            continue;
        }
        stats.chats += 1;

        for message in &messages {
            match ctx.store.upsert_message(&to_row(message, chat_jid.clone())).await {
                Ok(()) => stats.messages += 1,
                Err(err) => {
                    error!(error = %err, id = %message.id, chat = %chat_jid, "failed to upsert history message");
                    ctx.health.record_error(err.to_string()).await;
                    stats.errors += 1;
                }
            }
        }
    }

    stats
}

fn to_row(event: &MessageEvent, chat_jid: String) -> StoredMessage {
    StoredMessage {
        id: event.id.clone(),
        chat_jid,
        sender: event.sender.to_string(),
        content: event.content.text(),
        timestamp: event.timestamp,
        is_from_me: event.from_me,
        media: event.content.media(),
    }
}

#[derive(Default)]
struct FailureWindow {
    count: u32,
    since: Option<Instant>,
}

impl FailureWindow {
    fn clear(&mut self) {
        self.count = 0;
        self.since = None;
    }

    /// Record one failure; true when the budget is exhausted.
    fn note(&mut self) -> bool {
        let now = Instant::now();
        match self.since {
            Some(since) if now.duration_since(since) <= DB_FAILURE_WINDOW => {
                self.count += 1;
            }
            _ => {
                self.since = Some(now);
                self.count = 1;
            }
        }
        self.count >= DB_FAILURE_BUDGET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wabridge_proto::{Conversation, Jid, MessageContent};
    use wabridge_store::Dsn;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    async fn context() -> (EventContext, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::open(&Dsn::Sqlite(dir.path().join("messages.db")))
            .await
            .unwrap();
        let ctx = EventContext {
            store: Arc::new(store),
            health: Arc::new(HealthState::default()),
            qr: Arc::new(QrState::default()),
        };
        (ctx, dir)
    }

    fn message(id: &str, chat: &str, secs: i64, body: &str) -> MessageEvent {
        MessageEvent {
            id: id.into(),
            chat: Jid::parse(chat).unwrap(),
            sender: Jid::new("15550001111", "s.whatsapp.net"),
            from_me: false,
            timestamp: ts(secs),
            content: MessageContent::text_message(body),
        }
    }

    #[tokio::test]
    async fn message_creates_chat_row_first() {
        let (ctx, _dir) = context().await;
        ingest_message(&ctx, &message("M1", "a@s.whatsapp.net", 100, "hi"))
            .await
            .unwrap();

        let chats = ctx.store.get_chats().await.unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].jid, "a@s.whatsapp.net");
        // Invariant: chat.last_message_time >= message timestamp.
        assert!(chats[0].last_message_time.unwrap() >= ts(100));
    }

    #[tokio::test]
    async fn history_sync_sets_batch_max_and_name() {
        let (ctx, _dir) = context().await;
        let batch = HistorySync {
            conversations: vec![Conversation {
                jid: Jid::parse("room@g.us").unwrap(),
                name: Some("The Room".into()),
                messages: vec![
                    message("B", "room@g.us", 200, "second"),
                    message("A", "room@g.us", 100, "first"),
                ],
            }],
        };

        let stats = ingest_history(&ctx, batch).await;
        assert_eq!(stats.chats, 1);
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.errors, 0);

        let chats = ctx.store.get_chats().await.unwrap();
        assert_eq!(chats[0].name.as_deref(), Some("The Room"));
        assert_eq!(chats[0].last_message_time, Some(ts(200)));
    }

    #[tokio::test]
    async fn replayed_events_deduplicate() {
        let (ctx, _dir) = context().await;
        for _ in 0..2 {
            for i in 0..10 {
                ingest_message(
                    &ctx,
                    &message(&format!("M{i}"), "a@s.whatsapp.net", i, "body"),
                )
                .await
                .unwrap();
            }
        }
        assert_eq!(ctx.store.count_messages().await.unwrap(), 10);

        ingest_message(&ctx, &message("M10", "a@s.whatsapp.net", 10, "new"))
            .await
            .unwrap();
        assert_eq!(ctx.store.count_messages().await.unwrap(), 11);
    }

    #[tokio::test]
    async fn loop_routes_events_and_reports_disconnect() {
        let (ctx, _dir) = context().await;
        let (tx, rx) = mpsc::channel(16);
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = {
            let ctx = ctx.clone();
            tokio::spawn(async move { run_event_loop(rx, &ctx, &mut shutdown_rx).await })
        };

        tx.send(ClientEvent::Connected).await.unwrap();
        tx.send(ClientEvent::Qr {
            code: "2@pairme".into(),
        })
        .await
        .unwrap();
        tx.send(ClientEvent::Message(Box::new(message(
            "M1",
            "a@s.whatsapp.net",
            5,
            "hello",
        ))))
        .await
        .unwrap();
        tx.send(ClientEvent::PairSuccess {
            jid: Jid::parse("15551234567@s.whatsapp.net").unwrap(),
        })
        .await
        .unwrap();
        tx.send(ClientEvent::Disconnected {
            reason: "socket closed".into(),
        })
        .await
        .unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(
            outcome,
            LoopOutcome::Disconnected {
                was_connected: true
            }
        );
        assert!(ctx.health.is_authenticated());
        assert!(!ctx.qr.has_code().await);
        assert_eq!(ctx.store.count_messages().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn shutdown_wins_over_idle_queue() {
        let (ctx, _dir) = context().await;
        let (_tx, rx) = mpsc::channel(16);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = {
            let ctx = ctx.clone();
            tokio::spawn(async move { run_event_loop(rx, &ctx, &mut shutdown_rx).await })
        };
        shutdown_tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), LoopOutcome::Shutdown);
    }

    #[test]
    fn failure_window_budget() {
        let mut window = FailureWindow::default();
        for _ in 0..4 {
            assert!(!window.note());
        }
        assert!(window.note());

        window.clear();
        assert!(!window.note());
    }
}
