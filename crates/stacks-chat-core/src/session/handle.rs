//! A live chat session for one open chat screen.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::message::{Message, MessageKind, MessageLog, MessageStream};
use crate::presence::{PresenceRecord, PresenceStream, PresenceTracker};
use crate::unread::UnreadReconciler;
use crate::user::ChatUser;

/// Handle for one open chat screen.
///
/// Owns every resource the screen leases: the message and presence
/// listeners (as pump tasks feeding `watch` channels), the trailing typing
/// timer, and the local user's online presence. [`close`](ChatSession::close)
/// releases all of it; dropping an unclosed session aborts the tasks so a
/// forgotten screen cannot leak listeners.
impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("room_id", &self.room_id)
            .field("local", &self.local)
            .finish_non_exhaustive()
    }
}

pub struct ChatSession {
    room_id: String,
    local: ChatUser,
    log: MessageLog,
    presence: PresenceTracker,
    reconciler: UnreadReconciler,
    typing_idle: Duration,
    system_sender_id: String,
    messages_tx: Arc<watch::Sender<Vec<Message>>>,
    messages_rx: watch::Receiver<Vec<Message>>,
    presence_rx: watch::Receiver<PresenceRecord>,
    persisted: Arc<Mutex<Vec<Message>>>,
    notices: Arc<Mutex<Vec<Message>>>,
    typing_timer: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatSession {
    /// Spawns the pump tasks and wires the live channels. Only the
    /// controller constructs sessions.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn start(
        room_id: String,
        local: ChatUser,
        log: MessageLog,
        presence: PresenceTracker,
        reconciler: UnreadReconciler,
        config: &ChatConfig,
        messages: MessageStream,
        peer_presence: PresenceStream,
    ) -> Self {
        let (messages_tx, messages_rx) = watch::channel(Vec::new());
        let messages_tx = Arc::new(messages_tx);
        let (presence_tx, presence_rx) = watch::channel(PresenceRecord::default());
        let cancel = CancellationToken::new();
        let persisted = Arc::new(Mutex::new(Vec::new()));
        let notices = Arc::new(Mutex::new(Vec::new()));

        let message_pump = tokio::spawn(run_message_pump(
            messages,
            room_id.clone(),
            local.user_id.clone(),
            reconciler.clone(),
            persisted.clone(),
            notices.clone(),
            messages_tx.clone(),
            cancel.clone(),
        ));
        let presence_pump = tokio::spawn(run_presence_pump(
            peer_presence,
            presence_tx,
            cancel.clone(),
        ));

        Self {
            room_id,
            local,
            log,
            presence,
            reconciler,
            typing_idle: config.typing_idle(),
            system_sender_id: config.system_sender_id.clone(),
            messages_tx,
            messages_rx,
            presence_rx,
            persisted,
            notices,
            typing_timer: Mutex::new(None),
            cancel,
            tasks: vec![message_pump, presence_pump],
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// The live, totally-ordered message list for the UI to observe.
    pub fn messages(&self) -> watch::Receiver<Vec<Message>> {
        self.messages_rx.clone()
    }

    /// The peer's live presence value for the UI to observe.
    pub fn peer_presence(&self) -> watch::Receiver<PresenceRecord> {
        self.presence_rx.clone()
    }

    /// Sends a text message to the room.
    ///
    /// The message becomes visible through [`messages`](Self::messages)
    /// only once the store delivers it back on the subscription; there is
    /// no optimistic echo. If the store is unreachable, a local system
    /// notice (never persisted) is surfaced in the live list instead and
    /// the call still succeeds; the shared log stays untouched.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMessage` for empty/whitespace text.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(ChatError::invalid_message("text is empty"));
        }

        // The send supersedes any composing state.
        self.stop_typing().await;

        match self
            .log
            .append(
                &self.room_id,
                &self.local.user_id,
                text,
                MessageKind::Text,
                HashMap::new(),
            )
            .await
        {
            Ok(message) => {
                let participants: Vec<String> = message.read_by.keys().cloned().collect();
                if let Err(err) = self
                    .reconciler
                    .note_appended(&self.room_id, &self.local.user_id, &participants)
                    .await
                {
                    tracing::warn!(%err, "unread reconcile after send failed; next cycle converges");
                }
                Ok(())
            }
            Err(err) if err.is_store_unavailable() => {
                tracing::warn!(%err, room_id = %self.room_id, "send failed, surfacing local notice");
                self.push_send_failure(text).await;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Reflects composer activity in the peer-visible typing flag.
    ///
    /// `true` publishes typing immediately and (re)arms a single trailing
    /// timer: after the idle window with no further touches, typing clears
    /// exactly once. `false` disarms and clears immediately. Store failures
    /// here are swallowed, typing is best-effort.
    pub async fn set_composing(&self, composing: bool) {
        if composing {
            if let Err(err) = self.presence.set_typing(&self.local.user_id, true).await {
                tracing::debug!(%err, "typing update dropped");
            }
            self.arm_typing_timer().await;
        } else {
            self.stop_typing().await;
        }
    }

    /// Tears the session down: stops both pumps, disarms the typing timer,
    /// clears the typing flag and goes offline.
    ///
    /// After this returns no further values are delivered on the watch
    /// channels. A failing offline write is left to the store's disconnect
    /// hook to settle.
    pub async fn close(mut self) {
        tracing::debug!(room_id = %self.room_id, user_id = %self.local.user_id, "closing chat session");
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Some(timer) = self.typing_timer.lock().await.take() {
            timer.abort();
        }
        if let Err(err) = self.presence.set_typing(&self.local.user_id, false).await {
            tracing::debug!(%err, "typing clear on close dropped");
        }
        if let Err(err) = self.presence.go_offline(&self.local.user_id).await {
            tracing::warn!(%err, "graceful offline failed; disconnect hook will settle presence");
        }
    }

    async fn arm_typing_timer(&self) {
        let mut guard = self.typing_timer.lock().await;
        if let Some(previous) = guard.take() {
            previous.abort();
        }
        let presence = self.presence.clone();
        let user_id = self.local.user_id.clone();
        let idle = self.typing_idle;
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            if let Err(err) = presence.set_typing(&user_id, false).await {
                tracing::debug!(%err, "typing auto-clear dropped");
            }
        }));
    }

    async fn stop_typing(&self) {
        if let Some(timer) = self.typing_timer.lock().await.take() {
            timer.abort();
        }
        if let Err(err) = self.presence.set_typing(&self.local.user_id, false).await {
            tracing::debug!(%err, "typing clear dropped");
        }
    }

    async fn push_send_failure(&self, text: &str) {
        let notice = Message {
            message_id: format!("local-{}", Uuid::new_v4()),
            sender_id: self.system_sender_id.clone(),
            text: "Message could not be sent. Check your connection and try again.".to_string(),
            timestamp: Utc::now(),
            kind: MessageKind::System,
            read_by: HashMap::from([(self.local.user_id.clone(), true)]),
            metadata: HashMap::from([
                ("delivery".to_string(), json!("failed")),
                ("original_text".to_string(), json!(text)),
            ]),
        };
        self.notices.lock().await.push(notice);
        let composed = compose(&*self.persisted.lock().await, &*self.notices.lock().await);
        let _ = self.messages_tx.send(composed);
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        if let Ok(mut guard) = self.typing_timer.try_lock() {
            if let Some(timer) = guard.take() {
                timer.abort();
            }
        }
    }
}

/// Store snapshots in, watch updates out. Any unread peer message in a
/// snapshot is wired straight through `mark_read` so the badge clears while
/// the chat is focused.
#[allow(clippy::too_many_arguments)]
async fn run_message_pump(
    mut messages: MessageStream,
    room_id: String,
    local_id: String,
    reconciler: UnreadReconciler,
    persisted: Arc<Mutex<Vec<Message>>>,
    notices: Arc<Mutex<Vec<Message>>>,
    messages_tx: Arc<watch::Sender<Vec<Message>>>,
    cancel: CancellationToken,
) {
    loop {
        let snapshot = tokio::select! {
            _ = cancel.cancelled() => break,
            snapshot = messages.recv() => match snapshot {
                Some(snapshot) => snapshot,
                None => break,
            },
        };

        let has_unread = snapshot
            .iter()
            .any(|m| m.sender_id != local_id && !m.is_read_by(&local_id));

        {
            let mut guard = persisted.lock().await;
            *guard = snapshot;
            let composed = compose(&guard, &*notices.lock().await);
            let _ = messages_tx.send(composed);
        }

        if has_unread {
            if let Err(err) = reconciler.mark_read(&room_id, &local_id).await {
                tracing::warn!(%err, %room_id, "mark_read on arrival failed");
            }
        }
    }
}

async fn run_presence_pump(
    mut peer_presence: PresenceStream,
    presence_tx: watch::Sender<PresenceRecord>,
    cancel: CancellationToken,
) {
    loop {
        let record = tokio::select! {
            _ = cancel.cancelled() => break,
            record = peer_presence.recv() => match record {
                Some(record) => record,
                None => break,
            },
        };
        let _ = presence_tx.send(record);
    }
}

/// Persisted snapshot first, local notices appended after: notices are
/// always newer than anything the store has delivered.
fn compose(persisted: &[Message], notices: &[Message]) -> Vec<Message> {
    let mut composed = Vec::with_capacity(persisted.len() + notices.len());
    composed.extend_from_slice(persisted);
    composed.extend_from_slice(notices);
    composed
}
