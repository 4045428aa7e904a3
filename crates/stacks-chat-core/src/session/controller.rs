//! Session orchestration.
//!
//! The controller sequences the collaborators for one chat screen (room
//! lookup/creation, presence lifecycle, subscriptions, read
//! reconciliation) and is the only layer that turns store failures into user-visible
//! feedback. It adds no invariants of its own.

use std::sync::Arc;

use super::handle::ChatSession;
use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::message::MessageLog;
use crate::presence::PresenceTracker;
use crate::room::ChatRoomManager;
use crate::store::StoreAdapter;
use crate::unread::{UnreadReconciler, UnreadStream};
use crate::user::ChatUser;

/// Opens and tears down chat sessions over one store connection.
///
/// One controller per signed-in device; each [`open_chat`] call produces an
/// independent [`ChatSession`] handle for one screen.
///
/// [`open_chat`]: ChatSessionController::open_chat
#[derive(Clone)]
pub struct ChatSessionController {
    rooms: ChatRoomManager,
    log: MessageLog,
    presence: PresenceTracker,
    reconciler: UnreadReconciler,
    config: ChatConfig,
}

impl ChatSessionController {
    pub fn new(store: Arc<dyn StoreAdapter>) -> Self {
        Self::with_config(store, ChatConfig::default())
    }

    pub fn with_config(store: Arc<dyn StoreAdapter>, config: ChatConfig) -> Self {
        Self {
            rooms: ChatRoomManager::new(store.clone()),
            log: MessageLog::new(store.clone()),
            presence: PresenceTracker::new(store.clone()),
            reconciler: UnreadReconciler::new(store),
            config,
        }
    }

    /// Opens (or creates) the chat between `local` and `peer` and starts a
    /// live session.
    ///
    /// Authorization: students may always open, creating the room on first
    /// use. Librarians may only open rooms that already exist; the
    /// privileged side never initiates a conversation.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if a librarian tries to open a room that does not
    ///   exist yet (fatal, not retried)
    /// - `StoreUnavailable` if the room or subscriptions cannot be set up
    pub async fn open_chat(&self, local: ChatUser, peer: ChatUser) -> Result<ChatSession> {
        if !local.role.may_initiate() {
            let room_id = ChatRoomManager::room_id_for(&local.user_id, &peer.user_id);
            if self.rooms.find_room(&room_id).await?.is_none() {
                return Err(ChatError::unauthorized(
                    "only students may start a conversation",
                ));
            }
        }

        let room = self.rooms.ensure_room(&local, &peer).await?;
        self.presence.go_online(&local.user_id).await?;

        let messages = self.log.subscribe(&room.room_id).await?;
        let peer_presence = self.presence.subscribe(&peer.user_id).await?;

        tracing::debug!(room_id = %room.room_id, user_id = %local.user_id, "chat session opened");
        Ok(ChatSession::start(
            room.room_id,
            local,
            self.log.clone(),
            self.presence.clone(),
            self.reconciler.clone(),
            &self.config,
            messages,
            peer_presence,
        ))
    }

    /// Live unread counter for a room, for badge surfaces outside any open
    /// session.
    pub async fn subscribe_unread(&self, user_id: &str, room_id: &str) -> Result<UnreadStream> {
        self.reconciler.subscribe_unread(user_id, room_id).await
    }

    /// Room management surface (listing, active flag).
    pub fn rooms(&self) -> &ChatRoomManager {
        &self.rooms
    }

    /// Read/unread bookkeeping surface (indexes, mute flag).
    pub fn reconciler(&self) -> &UnreadReconciler {
        &self.reconciler
    }
}
