//! Room lifecycle management.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use super::model::ChatRoom;
use crate::error::{ChatError, Result};
use crate::store::{StoreAdapter, path};
use crate::unread::UserChatIndex;
use crate::user::ChatUser;

/// Creates and locates two-participant rooms.
///
/// `ChatRoomManager` owns room metadata and the participant roster. Room
/// creation is race-safe without locks: the id is a pure function of the
/// participant pair, and the creation payload is identical no matter which
/// side writes it first, so a concurrent double-create converges on the
/// same record.
#[derive(Clone)]
pub struct ChatRoomManager {
    store: Arc<dyn StoreAdapter>,
}

impl ChatRoomManager {
    pub fn new(store: Arc<dyn StoreAdapter>) -> Self {
        Self { store }
    }

    /// Derives the room id for a participant pair, order-independent.
    ///
    /// The separator is outside the id alphabet used by the auth layer, so
    /// distinct pairs can never collide on the same key.
    pub fn room_id_for(a: &str, b: &str) -> String {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        format!("{lo}#{hi}")
    }

    /// Gets or creates the room for `local` and `peer`.
    ///
    /// On first creation the room record and both participants' chat
    /// indexes (unread 0, nothing read) commit together. Calling this
    /// concurrently from both devices is benign: both converge on one room.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the store cannot be reached.
    pub async fn ensure_room(&self, local: &ChatUser, peer: &ChatUser) -> Result<ChatRoom> {
        let room_id = Self::room_id_for(&local.user_id, &peer.user_id);

        if let Some(value) = self.store.read_once(&path::room(&room_id)).await? {
            return Ok(serde_json::from_value(value)?);
        }

        let now = self.store.server_time();
        let room = ChatRoom::between(room_id.clone(), local, peer, now);

        let mut updates = HashMap::new();
        updates.insert(path::room(&room_id), Some(serde_json::to_value(&room)?));
        for user in [local, peer] {
            let index = UserChatIndex::fresh(room_id.clone(), now);
            updates.insert(
                path::user_chat(&user.user_id, &room_id),
                Some(serde_json::to_value(&index)?),
            );
        }
        self.store.atomic_update(updates).await?;

        tracing::debug!(%room_id, "room created");
        Ok(room)
    }

    /// Looks a room up by id.
    pub async fn find_room(&self, room_id: &str) -> Result<Option<ChatRoom>> {
        match self.store.read_once(&path::room(room_id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Toggles a room's active flag. The room itself persists for history
    /// either way.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such room exists.
    pub async fn set_active(&self, room_id: &str, is_active: bool) -> Result<()> {
        if self.find_room(room_id).await?.is_none() {
            return Err(ChatError::not_found("ChatRoom", room_id));
        }
        let now = self.store.server_time();
        let mut updates = HashMap::new();
        updates.insert(path::room_field(room_id, "is_active"), Some(json!(is_active)));
        updates.insert(
            path::room_field(room_id, "updated_at"),
            Some(json!(now.timestamp_millis())),
        );
        self.store.atomic_update(updates).await
    }
}
