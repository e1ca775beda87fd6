//! Shared, read-mostly reconciliation settings.

use std::{
    collections::HashSet,
    sync::{PoisonError, RwLock},
};

use crate::{domain::ChatId, freshness::Horizons};

/// Horizons and chat visibility. Writes take effect on the next
/// classification; no pass holds these locks across an `.await`.
#[derive(Debug)]
pub struct Settings {
    horizons: RwLock<Horizons>,
    visible_chats: RwLock<HashSet<ChatId>>,
}

impl Settings {
    pub fn new(horizons: Horizons, visible_chats: impl IntoIterator<Item = ChatId>) -> Self {
        Self {
            horizons: RwLock::new(horizons),
            visible_chats: RwLock::new(visible_chats.into_iter().collect()),
        }
    }

    pub fn horizons(&self) -> Horizons {
        *self.horizons.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_horizons(&self, horizons: Horizons) {
        *self.horizons.write().unwrap_or_else(PoisonError::into_inner) = horizons;
    }

    pub fn is_chat_visible(&self, chat_id: ChatId) -> bool {
        self.visible_chats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&chat_id)
    }

    /// Returns true when the visibility actually changed.
    pub fn set_chat_visible(&self, chat_id: ChatId, visible: bool) -> bool {
        let mut chats = self
            .visible_chats
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if visible {
            chats.insert(chat_id)
        } else {
            chats.remove(&chat_id)
        }
    }

    pub fn visible_chats(&self) -> HashSet<ChatId> {
        self.visible_chats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
