use async_trait::async_trait;

use crate::domain::{ChatId, UserId};

/// Profile data the chat client knows about a user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub phone_number: String,
    /// Local path of the downloaded profile photo, if any.
    pub photo_path: Option<String>,
    /// Local path of the greyscale variant used for stale markers.
    pub grey_photo_path: Option<String>,
}

impl UserProfile {
    /// Marker label: full name, then handle, then phone, then raw id.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let candidates = [full.trim(), self.username.trim(), self.phone_number.trim()];
        let label = candidates
            .into_iter()
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.id.to_string());
        label
    }

    pub fn photo_for(&self, stale: bool) -> Option<&str> {
        let path = if stale {
            self.grey_photo_path.as_deref()
        } else {
            self.photo_path.as_deref()
        };
        path.filter(|p| !p.trim().is_empty())
    }
}

/// Read access to chats and users known to the chat client.
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    async fn chat_title(&self, chat_id: ChatId) -> Option<String>;

    async fn user(&self, user_id: UserId) -> Option<UserProfile>;
}
