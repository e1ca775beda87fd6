use std::fmt;

/// Chat user id (numeric).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub i64);

/// Chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChatId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Originator of a location report.
///
/// User senders are numeric; bot-location payloads carry a free-form name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SenderKey {
    User(UserId),
    Bot(String),
}

/// Marker ids for bot payloads carry this prefix after the chat id.
const BOT_POINT_PREFIX: &str = "bot:";

/// Natural key of a marker: one marker per sender per chat.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerKey {
    pub chat_id: ChatId,
    pub sender: SenderKey,
}

impl MarkerKey {
    pub fn new(chat_id: ChatId, sender: SenderKey) -> Self {
        Self { chat_id, sender }
    }

    /// Stable point id on the rendering surface.
    ///
    /// User ids always render as a bare integer, so the `bot:` prefix keeps
    /// the two namespaces disjoint.
    pub fn point_id(&self) -> String {
        match &self.sender {
            SenderKey::User(user) => format!("{}_{}", self.chat_id, user),
            SenderKey::Bot(name) => format!("{}_{BOT_POINT_PREFIX}{name}", self.chat_id),
        }
    }
}

impl fmt::Display for MarkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.point_id())
    }
}
