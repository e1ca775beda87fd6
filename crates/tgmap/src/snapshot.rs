//! File-backed view of the chat client's state.
//!
//! The chat client periodically writes a JSON snapshot of its chats, users
//! and current location messages. Each `reports()` call re-reads the file and
//! refreshes the chat/user directory used for labels.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use tgmap_core::{
    directory::{ChatDirectory, UserProfile},
    domain::{ChatId, UserId},
    errors::Error,
    report::LocationReport,
    sweeper::ReportSource,
    Result,
};

#[derive(Debug, Default, Deserialize)]
struct SnapshotDoc {
    #[serde(default)]
    chats: Vec<ChatDoc>,
    #[serde(default)]
    users: Vec<UserDoc>,
    #[serde(default)]
    locations: Vec<LocationDoc>,
}

#[derive(Debug, Deserialize)]
struct ChatDoc {
    id: i64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct UserDoc {
    id: i64,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    phone_number: String,
    photo_path: Option<String>,
    grey_photo_path: Option<String>,
}

/// A location message: either from a user or a bot-location payload.
#[derive(Debug, Deserialize)]
struct LocationDoc {
    chat_id: i64,
    user_id: Option<i64>,
    bot_name: Option<String>,
    latitude: f64,
    longitude: f64,
    date: i64,
    edit_date: Option<i64>,
    valid: Option<bool>,
}

impl LocationDoc {
    /// Last refresh is the later of send and edit time.
    fn last_update(&self) -> i64 {
        self.edit_date.map_or(self.date, |e| e.max(self.date))
    }

    fn into_report(self) -> Result<LocationReport> {
        let chat_id = ChatId(self.chat_id);
        let last_update = self.last_update();
        match (self.bot_name, self.user_id) {
            (Some(name), _) => Ok(LocationReport::from_bot(
                chat_id,
                name,
                self.latitude,
                self.longitude,
                last_update,
                self.valid.unwrap_or(true),
            )),
            (None, Some(user_id)) => Ok(LocationReport::from_user(
                chat_id,
                UserId(user_id),
                self.latitude,
                self.longitude,
                last_update,
            )),
            (None, None) => Err(Error::MalformedReport(format!(
                "chat {chat_id}: location without sender"
            ))),
        }
    }
}

#[derive(Debug, Default)]
struct Directory {
    chats: HashMap<ChatId, String>,
    users: HashMap<UserId, UserProfile>,
}

pub struct SnapshotFile {
    path: PathBuf,
    directory: RwLock<Directory>,
}

impl SnapshotFile {
    /// Open and load the snapshot. A missing file is treated as empty.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let file = Self {
            path,
            directory: RwLock::new(Directory::default()),
        };
        file.load().await?;
        Ok(file)
    }

    async fn read_doc(&self) -> Result<SnapshotDoc> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(event = "snapshot.missing", path = %self.path.display());
                Ok(SnapshotDoc::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn load(&self) -> Result<Vec<LocationReport>> {
        let doc = self.read_doc().await?;

        let directory = Directory {
            chats: doc
                .chats
                .into_iter()
                .map(|c| (ChatId(c.id), c.title))
                .collect(),
            users: doc
                .users
                .into_iter()
                .map(|u| {
                    let id = UserId(u.id);
                    let profile = UserProfile {
                        id,
                        first_name: u.first_name,
                        last_name: u.last_name,
                        username: u.username,
                        phone_number: u.phone_number,
                        photo_path: u.photo_path,
                        grey_photo_path: u.grey_photo_path,
                    };
                    (id, profile)
                })
                .collect(),
        };
        *self
            .directory
            .write()
            .unwrap_or_else(PoisonError::into_inner) = directory;

        let mut reports = Vec::with_capacity(doc.locations.len());
        for loc in doc.locations {
            match loc.into_report() {
                Ok(r) => reports.push(r),
                Err(e) => warn!(event = "snapshot.location.skipped", error = %e),
            }
        }
        Ok(reports)
    }
}

#[async_trait]
impl ReportSource for SnapshotFile {
    async fn reports(&self) -> Result<Vec<LocationReport>> {
        self.load().await
    }
}

#[async_trait]
impl ChatDirectory for SnapshotFile {
    async fn chat_title(&self, chat_id: ChatId) -> Option<String> {
        self.directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .chats
            .get(&chat_id)
            .cloned()
    }

    async fn user(&self, user_id: UserId) -> Option<UserProfile> {
        self.directory
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .users
            .get(&user_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tgmap_core::domain::SenderKey;

    const SNAPSHOT: &str = r#"{
      "chats": [{ "id": -100, "title": "Road trip" }],
      "users": [
        { "id": 42, "first_name": "Ada", "last_name": "", "photo_path": "/p/42.jpg" }
      ],
      "locations": [
        { "chat_id": -100, "user_id": 42, "latitude": 1.0, "longitude": 2.0,
          "date": 1000, "edit_date": 1500 },
        { "chat_id": -100, "bot_name": "van", "latitude": 3.0, "longitude": 4.0,
          "date": 1200, "valid": false },
        { "chat_id": -100, "latitude": 0.0, "longitude": 0.0, "date": 1 }
      ]
    }"#;

    fn write(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn parses_reports_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::open(write(&dir, SNAPSHOT)).await.unwrap();

        let reports = file.reports().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].sender, SenderKey::User(UserId(42)));
        assert_eq!(reports[0].last_update, 1500);
        assert_eq!(reports[1].sender, SenderKey::Bot("van".to_string()));
        assert!(!reports[1].is_valid());

        assert_eq!(
            file.chat_title(ChatId(-100)).await.as_deref(),
            Some("Road trip")
        );
        let ada = file.user(UserId(42)).await.unwrap();
        assert_eq!(ada.display_name(), "Ada");
        assert_eq!(ada.photo_path.as_deref(), Some("/p/42.jpg"));
        assert!(file.user(UserId(7)).await.is_none());
    }

    #[tokio::test]
    async fn reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, SNAPSHOT);
        let file = SnapshotFile::open(path.clone()).await.unwrap();

        std::fs::write(&path, r#"{ "chats": [{ "id": 5, "title": "New" }] }"#).unwrap();
        assert!(file.reports().await.unwrap().is_empty());
        assert_eq!(file.chat_title(ChatId(5)).await.as_deref(), Some("New"));
        assert!(file.chat_title(ChatId(-100)).await.is_none());
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::open(dir.path().join("absent.json"))
            .await
            .unwrap();
        assert!(file.reports().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SnapshotFile::open(write(&dir, "{ not json"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Json(_)));
    }
}
