//! Marker image selection and read grants.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Grants the rendering host temporary read access to an image URI.
#[async_trait]
pub trait ImageGrants: Send + Sync {
    async fn grant_read(&self, uri: &str, ttl: Duration) -> Result<()>;
}

/// For hosts that can read local files without an explicit grant.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoGrantNeeded;

#[async_trait]
impl ImageGrants for NoGrantNeeded {
    async fn grant_read(&self, _uri: &str, _ttl: Duration) -> Result<()> {
        Ok(())
    }
}

/// Placeholder images used when a sender has no photo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageDefaults {
    pub active_uri: String,
    pub stale_uri: String,
    pub grant_ttl: Duration,
}

impl Default for ImageDefaults {
    fn default() -> Self {
        Self {
            active_uri: "resource://tgmap/drawable/img_user_picture_active".to_string(),
            stale_uri: "resource://tgmap/drawable/img_user_picture".to_string(),
            grant_ttl: Duration::from_secs(300),
        }
    }
}

impl ImageDefaults {
    /// URI for a marker image: the photo if there is one, else the default
    /// matching the marker's freshness.
    pub fn resolve(&self, photo_path: Option<&str>, stale: bool) -> String {
        match photo_path.map(str::trim).filter(|p| !p.is_empty()) {
            Some(path) => file_uri(path),
            None if stale => self.stale_uri.clone(),
            None => self.active_uri.clone(),
        }
    }
}

fn file_uri(path: &str) -> String {
    if path.contains("://") {
        path.to_string()
    } else {
        format!("file://{path}")
    }
}
