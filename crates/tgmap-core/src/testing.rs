//! Fake ports shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    directory::{ChatDirectory, UserProfile},
    domain::{ChatId, UserId},
    errors::Error,
    images::ImageGrants,
    surface::{
        port::MarkerSurface,
        types::{MapLayer, MapPoint},
    },
    Result,
};

#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceCall {
    EnsureLayer(String),
    Create(MapPoint),
    Update(MapPoint),
    Remove(String),
}

/// Records every call the host accepted.
#[derive(Default)]
pub struct RecordingSurface {
    connected: AtomicBool,
    bound: AtomicBool,
    connect_fails: AtomicBool,
    layer_fails: AtomicBool,
    connects: AtomicUsize,
    calls: Mutex<Vec<SurfaceCall>>,
    failing: Mutex<HashSet<String>>,
    unavailable: Mutex<HashSet<String>>,
}

impl RecordingSurface {
    pub fn connected() -> Self {
        let s = Self::default();
        s.set_connected(true);
        s.set_bound(true);
        s
    }

    pub fn set_connected(&self, v: bool) {
        self.connected.store(v, Ordering::SeqCst);
    }

    pub fn set_bound(&self, v: bool) {
        self.bound.store(v, Ordering::SeqCst);
    }

    pub fn set_connect_succeeds(&self, v: bool) {
        self.connect_fails.store(!v, Ordering::SeqCst);
    }

    pub fn set_layer_fails(&self, v: bool) {
        self.layer_fails.store(v, Ordering::SeqCst);
    }

    pub fn fail_point(&self, point_id: &str) {
        self.failing.lock().unwrap().insert(point_id.to_string());
    }

    pub fn fail_point_unavailable(&self, point_id: &str) {
        self.unavailable.lock().unwrap().insert(point_id.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
        self.unavailable.lock().unwrap().clear();
    }

    pub fn connect_attempts(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn creates(&self) -> Vec<MapPoint> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Create(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<MapPoint> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Update(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn removes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SurfaceCall::Remove(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn check(&self, point_id: &str) -> Result<()> {
        if self.unavailable.lock().unwrap().contains(point_id) {
            return Err(Error::HostUnavailable("connection dropped".to_string()));
        }
        if self.failing.lock().unwrap().contains(point_id) {
            return Err(Error::External(format!("host rejected {point_id}")));
        }
        Ok(())
    }

    fn record(&self, call: SurfaceCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MarkerSurface for RecordingSurface {
    async fn is_bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.connect_fails.load(Ordering::SeqCst) {
            return Err(Error::HostUnavailable("refused".to_string()));
        }
        self.set_connected(true);
        Ok(())
    }

    async fn ensure_layer(&self, layer: &MapLayer) -> Result<()> {
        if self.layer_fails.load(Ordering::SeqCst) {
            return Err(Error::External("layer rejected".to_string()));
        }
        self.record(SurfaceCall::EnsureLayer(layer.id.clone()));
        Ok(())
    }

    async fn create_point(&self, _layer_id: &str, point: &MapPoint) -> Result<()> {
        self.check(&point.id)?;
        self.record(SurfaceCall::Create(point.clone()));
        Ok(())
    }

    async fn update_point(&self, _layer_id: &str, point: &MapPoint) -> Result<()> {
        self.check(&point.id)?;
        self.record(SurfaceCall::Update(point.clone()));
        Ok(())
    }

    async fn remove_point(&self, _layer_id: &str, point_id: &str) -> Result<()> {
        self.check(point_id)?;
        self.record(SurfaceCall::Remove(point_id.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    chats: Mutex<HashMap<ChatId, String>>,
    users: Mutex<HashMap<UserId, UserProfile>>,
}

impl FakeDirectory {
    pub fn with_chat(self, chat_id: ChatId, title: &str) -> Self {
        self.chats.lock().unwrap().insert(chat_id, title.to_string());
        self
    }

    pub fn with_user(self, user_id: UserId, first: &str, last: &str) -> Self {
        self.add_profile(UserProfile {
            id: user_id,
            first_name: first.to_string(),
            last_name: last.to_string(),
            ..Default::default()
        });
        self
    }

    pub fn add_profile(&self, profile: UserProfile) {
        self.users.lock().unwrap().insert(profile.id, profile);
    }

    pub fn set_photos(&self, user_id: UserId, photo: &str, grey: &str) {
        if let Some(p) = self.users.lock().unwrap().get_mut(&user_id) {
            p.photo_path = Some(photo.to_string());
            p.grey_photo_path = Some(grey.to_string());
        }
    }
}

#[async_trait]
impl ChatDirectory for FakeDirectory {
    async fn chat_title(&self, chat_id: ChatId) -> Option<String> {
        self.chats.lock().unwrap().get(&chat_id).cloned()
    }

    async fn user(&self, user_id: UserId) -> Option<UserProfile> {
        self.users.lock().unwrap().get(&user_id).cloned()
    }
}

#[derive(Default)]
pub struct FakeGrants {
    fail: AtomicBool,
    granted: Mutex<Vec<String>>,
}

impl FakeGrants {
    pub fn set_fail(&self, v: bool) {
        self.fail.store(v, Ordering::SeqCst);
    }

    pub fn granted(&self) -> Vec<String> {
        self.granted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGrants for FakeGrants {
    async fn grant_read(&self, uri: &str, _ttl: Duration) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::External("grant denied".to_string()));
        }
        self.granted.lock().unwrap().push(uri.to_string());
        Ok(())
    }
}
