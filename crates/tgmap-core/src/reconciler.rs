//! Marker reconciliation.
//!
//! Drives the rendering surface so that every visible, non-expired report has
//! exactly one marker and nothing else does. The surface has no transactions,
//! so every pass:
//! - starts behind a connection guard and becomes a no-op if the host is away
//! - records a marker only after the host accepted the call
//! - skips updates whose presentation did not change and whose image grant
//!   is still fresh
//!
//! A reconnect means the host may have restarted and dropped its points, so
//! every tracked marker is created again on the next pass that reaches it.

use std::{
    collections::{hash_map::Entry, HashMap, HashSet},
    ops::ControlFlow,
    sync::{Arc, PoisonError},
};

use tracing::{debug, info, warn};

use crate::{
    directory::ChatDirectory,
    domain::{ChatId, MarkerKey, SenderKey},
    errors::Error,
    freshness::{report_age, Freshness, Horizons},
    images::{ImageDefaults, ImageGrants},
    report::LocationReport,
    settings::Settings,
    surface::{
        port::MarkerSurface,
        types::{MapLayer, MapPoint, COLOR_WHITE, POINT_IMAGE_URI_PARAM},
    },
};

/// What the surface currently shows for one key.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerState {
    pub title: String,
    pub group_title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub stale: bool,
    /// `None` when the image grant failed and the point went out without one.
    pub image_uri: Option<String>,
}

/// Counters for one reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// False when the host was unreachable and nothing was attempted.
    pub proceeded: bool,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Bookkeeping behind one tracked key.
#[derive(Clone, Debug)]
struct Tracked {
    state: MarkerState,
    /// Pass clock of the last successful image grant.
    granted_at: Option<i64>,
    /// Set by a reconnect until the point has been sent again.
    resend: bool,
}

impl PassOutcome {
    fn unreachable() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> usize {
        self.created + self.updated + self.removed
    }
}

pub struct MarkerReconciler {
    surface: Arc<dyn MarkerSurface>,
    directory: Arc<dyn ChatDirectory>,
    grants: Arc<dyn ImageGrants>,
    settings: Arc<Settings>,
    layer: MapLayer,
    images: ImageDefaults,
    /// FIFO: passes run one at a time in arrival order.
    pass_lock: tokio::sync::Mutex<()>,
    /// Locked per key only, never across an `.await`.
    markers: std::sync::Mutex<HashMap<MarkerKey, Tracked>>,
}

impl MarkerReconciler {
    pub fn new(
        surface: Arc<dyn MarkerSurface>,
        directory: Arc<dyn ChatDirectory>,
        grants: Arc<dyn ImageGrants>,
        settings: Arc<Settings>,
        layer: MapLayer,
        images: ImageDefaults,
    ) -> Self {
        Self {
            surface,
            directory,
            grants,
            settings,
            layer,
            images,
            pass_lock: tokio::sync::Mutex::new(()),
            markers: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &Arc<Settings> {
        &self.settings
    }

    pub fn layer(&self) -> &MapLayer {
        &self.layer
    }

    /// Create the marker layer if the host does not have it yet.
    pub async fn setup_layer(&self) -> PassOutcome {
        let _pass = self.pass_lock.lock().await;
        let Some(mut pass) = self.begin().await else {
            return PassOutcome::unreachable();
        };
        let _ = pass.ensure_layer().await;
        pass.finish("setup_layer")
    }

    /// Reconcile a single new or refreshed report against the current clock.
    pub async fn upsert_marker(&self, report: &LocationReport) -> PassOutcome {
        self.upsert_marker_at(report, unix_now()).await
    }

    pub async fn upsert_marker_at(&self, report: &LocationReport, now: i64) -> PassOutcome {
        let _pass = self.pass_lock.lock().await;
        let Some(mut pass) = self.begin().await else {
            return PassOutcome::unreachable();
        };
        let visible = self.settings.is_chat_visible(report.chat_id);
        let horizons = self.settings.horizons();
        let _ = pass.apply(report, visible, horizons, now).await;
        pass.finish("upsert")
    }

    /// Show every report of a chat that just became visible.
    pub async fn show_markers_for_chat(
        &self,
        chat_id: ChatId,
        reports: &[LocationReport],
        now: i64,
    ) -> PassOutcome {
        let _pass = self.pass_lock.lock().await;
        let Some(mut pass) = self.begin().await else {
            return PassOutcome::unreachable();
        };
        let visible = self.settings.is_chat_visible(chat_id);
        let horizons = self.settings.horizons();
        let chat_reports: Vec<LocationReport> = reports
            .iter()
            .filter(|r| r.chat_id == chat_id)
            .cloned()
            .collect();
        let (latest, malformed) = latest_per_key(&chat_reports);
        pass.outcome.skipped += malformed;
        for report in latest {
            if pass.apply(report, visible, horizons, now).await.is_break() {
                break;
            }
        }
        pass.finish("show_chat")
    }

    /// Remove every tracked marker of a chat, whatever its freshness.
    pub async fn remove_markers_for_chat(&self, chat_id: ChatId) -> PassOutcome {
        let _pass = self.pass_lock.lock().await;
        let Some(mut pass) = self.begin().await else {
            return PassOutcome::unreachable();
        };
        let mut keys: Vec<MarkerKey> = self
            .lock_markers()
            .keys()
            .filter(|k| k.chat_id == chat_id)
            .cloned()
            .collect();
        keys.sort();
        for key in keys {
            if pass.remove_tracked(&key).await.is_break() {
                break;
            }
        }
        pass.finish("hide_chat")
    }

    /// Remove the markers of specific reports, e.g. after their chat history
    /// was cleared. Reports from senders the directory no longer knows are
    /// skipped.
    pub async fn remove_markers_for_messages(&self, reports: &[LocationReport]) -> PassOutcome {
        let _pass = self.pass_lock.lock().await;
        let Some(mut pass) = self.begin().await else {
            return PassOutcome::unreachable();
        };
        let mut seen = HashSet::new();
        for report in reports {
            let key = report.key();
            if !seen.insert(key.clone()) {
                continue;
            }
            if let Err(e) = self.resolve_sender(&report.sender).await {
                debug!(event = "reconciler.remove.skipped", point_id = %key, reason = %e);
                pass.outcome.skipped += 1;
                continue;
            }
            if pass.remove_point(&key).await.is_break() {
                break;
            }
        }
        pass.finish("remove_messages")
    }

    /// Full reconciliation over every known report.
    ///
    /// Reports of hidden chats lose their marker. When a key has several
    /// reports, the newest `last_update` wins (later entries on ties).
    pub async fn sweep(
        &self,
        reports: &[LocationReport],
        visible_chats: &HashSet<ChatId>,
        now: i64,
    ) -> PassOutcome {
        let _pass = self.pass_lock.lock().await;
        let Some(mut pass) = self.begin().await else {
            return PassOutcome::unreachable();
        };
        let horizons = self.settings.horizons();
        let (latest, malformed) = latest_per_key(reports);
        pass.outcome.skipped += malformed;
        for report in latest {
            let visible = visible_chats.contains(&report.chat_id);
            if pass.apply(report, visible, horizons, now).await.is_break() {
                break;
            }
        }
        pass.finish("sweep")
    }

    pub fn is_tracked(&self, key: &MarkerKey) -> bool {
        self.lock_markers().contains_key(key)
    }

    pub fn marker_state(&self, key: &MarkerKey) -> Option<MarkerState> {
        self.lock_markers().get(key).map(|t| t.state.clone())
    }

    pub fn tracked_point_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock_markers().keys().map(MarkerKey::point_id).collect();
        ids.sort();
        ids
    }

    /// Guard run before every batch: connect if bound, then re-check.
    async fn host_ready(&self) -> bool {
        if self.surface.is_connected().await {
            return true;
        }
        if !self.surface.is_bound().await {
            return false;
        }
        if let Err(e) = self.surface.connect().await {
            debug!(event = "reconciler.host.connect_failed", error = %e);
        }
        let ready = self.surface.is_connected().await;
        if ready {
            self.mark_for_resend();
        }
        ready
    }

    fn mark_for_resend(&self) {
        let mut markers = self.lock_markers();
        for tracked in markers.values_mut() {
            tracked.resend = true;
        }
        info!(event = "reconciler.host.reconnected", markers = markers.len());
    }

    /// Grants are renewed once half their TTL has elapsed.
    fn grant_due(&self, tracked: &Tracked, now: i64) -> bool {
        if tracked.state.image_uri.is_none() {
            return false;
        }
        let ttl = self.images.grant_ttl.as_secs();
        match tracked.granted_at {
            Some(at) => ttl > 0 && report_age(now, at).saturating_mul(2) >= ttl,
            None => true,
        }
    }

    async fn begin(&self) -> Option<Pass<'_>> {
        if !self.host_ready().await {
            debug!(event = "reconciler.host.unreachable");
            return None;
        }
        Some(Pass {
            rec: self,
            outcome: PassOutcome {
                proceeded: true,
                ..PassOutcome::default()
            },
            layer: LayerState::Unknown,
        })
    }

    async fn resolve_sender(&self, sender: &SenderKey) -> crate::Result<()> {
        match sender {
            SenderKey::User(user_id) => match self.directory.user(*user_id).await {
                Some(_) => Ok(()),
                None => Err(Error::UnresolvableSender(format!("user {user_id}"))),
            },
            SenderKey::Bot(_) => Ok(()),
        }
    }

    /// Desired presentation, or `None` when the chat cannot be resolved.
    async fn presentation(
        &self,
        report: &LocationReport,
        freshness: Freshness,
    ) -> Option<MarkerState> {
        let group_title = self.directory.chat_title(report.chat_id).await?;
        let stale = freshness == Freshness::Stale;
        let (title, photo) = match &report.sender {
            SenderKey::User(user_id) => match self.directory.user(*user_id).await {
                Some(profile) => {
                    let photo = profile.photo_for(stale).map(str::to_string);
                    (profile.display_name(), photo)
                }
                None => (user_id.to_string(), None),
            },
            SenderKey::Bot(name) => (name.clone(), None),
        };
        Some(MarkerState {
            title,
            group_title,
            latitude: report.latitude,
            longitude: report.longitude,
            stale,
            image_uri: Some(self.images.resolve(photo.as_deref(), stale)),
        })
    }

    fn lock_markers(&self) -> std::sync::MutexGuard<'_, HashMap<MarkerKey, Tracked>> {
        self.markers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tracked(&self, key: &MarkerKey) -> Option<Tracked> {
        self.lock_markers().get(key).cloned()
    }

    fn remember(&self, key: &MarkerKey, tracked: Tracked) {
        self.lock_markers().insert(key.clone(), tracked);
    }

    fn forget(&self, key: &MarkerKey) -> bool {
        self.lock_markers().remove(key).is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LayerState {
    Unknown,
    Ready,
    Failed,
}

/// One batch of surface calls under the pass lock.
struct Pass<'a> {
    rec: &'a MarkerReconciler,
    outcome: PassOutcome,
    layer: LayerState,
}

impl Pass<'_> {
    async fn apply(
        &mut self,
        report: &LocationReport,
        visible: bool,
        horizons: Horizons,
        now: i64,
    ) -> ControlFlow<()> {
        let key = report.key();
        if let Err(e) = report.validate() {
            debug!(event = "reconciler.report.malformed", reason = %e);
            self.outcome.skipped += 1;
            return ControlFlow::Continue(());
        }
        if !visible {
            return self.remove_tracked(&key).await;
        }

        let freshness = horizons.classify(now, report.last_update);
        if freshness == Freshness::Expired {
            return self.remove_tracked(&key).await;
        }

        let Some(desired) = self.rec.presentation(report, freshness).await else {
            debug!(
                event = "reconciler.report.skipped",
                point_id = %key,
                reason = "unknown chat"
            );
            self.outcome.skipped += 1;
            return ControlFlow::Continue(());
        };

        let action = match self.rec.tracked(&key) {
            None => "create",
            Some(t) if t.resend => "create",
            Some(t) if t.state != desired || self.rec.grant_due(&t, now) => "update",
            Some(_) => {
                self.outcome.unchanged += 1;
                return ControlFlow::Continue(());
            }
        };

        if self.ensure_layer().await.is_break() {
            return ControlFlow::Break(());
        }
        if self.layer != LayerState::Ready {
            self.outcome.skipped += 1;
            return ControlFlow::Continue(());
        }

        let sent = self.grant_image(desired, now).await;
        let point = map_point(&key, &sent.state);
        let layer_id = self.rec.layer.id.as_str();
        let res = if action == "create" {
            self.rec.surface.create_point(layer_id, &point).await
        } else {
            self.rec.surface.update_point(layer_id, &point).await
        };

        match res {
            Ok(()) => {
                debug!(
                    event = "reconciler.point.applied",
                    action,
                    point_id = %key,
                    freshness = freshness.as_str()
                );
                if action == "create" {
                    self.outcome.created += 1;
                } else {
                    self.outcome.updated += 1;
                }
                self.rec.remember(&key, sent);
                ControlFlow::Continue(())
            }
            Err(e) => self.call_failed(action, &key, e),
        }
    }

    /// Remove a marker this reconciler placed; untracked keys are a no-op.
    async fn remove_tracked(&mut self, key: &MarkerKey) -> ControlFlow<()> {
        if !self.rec.is_tracked(key) {
            return ControlFlow::Continue(());
        }
        self.remove_point(key).await
    }

    async fn remove_point(&mut self, key: &MarkerKey) -> ControlFlow<()> {
        let point_id = key.point_id();
        match self
            .rec
            .surface
            .remove_point(&self.rec.layer.id, &point_id)
            .await
        {
            Ok(()) => {
                debug!(event = "reconciler.point.removed", point_id = %point_id);
                self.rec.forget(key);
                self.outcome.removed += 1;
                ControlFlow::Continue(())
            }
            Err(e) => self.call_failed("remove", key, e),
        }
    }

    async fn ensure_layer(&mut self) -> ControlFlow<()> {
        if self.layer != LayerState::Unknown {
            return ControlFlow::Continue(());
        }
        match self.rec.surface.ensure_layer(&self.rec.layer).await {
            Ok(()) => {
                self.layer = LayerState::Ready;
                ControlFlow::Continue(())
            }
            Err(e) if e.is_host_unavailable() => {
                warn!(event = "reconciler.host.lost", action = "ensure_layer", error = %e);
                ControlFlow::Break(())
            }
            Err(e) => {
                warn!(
                    event = "reconciler.layer.failed",
                    layer_id = %self.rec.layer.id,
                    error = %e
                );
                self.layer = LayerState::Failed;
                self.outcome.failed += 1;
                ControlFlow::Continue(())
            }
        }
    }

    async fn grant_image(&self, mut state: MarkerState, now: i64) -> Tracked {
        let mut granted_at = None;
        if let Some(uri) = state.image_uri.as_deref() {
            let ttl = self.rec.images.grant_ttl;
            match self.rec.grants.grant_read(uri, ttl).await {
                Ok(()) => granted_at = Some(now),
                Err(e) => {
                    warn!(event = "reconciler.image.grant_failed", uri, error = %e);
                    state.image_uri = None;
                }
            }
        }
        Tracked {
            state,
            granted_at,
            resend: false,
        }
    }

    fn call_failed(&mut self, action: &str, key: &MarkerKey, e: Error) -> ControlFlow<()> {
        if e.is_host_unavailable() {
            warn!(event = "reconciler.host.lost", action, point_id = %key, error = %e);
            return ControlFlow::Break(());
        }
        warn!(event = "reconciler.point.failed", action, point_id = %key, error = %e);
        self.outcome.failed += 1;
        ControlFlow::Continue(())
    }

    fn finish(self, pass: &'static str) -> PassOutcome {
        let o = self.outcome;
        if o.changes() > 0 || o.failed > 0 {
            info!(
                event = "reconciler.pass.completed",
                pass,
                created = o.created,
                updated = o.updated,
                removed = o.removed,
                unchanged = o.unchanged,
                skipped = o.skipped,
                failed = o.failed
            );
        } else {
            debug!(
                event = "reconciler.pass.completed",
                pass,
                unchanged = o.unchanged,
                skipped = o.skipped
            );
        }
        o
    }
}

fn map_point(key: &MarkerKey, state: &MarkerState) -> MapPoint {
    let mut params = std::collections::BTreeMap::new();
    if let Some(uri) = &state.image_uri {
        params.insert(POINT_IMAGE_URI_PARAM.to_string(), uri.clone());
    }
    MapPoint {
        id: key.point_id(),
        title: state.title.clone(),
        description: state.title.clone(),
        group_title: state.group_title.clone(),
        color: COLOR_WHITE,
        latitude: state.latitude,
        longitude: state.longitude,
        params,
    }
}

/// Newest valid report per key, in first-seen order, plus the number of
/// malformed reports dropped.
fn latest_per_key(reports: &[LocationReport]) -> (Vec<&LocationReport>, usize) {
    let mut order: Vec<MarkerKey> = Vec::new();
    let mut latest: HashMap<MarkerKey, &LocationReport> = HashMap::new();
    let mut malformed = 0usize;
    for report in reports {
        if !report.is_valid() {
            debug!(event = "reconciler.report.malformed", point_id = %report.key());
            malformed += 1;
            continue;
        }
        match latest.entry(report.key()) {
            Entry::Occupied(mut e) => {
                if report.last_update >= e.get().last_update {
                    e.insert(report);
                }
            }
            Entry::Vacant(e) => {
                order.push(e.key().clone());
                e.insert(report);
            }
        }
    }
    let reports = order
        .iter()
        .filter_map(|k| latest.get(k).copied())
        .collect();
    (reports, malformed)
}

pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
