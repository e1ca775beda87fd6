use async_trait::async_trait;

use crate::{
    surface::types::{MapLayer, MapPoint},
    Result,
};

/// Port to the external map renderer.
///
/// Every call is keyed by layer id + point id and must be idempotent on the
/// host side. Adapters report a lost connection as `Error::HostUnavailable`
/// so the reconciler can drop the rest of the batch.
#[async_trait]
pub trait MarkerSurface: Send + Sync {
    /// The host process is bound (installed and reachable in principle).
    async fn is_bound(&self) -> bool;
    async fn is_connected(&self) -> bool;
    async fn connect(&self) -> Result<()>;

    async fn ensure_layer(&self, layer: &MapLayer) -> Result<()>;

    async fn create_point(&self, layer_id: &str, point: &MapPoint) -> Result<()>;
    /// Replace the point if it exists.
    async fn update_point(&self, layer_id: &str, point: &MapPoint) -> Result<()>;
    async fn remove_point(&self, layer_id: &str, point_id: &str) -> Result<()>;
}
