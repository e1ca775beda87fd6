//! Marker surface that streams every operation as one JSON object per line.
//!
//! A renderer process consumes the stream (usually our stdout). A failed
//! write marks the surface disconnected until the next `connect`.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use tgmap_core::{
    errors::Error,
    surface::{
        port::MarkerSurface,
        types::{MapLayer, MapPoint},
    },
    Result,
};

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum SurfaceEvent<'a> {
    EnsureLayer {
        layer: &'a MapLayer,
    },
    CreatePoint {
        layer_id: &'a str,
        point: &'a MapPoint,
    },
    UpdatePoint {
        layer_id: &'a str,
        point: &'a MapPoint,
    },
    RemovePoint {
        layer_id: &'a str,
        point_id: &'a str,
    },
}

pub struct JsonLinesSurface<W> {
    out: Mutex<W>,
    connected: AtomicBool,
}

impl<W> JsonLinesSurface<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            connected: AtomicBool::new(true),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    async fn emit(&self, event: &SurfaceEvent<'_>) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::HostUnavailable("renderer stream closed".to_string()));
        }

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        let res = async {
            out.write_all(&line).await?;
            out.flush().await
        }
        .await;

        res.map_err(|e| {
            self.connected.store(false, Ordering::SeqCst);
            Error::HostUnavailable(format!("renderer stream write failed: {e}"))
        })
    }
}

#[async_trait]
impl<W> MarkerSurface for JsonLinesSurface<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn is_bound(&self) -> bool {
        true
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn ensure_layer(&self, layer: &MapLayer) -> Result<()> {
        self.emit(&SurfaceEvent::EnsureLayer { layer }).await
    }

    async fn create_point(&self, layer_id: &str, point: &MapPoint) -> Result<()> {
        self.emit(&SurfaceEvent::CreatePoint { layer_id, point })
            .await
    }

    async fn update_point(&self, layer_id: &str, point: &MapPoint) -> Result<()> {
        self.emit(&SurfaceEvent::UpdatePoint { layer_id, point })
            .await
    }

    async fn remove_point(&self, layer_id: &str, point_id: &str) -> Result<()> {
        self.emit(&SurfaceEvent::RemovePoint { layer_id, point_id })
            .await
    }
}
