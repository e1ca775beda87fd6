use std::sync::Arc;

use tgmap_core::{
    config::Config, images::NoGrantNeeded, reconciler::MarkerReconciler, settings::Settings,
    sweeper::Sweeper,
};

mod snapshot;
mod surface;

use snapshot::SnapshotFile;
use surface::JsonLinesSurface;

#[tokio::main]
async fn main() -> Result<(), tgmap_core::Error> {
    tgmap_core::logging::init("tgmap")?;

    let cfg = Config::load()?;
    let settings = Arc::new(Settings::new(
        cfg.horizons,
        cfg.visible_chats.iter().copied(),
    ));

    let snapshot = Arc::new(SnapshotFile::open(cfg.snapshot_file.clone()).await?);
    let surface = Arc::new(JsonLinesSurface::new(tokio::io::stdout()));

    let reconciler = Arc::new(MarkerReconciler::new(
        surface,
        snapshot.clone(),
        Arc::new(NoGrantNeeded),
        settings,
        cfg.layer.clone(),
        cfg.images.clone(),
    ));
    reconciler.setup_layer().await;

    let sweeper = Sweeper::new(reconciler, snapshot, cfg.sweep_interval);
    sweeper.start().await;

    tokio::signal::ctrl_c().await?;
    sweeper.stop().await;

    Ok(())
}
