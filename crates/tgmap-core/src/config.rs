use std::{env, fs, path::Path, path::PathBuf, str::FromStr, time::Duration};

use crate::{
    domain::ChatId, errors::Error, freshness::Horizons, images::ImageDefaults,
    surface::types::MapLayer, Result,
};

const DEFAULT_HISTORY_HORIZON_SECS: u64 = 24 * 60 * 60;
const DEFAULT_STALE_HORIZON_SECS: u64 = 15 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

/// Typed runtime configuration.
#[derive(Clone, Debug)]
pub struct Config {
    // Freshness
    pub horizons: Horizons,
    pub sweep_interval: Duration,

    // Rendering host
    pub layer: MapLayer,
    pub images: ImageDefaults,

    // Chats shown on the map at startup
    pub visible_chats: Vec<ChatId>,

    // Inbound snapshot written by the chat client
    pub snapshot_file: PathBuf,
}

impl Config {
    /// Load from the process environment, reading `.env` first if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let history = parse_or(&get, "TGMAP_HISTORY_HORIZON_SECS", DEFAULT_HISTORY_HORIZON_SECS)?;
        let stale = parse_or(&get, "TGMAP_STALE_HORIZON_SECS", DEFAULT_STALE_HORIZON_SECS)?;
        let horizons = Horizons::new(history, stale)?;

        let sweep_secs = parse_or(&get, "TGMAP_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?;
        if sweep_secs == 0 {
            return Err(Error::Config(
                "TGMAP_SWEEP_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }
        let sweep_interval = Duration::from_secs(sweep_secs);

        let z_order: f32 = parse_or(&get, "TGMAP_LAYER_Z_ORDER", 5.5)?;
        let layer = MapLayer {
            id: get("TGMAP_LAYER_ID").unwrap_or_else(|| "telegram_layer".to_string()),
            name: get("TGMAP_LAYER_NAME").unwrap_or_else(|| "Telegram".to_string()),
            z_order,
        };

        let image_defaults = ImageDefaults::default();
        let grant_ttl_secs = parse_or(
            &get,
            "TGMAP_IMAGE_GRANT_TTL_SECS",
            image_defaults.grant_ttl.as_secs(),
        )?;
        let images = ImageDefaults {
            active_uri: get("TGMAP_ACTIVE_IMAGE_URI").unwrap_or(image_defaults.active_uri),
            stale_uri: get("TGMAP_STALE_IMAGE_URI").unwrap_or(image_defaults.stale_uri),
            grant_ttl: Duration::from_secs(grant_ttl_secs),
        };

        let visible_chats = parse_csv_i64(get("TGMAP_VISIBLE_CHATS"))?
            .into_iter()
            .map(ChatId)
            .collect();

        let snapshot_file = PathBuf::from(
            get("TGMAP_SNAPSHOT_FILE").unwrap_or_else(|| "tgmap-snapshot.json".to_string()),
        );

        Ok(Self {
            horizons,
            sweep_interval,
            layer,
            images,
            visible_chats,
            snapshot_file,
        })
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key}: invalid value {raw:?}"))),
    }
}

fn parse_csv_i64(v: Option<String>) -> Result<Vec<i64>> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| Error::Config(format!("invalid chat id: {s}")))
        })
        .collect()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
