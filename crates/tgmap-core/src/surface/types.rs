use std::collections::BTreeMap;

use serde::Serialize;

/// Point parameter carrying the marker image URI.
pub const POINT_IMAGE_URI_PARAM: &str = "point_image_uri_param";

/// Opaque white (ARGB).
pub const COLOR_WHITE: u32 = 0xFFFF_FFFF;

/// Named grouping of points; must exist before points are placed in it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapLayer {
    pub id: String,
    pub name: String,
    pub z_order: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MapPoint {
    pub id: String,
    pub title: String,
    pub description: String,
    pub group_title: String,
    pub color: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub params: BTreeMap<String, String>,
}

impl MapPoint {
    pub fn image_uri(&self) -> Option<&str> {
        self.params.get(POINT_IMAGE_URI_PARAM).map(String::as_str)
    }
}
