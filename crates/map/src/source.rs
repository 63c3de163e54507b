use serde::Serialize;

use crate::cluster::ClusterOptions;
use crate::feature::MapFeature;

pub const DEFAULT_TILE_SIZE: u32 = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSpec {
    Raster {
        /// Canonical `{z}/{x}/{y}` templates.
        tiles: Vec<String>,
        tile_size: u32,
        /// Tiles above this zoom are overzoomed from this level.
        max_zoom: Option<u8>,
    },
    GeoJson {
        features: Vec<MapFeature>,
        cluster: Option<ClusterOptions>,
    },
}

impl SourceSpec {
    pub fn raster(template: impl Into<String>, tile_size: u32, max_zoom: Option<u8>) -> Self {
        SourceSpec::Raster {
            tiles: vec![template.into()],
            tile_size,
            max_zoom,
        }
    }

    pub fn geojson(features: Vec<MapFeature>) -> Self {
        SourceSpec::GeoJson {
            features,
            cluster: None,
        }
    }

    pub fn clustered(features: Vec<MapFeature>, cluster: ClusterOptions) -> Self {
        SourceSpec::GeoJson {
            features,
            cluster: Some(cluster),
        }
    }
}

/// Tile address in the XYZ scheme.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Parent tile at `z`, or `self` if already at or above it.
    pub fn at_most(self, z: u8) -> Self {
        if self.z <= z {
            return self;
        }
        let shift = self.z - z;
        Self::new(z, self.x >> shift, self.y >> shift)
    }
}

/// Fills a canonical `{z}/{x}/{y}` template.
pub fn fill_template(template: &str, coord: TileCoord) -> String {
    template
        .replace("{z}", &coord.z.to_string())
        .replace("{x}", &coord.x.to_string())
        .replace("{y}", &coord.y.to_string())
}
