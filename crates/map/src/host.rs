use foundation::geo::{LngLat, ScreenPoint};
use serde_json::Value;

use crate::cluster::ClusterOptions;
use crate::events::{EventKind, HandlerId, QueriedFeature};
use crate::feature::MapFeature;
use crate::source::SourceSpec;
use crate::style::{Expr, LayerSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapError {
    /// The widget has not finished loading, or was destroyed.
    NotReady,
    DuplicateSource(String),
    DuplicateLayer(String),
    UnknownSource(String),
    UnknownLayer(String),
    /// Removing a source that layers still reference.
    SourceInUse { source: String, layers: Vec<String> },
    WrongSourceKind(String),
    UnknownCluster(u64),
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapError::NotReady => write!(f, "map is not ready"),
            MapError::DuplicateSource(id) => write!(f, "source already exists: {id}"),
            MapError::DuplicateLayer(id) => write!(f, "layer already exists: {id}"),
            MapError::UnknownSource(id) => write!(f, "unknown source: {id}"),
            MapError::UnknownLayer(id) => write!(f, "unknown layer: {id}"),
            MapError::SourceInUse { source, layers } => {
                write!(f, "source {source} is still used by layers {layers:?}")
            }
            MapError::WrongSourceKind(id) => write!(f, "source {id} has the wrong kind"),
            MapError::UnknownCluster(id) => write!(f, "unknown cluster: {id}"),
        }
    }
}

impl std::error::Error for MapError {}

/// Imperative facade over a single map widget.
///
/// Every mutation returns `Err(MapError::NotReady)` before the map has
/// loaded and after it was destroyed. Removing something that does not
/// exist is not an error; the `bool` reports whether anything was removed.
pub trait MapHost {
    fn is_ready(&self) -> bool;

    fn add_source(&mut self, id: &str, source: SourceSpec) -> Result<(), MapError>;

    fn add_raster_source(
        &mut self,
        id: &str,
        tile_url_template: &str,
        tile_size: u32,
        max_zoom: Option<u8>,
    ) -> Result<(), MapError> {
        self.add_source(id, SourceSpec::raster(tile_url_template, tile_size, max_zoom))
    }

    fn add_geojson_source(
        &mut self,
        id: &str,
        features: Vec<MapFeature>,
        cluster: Option<ClusterOptions>,
    ) -> Result<(), MapError> {
        self.add_source(id, SourceSpec::GeoJson { features, cluster })
    }

    /// Replaces a GeoJSON source's features in place.
    fn set_source_data(&mut self, id: &str, features: Vec<MapFeature>) -> Result<(), MapError>;

    fn remove_source(&mut self, id: &str) -> Result<bool, MapError>;

    fn has_source(&self, id: &str) -> bool;

    fn add_layer(&mut self, spec: LayerSpec) -> Result<(), MapError>;

    fn remove_layer(&mut self, id: &str) -> Result<bool, MapError>;

    fn has_layer(&self, id: &str) -> bool;

    fn set_paint_property(&mut self, layer: &str, prop: &str, value: Expr) -> Result<(), MapError>;

    fn set_layout_property(&mut self, layer: &str, prop: &str, value: Expr)
    -> Result<(), MapError>;

    fn set_feature_state(
        &mut self,
        source: &str,
        feature_id: u64,
        key: &str,
        value: Value,
    ) -> Result<(), MapError>;

    /// Features rendered under `point`, topmost first. Empty `layer_ids`
    /// queries every layer.
    fn query_features_at_point(&self, point: ScreenPoint, layer_ids: &[&str])
    -> Vec<QueriedFeature>;

    fn cluster_expansion_zoom(&self, source: &str, cluster_id: u64) -> Result<f64, MapError>;

    fn ease_to(&mut self, center: LngLat, zoom: f64) -> Result<(), MapError>;

    fn on(&mut self, kind: EventKind, layer: &str) -> Result<HandlerId, MapError>;

    /// Returns `true` if the handler was registered.
    fn off(&mut self, handler: HandlerId) -> bool;

    /// Source ids in insertion order.
    fn source_ids(&self) -> Vec<String>;

    /// Layer ids bottom to top.
    fn layer_ids(&self) -> Vec<String>;
}
