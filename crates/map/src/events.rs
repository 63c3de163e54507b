use foundation::geo::{LngLat, ScreenPoint};
use serde::Serialize;

use crate::feature::{MapFeature, Properties};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HandlerId(pub u64);

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Click,
    MouseMove,
    MouseLeave,
}

/// Feature returned by a point query, tagged with where it was rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueriedFeature {
    pub layer_id: String,
    pub source_id: String,
    pub feature: MapFeature,
    pub state: Properties,
}

/// Pointer event delivered to a layer that registered a handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapEvent {
    pub kind: EventKind,
    pub handler: HandlerId,
    pub layer_id: String,
    pub point: ScreenPoint,
    pub lnglat: LngLat,
    /// Topmost feature under the pointer; `None` for raster layers and
    /// mouse-leave events.
    pub feature: Option<QueriedFeature>,
}
