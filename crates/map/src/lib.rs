//! Map host facade and a headless in-memory implementation.
//!
//! Layer components talk to the map only through [`MapHost`]; the browser
//! widget and [`HeadlessMap`] are interchangeable behind it.

pub mod cluster;
pub mod events;
pub mod feature;
pub mod headless;
pub mod host;
pub mod picking;
pub mod source;
pub mod style;

pub use cluster::ClusterOptions;
pub use events::{EventKind, HandlerId, MapEvent, QueriedFeature};
pub use feature::{Feature, FeatureCollection, FeatureId, Geometry, MapFeature, Properties};
pub use headless::{HeadlessMap, Phase};
pub use host::{MapError, MapHost};
pub use source::{SourceSpec, TileCoord};
pub use style::{EvalContext, Expr, LayerKind, LayerSpec, StepBoundary};
