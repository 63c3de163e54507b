//! Search-radius ring around the selected station.

use foundation::geo::{KM_PER_DEGREE, LngLat};
use map::events::MapEvent;
use map::feature::{Geometry, MapFeature, Properties};
use map::host::{MapError, MapHost};
use map::style::{LayerKind, LayerSpec};

use crate::layer::{Layer, LayerAction, LayerBinding, SourceData};
use crate::stations::CLUSTERS_LAYER;

pub const RADIUS_SOURCE: &str = "radius";
pub const RADIUS_FILL_LAYER: &str = "radius-fill";
pub const RADIUS_OUTLINE_LAYER: &str = "radius-outline";

pub const DEFAULT_RADIUS_KM: f64 = 5.0;
pub const RING_STEPS: usize = 64;

const RING_COLOR: &str = "#3B82F6";

/// Closed ring of `steps` vertices `radius_km` around `center`.
///
/// Degrees are converted at a flat `KM_PER_DEGREE` on both axes, so the
/// ring narrows east-west away from the equator.
pub fn circle_ring(center: LngLat, radius_km: f64, steps: usize) -> Vec<LngLat> {
    let r = radius_km / KM_PER_DEGREE;
    let steps = steps.max(3);
    let mut ring: Vec<LngLat> = (0..steps)
        .map(|i| {
            let theta = std::f64::consts::TAU * i as f64 / steps as f64;
            LngLat::new(center.lng + r * theta.cos(), center.lat + r * theta.sin())
        })
        .collect();
    ring.push(ring[0]);
    ring
}

#[derive(Debug)]
pub struct RadiusLayer {
    binding: LayerBinding,
}

impl Default for RadiusLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl RadiusLayer {
    pub fn new() -> Self {
        Self {
            binding: LayerBinding::new(RADIUS_SOURCE).below(&[CLUSTERS_LAYER]),
        }
    }

    /// Draws the ring around `center`; no center removes it from the map.
    pub fn update(
        &mut self,
        host: &mut dyn MapHost,
        center: Option<LngLat>,
        radius_km: f64,
        visible: bool,
    ) -> Result<(), MapError> {
        let Some(center) = center else {
            return self.binding.teardown(host);
        };
        let ring = circle_ring(center, radius_km.max(0.0), RING_STEPS);
        let feature = MapFeature::new(0, Geometry::polygon(vec![ring]), Properties::new());
        let data = SourceData::GeoJson {
            features: vec![feature],
            cluster: None,
        };
        self.binding.set_data(host, data, visible, || {
            vec![
                LayerSpec::new(RADIUS_FILL_LAYER, RADIUS_SOURCE, LayerKind::Fill)
                    .paint("fill-color", RING_COLOR)
                    .paint("fill-opacity", 0.1),
                LayerSpec::new(RADIUS_OUTLINE_LAYER, RADIUS_SOURCE, LayerKind::Line)
                    .paint("line-color", RING_COLOR)
                    .paint("line-width", 2.0),
            ]
        })
    }
}

impl Layer for RadiusLayer {
    fn binding(&self) -> &LayerBinding {
        &self.binding
    }

    fn binding_mut(&mut self) -> &mut LayerBinding {
        &mut self.binding
    }

    fn on_event(&mut self, _host: &mut dyn MapHost, _event: &MapEvent) -> Option<LayerAction> {
        None
    }
}
