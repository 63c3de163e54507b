use api::TileDescriptor;
use map::events::{EventKind, MapEvent};
use map::host::{MapError, MapHost};

use crate::districts::DISTRICT_IDS;
use crate::layer::{Layer, LayerAction, LayerBinding};
use crate::provinces::PROVINCE_IDS;
use crate::radius::RADIUS_FILL_LAYER;
use crate::raster::{RasterIds, RasterOverlay, RasterProduct};
use crate::stations::CLUSTERS_LAYER;
use crate::symbology::Legend;

pub const SATELLITE_IDS: RasterIds = RasterIds {
    source: "satellite-source",
    layer: "satellite-layer",
};

/// Satellite pollutant raster. A click asks the view to sample the product.
#[derive(Debug)]
pub struct SatelliteLayer {
    overlay: RasterOverlay,
}

impl Default for SatelliteLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl SatelliteLayer {
    pub fn new() -> Self {
        let binding = LayerBinding::new(SATELLITE_IDS.source)
            .handle(EventKind::Click, SATELLITE_IDS.layer)
            .below(&[PROVINCE_IDS.fill, DISTRICT_IDS.fill, RADIUS_FILL_LAYER, CLUSTERS_LAYER]);
        Self {
            overlay: RasterOverlay::new(SATELLITE_IDS, binding, "Satellite"),
        }
    }

    pub fn update(
        &mut self,
        host: &mut dyn MapHost,
        product: Option<&RasterProduct>,
        tiles: Option<&TileDescriptor>,
        visible: bool,
        opacity: f64,
    ) -> Result<(), MapError> {
        self.overlay.update(host, product, tiles, visible, opacity)
    }
}

impl Layer for SatelliteLayer {
    fn binding(&self) -> &LayerBinding {
        &self.overlay.binding
    }

    fn binding_mut(&mut self) -> &mut LayerBinding {
        &mut self.overlay.binding
    }

    fn on_event(&mut self, _host: &mut dyn MapHost, event: &MapEvent) -> Option<LayerAction> {
        (event.kind == EventKind::Click).then_some(LayerAction::SatelliteSample { at: event.lnglat })
    }

    fn legend(&self) -> Option<Legend> {
        self.overlay.legend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundation::geo::LngLat;
    use map::headless::HeadlessMap;
    use map::style::{LayerKind, LayerSpec};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn no2() -> RasterProduct {
        RasterProduct::new(api::Pollutant::No2, "2024-05-01")
    }

    fn tiles() -> TileDescriptor {
        serde_json::from_value(json!({
            "tile_url": "https://earthengine.example/v1/maps/abc/tiles/{z}/{x}/{y}",
            "pollutant": "NO2",
            "date": "2024-05-01",
            "min_value": 0.0,
            "max_value": 0.0002,
            "palette": ["#000004", "#51127C", "#B73779", "#FC8961", "#FCFDBF"]
        }))
        .expect("tiles")
    }

    #[test]
    fn raster_click_reports_the_coordinate() {
        let mut map = HeadlessMap::ready(LngLat::new(30.0, -2.0), 8.0);
        let mut layer = SatelliteLayer::new();
        layer.update(&mut map, Some(&no2()), Some(&tiles()), true, 0.7).expect("mount");

        let at = LngLat::new(30.1, -1.9);
        let events = map.click_at(at);
        assert_eq!(events.len(), 1);
        assert!(layer.owns(&events[0]));
        let Some(LayerAction::SatelliteSample { at: sampled }) = layer.on_event(&mut map, &events[0])
        else {
            panic!("expected a sample request");
        };
        assert!((sampled.lng - at.lng).abs() < 1e-6);
        assert!((sampled.lat - at.lat).abs() < 1e-6);
        assert_eq!(layer.legend().map(|l| l.entries.len()), Some(5));
    }

    #[test]
    fn sits_below_the_choropleth() {
        let mut map = HeadlessMap::ready(LngLat::new(30.0, -2.0), 8.0);
        map.add_geojson_source("districts", Vec::new(), None).expect("source");
        map.add_layer(LayerSpec::new("districts-fill", "districts", LayerKind::Fill))
            .expect("layer");

        let mut layer = SatelliteLayer::new();
        layer.update(&mut map, Some(&no2()), Some(&tiles()), true, 0.7).expect("mount");
        assert_eq!(map.layer_ids(), vec!["satellite-layer", "districts-fill"]);
    }
}
