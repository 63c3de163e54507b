use api::TileDescriptor;
use map::events::MapEvent;
use map::host::{MapError, MapHost};

use crate::districts::DISTRICT_IDS;
use crate::layer::{Layer, LayerAction, LayerBinding};
use crate::provinces::PROVINCE_IDS;
use crate::radius::RADIUS_FILL_LAYER;
use crate::raster::{RasterIds, RasterOverlay, RasterProduct};
use crate::satellite::SATELLITE_IDS;
use crate::stations::CLUSTERS_LAYER;
use crate::symbology::Legend;

pub const EXPOSURE_IDS: RasterIds = RasterIds {
    source: "exposure-source",
    layer: "exposure-layer",
};

/// Population exposure surface. Display only.
#[derive(Debug)]
pub struct ExposureLayer {
    overlay: RasterOverlay,
}

impl Default for ExposureLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl ExposureLayer {
    pub fn new() -> Self {
        Self {
            overlay: RasterOverlay::new(
                EXPOSURE_IDS,
                LayerBinding::new(EXPOSURE_IDS.source).below(&[
                    SATELLITE_IDS.layer,
                    PROVINCE_IDS.fill,
                    DISTRICT_IDS.fill,
                    RADIUS_FILL_LAYER,
                    CLUSTERS_LAYER,
                ]),
                "Population exposure",
            ),
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

impl Layer for ExposureLayer {
    fn binding(&self) -> &LayerBinding {
        &self.overlay.binding
    }

    fn binding_mut(&mut self) -> &mut LayerBinding {
        &mut self.overlay.binding
    }

    fn on_event(&mut self, _host: &mut dyn MapHost, _event: &MapEvent) -> Option<LayerAction> {
        None
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
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn exposure_tiles_mount_without_handlers() {
        let mut map = HeadlessMap::ready(LngLat::new(30.0, -2.0), 8.0);
        let mut layer = ExposureLayer::new();
        let tiles: TileDescriptor =
            serde_json::from_value(json!({ "url": "https://tiles.example/exp/{z}/{x}/{y}.png" }))
                .expect("tiles");
        let no2 = RasterProduct::new(api::Pollutant::No2, "2024-05-01");
        layer.update(&mut map, Some(&no2), Some(&tiles), true, 0.4).expect("mount");

        assert_eq!(map.handler_count(), 0);
        assert_eq!(map.paint_value("exposure-layer", "raster-opacity"), Some(json!(0.4)));
        assert!(map.click_at(LngLat::new(30.0, -2.0)).is_empty());
        assert_eq!(layer.legend(), None);

        layer.update(&mut map, Some(&no2), None, false, 0.4).expect("hide");
        assert_eq!(map.layer_visibility("exposure-layer"), Some(false));

        let next_day = RasterProduct::new(api::Pollutant::No2, "2024-05-02");
        layer.update(&mut map, Some(&next_day), None, true, 0.4).expect("switch");
        assert!(!map.has_source("exposure-source"));
        assert!(!layer.is_shown());
    }
}
